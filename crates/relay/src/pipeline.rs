//! The conversational turn pipeline.
//!
//! A turn takes the caller's conversation plus one new user message, optionally
//! pulls knowledge-base context, asks the chat model for a reply, runs at most
//! one tool on the model's behalf and hands back the extended conversation.
//! The pipeline never stores conversations itself; callers own them and must
//! keep at most one turn in flight per conversation.

use futures::stream::{BoxStream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::errors::TurnError;
use crate::models::message::{Conversation, Message};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::retrieval::{format_context, last_chars, QueryRewriter, Retriever};
use crate::tools::{Artifact, ToolRegistry};

/// What front-ends show in place of a failed turn
pub const APOLOGY: &str =
    "I apologize, but I encountered an error while processing your request. Please try again.";

/// Knowledge-base lookup for RAG turns
#[derive(Clone)]
pub struct RetrievalConfig {
    pub retriever: Arc<dyn Retriever>,
    /// When set, the question is rewritten into a search query first
    pub rewriter: Option<QueryRewriter>,
}

#[derive(Clone)]
pub struct PipelineConfig {
    pub system_prompt: String,
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolRegistry>,
    pub retrieval: Option<RetrievalConfig>,
}

impl PipelineConfig {
    pub fn new<S: Into<String>>(system_prompt: S, provider: Arc<dyn Provider>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            provider,
            tools: ToolRegistry::empty(),
            retrieval: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = Some(retrieval);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation: Conversation,
    pub reply: String,
    pub artifact: Option<Artifact>,
}

/// A turn that produced no reply
///
/// `conversation` is the input extended by the user message only.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct TurnFailure {
    pub conversation: Conversation,
    pub error: TurnError,
}

/// One piece of a streamed reply
#[derive(Debug, Clone, PartialEq)]
pub struct TurnFragment {
    /// Newly generated text
    pub delta: String,
    /// Everything generated so far, `delta` included
    pub so_far: String,
}

pub type FragmentStream = BoxStream<'static, Result<TurnFragment, TurnError>>;

pub struct TurnPipeline {
    config: PipelineConfig,
}

impl TurnPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one full turn
    pub async fn process_turn(
        &self,
        conversation: Conversation,
        user_message: &str,
    ) -> Result<TurnOutcome, TurnFailure> {
        if user_message.trim().is_empty() {
            return Err(TurnFailure {
                conversation,
                error: TurnError::EmptyMessage,
            });
        }

        let mut working = conversation;
        let history_len = working.len();
        working.push(Message::user().with_text(user_message));

        match self.run(&working, history_len, user_message).await {
            Ok((appended, reply, artifact)) => {
                working.extend(appended);
                info!(
                    "Turn reply (last 500 chars): ...{}",
                    last_chars(&reply, 500)
                );
                Ok(TurnOutcome {
                    conversation: working,
                    reply,
                    artifact,
                })
            }
            Err(error) => {
                warn!(error = %error, "turn failed");
                Err(TurnFailure {
                    conversation: working,
                    error,
                })
            }
        }
    }

    /// Everything after the user message: returns the messages to append,
    /// the reply text and any artifact.
    async fn run(
        &self,
        working: &[Message],
        history_len: usize,
        user_message: &str,
    ) -> Result<(Vec<Message>, String, Option<Artifact>), TurnError> {
        let mut request = self
            .assemble(&working[..history_len], user_message)
            .await?;

        let registry = &self.config.tools;
        let (response, usage) = self
            .config
            .provider
            .complete(
                &self.config.system_prompt,
                &request,
                registry.declarations(),
            )
            .await
            .map_err(TurnError::collaborator)?;
        debug!(?usage, "primary completion");

        // Tool dispatch only happens when tools were offered
        let tool_request = if registry.is_empty() {
            None
        } else {
            response.first_tool_request().cloned()
        };

        let Some(tool_request) = tool_request else {
            let reply = response.text();
            return Ok((vec![Message::assistant().with_text(&reply)], reply, None));
        };

        if response.tool_requests().len() > 1 {
            warn!(
                count = response.tool_requests().len(),
                "model requested several tools; only the first is run"
            );
        }

        let tool_call = tool_request.tool_call.clone()?;
        info!(tool = %tool_call.name, "dispatching tool call");
        let output = registry.dispatch(&tool_call).await?;

        let mut call_message = Message::assistant();
        let preamble = response.text();
        if !preamble.is_empty() {
            call_message = call_message.with_text(preamble);
        }
        let call_message =
            call_message.with_tool_request(tool_request.id.clone(), Ok(tool_call));
        let result_message =
            Message::tool().with_tool_response(tool_request.id, Ok(output.content));

        request.push(call_message.clone());
        request.push(result_message.clone());

        let (follow_up, usage) = self
            .config
            .provider
            .complete(&self.config.system_prompt, &request, &[])
            .await
            .map_err(TurnError::collaborator)?;
        debug!(?usage, "follow-up completion");

        let reply = follow_up.text();
        Ok((
            vec![
                call_message,
                result_message,
                Message::assistant().with_text(&reply),
            ],
            reply,
            output.artifact,
        ))
    }

    /// History plus the outgoing user message. With retrieval configured the
    /// outgoing message carries the rendered context prompt instead of the
    /// raw question; the stored conversation never sees that context.
    async fn assemble(
        &self,
        history: &[Message],
        user_message: &str,
    ) -> Result<Vec<Message>, TurnError> {
        let mut messages = history.to_vec();
        let content = match &self.config.retrieval {
            Some(retrieval) => self.rag_prompt(retrieval, history, user_message).await?,
            None => user_message.to_string(),
        };
        messages.push(Message::user().with_text(content));
        Ok(messages)
    }

    async fn rag_prompt(
        &self,
        retrieval: &RetrievalConfig,
        history: &[Message],
        user_message: &str,
    ) -> Result<String, TurnError> {
        let query = match &retrieval.rewriter {
            Some(rewriter) => rewriter.rewrite(history, user_message).await,
            None => user_message.to_string(),
        };

        let documents = match retrieval.retriever.retrieve(&query).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        };

        load_prompt_file(
            "rag_question.md",
            &json!({
                "context": format_context(&documents),
                "question": user_message,
            }),
        )
        .map_err(|e| TurnError::Prompt(e.to_string()))
    }

    /// Stream a reply without tool use
    ///
    /// Each call starts a fresh generation. The caller appends the final
    /// assistant message once the stream is exhausted.
    pub async fn stream_turn(
        &self,
        conversation: &[Message],
        user_message: &str,
    ) -> Result<FragmentStream, TurnError> {
        if user_message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let request = self.assemble(conversation, user_message).await?;
        let deltas = self
            .config
            .provider
            .stream(&self.config.system_prompt, &request)
            .await
            .map_err(TurnError::collaborator)?;

        let fragments = deltas.scan(String::new(), |so_far, item| {
            let fragment = item
                .map(|delta| {
                    so_far.push_str(&delta);
                    TurnFragment {
                        delta,
                        so_far: so_far.clone(),
                    }
                })
                .map_err(TurnError::collaborator);
            futures::future::ready(Some(fragment))
        });

        Ok(Box::pin(fragments))
    }
}
