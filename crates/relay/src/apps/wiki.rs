//! Wiki bot: answers Slack questions from a knowledge base.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use crate::adapters::slack::{
    mentions, should_respond, strip_mention, thread_to_conversation, to_slack_markdown,
    MessagingPlatform, SlackMessage,
};
use crate::models::message::Conversation;
use crate::pipeline::{
    PipelineConfig, RetrievalConfig, TurnFailure, TurnOutcome, TurnPipeline, APOLOGY,
};
use crate::providers::base::Provider;
use crate::retrieval::{last_chars, QueryRewriter, Retriever};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on the provided context and previous conversation history. \
Do not make mentions of the context provided, or even that there is context provided. Just answer the question.";

/// What happened to an inbound Slack message
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Ignored,
    Answered(String),
    Apologized,
}

pub struct WikiBot {
    pipeline: TurnPipeline,
}

impl WikiBot {
    /// The chat model doubles as the search-query rewriter
    pub fn new(provider: Arc<dyn Provider>, retriever: Arc<dyn Retriever>) -> Self {
        let retrieval = RetrievalConfig {
            retriever,
            rewriter: Some(QueryRewriter::new(provider.clone())),
        };
        let config = PipelineConfig::new(SYSTEM_PROMPT, provider).with_retrieval(retrieval);
        Self {
            pipeline: TurnPipeline::new(config),
        }
    }

    pub async fn answer(
        &self,
        history: Conversation,
        question: &str,
    ) -> Result<TurnOutcome, TurnFailure> {
        let outcome = self.pipeline.process_turn(history, question).await?;
        info!(
            "Final response (last 500 chars): ...{}",
            last_chars(&outcome.reply, 500)
        );
        Ok(outcome)
    }

    async fn parent_mentions_bot(
        platform: &dyn MessagingPlatform,
        message: &SlackMessage,
        bot_id: &str,
    ) -> bool {
        let Some(thread_ts) = message.thread_ts.as_deref() else {
            return false;
        };
        match platform
            .fetch_thread_history(&message.channel, thread_ts, Some(1))
            .await
        {
            Ok(messages) => messages
                .first()
                .and_then(|parent| parent.text.as_deref())
                .map(|text| mentions(text, bot_id))
                .unwrap_or(false),
            Err(e) => {
                error!(error = %e, "Error checking thread parent message");
                false
            }
        }
    }

    async fn thread_history(
        platform: &dyn MessagingPlatform,
        message: &SlackMessage,
        bot_id: &str,
    ) -> Conversation {
        let thread_ts = message.reply_thread_ts();
        match platform
            .fetch_thread_history(&message.channel, thread_ts, None)
            .await
        {
            Ok(messages) => {
                let history = thread_to_conversation(&messages, bot_id, Some(&message.ts));
                info!(count = history.len(), "Processed thread into conversation history");
                history
            }
            Err(e) => {
                error!(error = %e, "Error fetching conversation history");
                Vec::new()
            }
        }
    }

    /// Decide whether to answer a Slack message and reply in its thread
    pub async fn handle_message(
        &self,
        platform: &dyn MessagingPlatform,
        message: &SlackMessage,
    ) -> Result<Handled> {
        if !message.is_answerable() {
            return Ok(Handled::Ignored);
        }
        let bot_id = platform.bot_user_id().await?;

        let in_relevant_thread = Self::parent_mentions_bot(platform, message, &bot_id).await;
        if !should_respond(message, &bot_id, in_relevant_thread) {
            return Ok(Handled::Ignored);
        }

        let raw_text = message.text.as_deref().unwrap_or_default();
        let question = if message.is_direct_message() {
            raw_text.to_string()
        } else {
            strip_mention(raw_text, &bot_id)
        };
        let reply_ts = message.reply_thread_ts();

        let history = Self::thread_history(platform, message, &bot_id).await;
        match self.answer(history, &question).await {
            Ok(outcome) => {
                let formatted = to_slack_markdown(&outcome.reply);
                platform
                    .send_message(&message.channel, reply_ts, &formatted)
                    .await?;
                info!("Successfully sent response to Slack");
                Ok(Handled::Answered(formatted))
            }
            Err(failure) => {
                error!(error = %failure, "Error processing message");
                platform
                    .send_message(&message.channel, reply_ts, APOLOGY)
                    .await?;
                Ok(Handled::Apologized)
            }
        }
    }
}
