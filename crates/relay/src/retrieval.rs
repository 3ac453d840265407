//! Knowledge-base retrieval and search-query rewriting for RAG turns.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::models::message::Message;
use crate::models::role::Role;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::Provider;
use crate::providers::utils::handle_response;

pub const DEFAULT_NUMBER_OF_RESULTS: usize = 5;

pub const SEARCH_QUERY_SYSTEM_PROMPT: &str = "You are a search query optimizer. Generate a single, specific search query. \
When you lack information to build a good search query, just return the user's question. \
The current question is the most important part of the search query. use the conversation history just to contextualize the question. \
Return only the search query, no other text.";

/// One retrieved snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub source: Option<String>,
    pub score: Option<f64>,
}

impl Document {
    pub fn new<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            source: None,
            score: None,
        }
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Documents for the query, most relevant first
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;
}

/// Documents joined the way they are stuffed into the prompt
pub fn format_context(documents: &[Document]) -> String {
    documents
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The last `n` characters of `text`, for log lines
pub fn last_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// HTTP client for a managed knowledge base exposing a `retrieve` action
pub struct KnowledgeBaseRetriever {
    client: Client,
    host: String,
    knowledge_base_id: String,
    api_key: Option<String>,
    number_of_results: usize,
}

impl KnowledgeBaseRetriever {
    pub fn new<H: Into<String>, K: Into<String>>(host: H, knowledge_base_id: K) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            host: host.into(),
            knowledge_base_id: knowledge_base_id.into(),
            api_key: None,
            number_of_results: DEFAULT_NUMBER_OF_RESULTS,
        })
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_number_of_results(mut self, number_of_results: usize) -> Self {
        self.number_of_results = number_of_results;
        self
    }

    fn parse_results(body: &Value) -> Result<Vec<Document>> {
        let results = body
            .get("retrievalResults")
            .and_then(|r| r.as_array())
            .ok_or_else(|| anyhow!("Invalid response format from knowledge base"))?;

        Ok(results
            .iter()
            .filter_map(|result| {
                let content = result["content"]["text"].as_str()?;
                let location = &result["location"];
                let source = location["s3Location"]["uri"]
                    .as_str()
                    .or_else(|| location["webLocation"]["url"].as_str())
                    .or_else(|| location["confluenceLocation"]["url"].as_str())
                    .map(String::from);
                Some(Document {
                    content: content.to_string(),
                    source,
                    score: result["score"].as_f64(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl Retriever for KnowledgeBaseRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let url = format!(
            "{}/knowledgebases/{}/retrieve",
            self.host.trim_end_matches('/'),
            self.knowledge_base_id
        );
        let payload = json!({
            "retrievalQuery": {"text": query},
            "retrievalConfiguration": {
                "vectorSearchConfiguration": {
                    "numberOfResults": self.number_of_results,
                    "overrideSearchType": "SEMANTIC"
                }
            }
        });

        let mut request = self.client.post(&url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let body: Value = handle_response(request.send().await?).await?.json().await?;

        let documents = Self::parse_results(&body)?;
        info!(count = documents.len(), "retrieved knowledge base documents");
        Ok(documents)
    }
}

/// Turns the conversation plus current question into one search query
#[derive(Clone)]
pub struct QueryRewriter {
    provider: Arc<dyn Provider>,
}

impl QueryRewriter {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    fn format_history(history: &[Message]) -> String {
        history
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| (m, m.text()))
            .filter(|(_, text)| !text.is_empty())
            .map(|(m, text)| {
                let speaker = if m.role == Role::User { "User" } else { "Assistant" };
                format!("{}: {}", speaker, text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn try_rewrite(&self, history: &[Message], question: &str) -> Result<String> {
        let prompt = load_prompt_file(
            "search_query.md",
            &json!({
                "history": Self::format_history(history),
                "question": question,
            }),
        )?;
        let (response, _) = self
            .provider
            .complete(
                SEARCH_QUERY_SYSTEM_PROMPT,
                &[Message::user().with_text(prompt)],
                &[],
            )
            .await?;

        let query = response.text().trim().to_string();
        if query.is_empty() {
            return Err(anyhow!("model returned an empty search query"));
        }
        Ok(query)
    }

    /// Rewrite the question; any failure yields the question unchanged
    pub async fn rewrite(&self, history: &[Message], question: &str) -> String {
        match self.try_rewrite(history, question).await {
            Ok(query) => {
                info!(
                    "Generated search query (last 500 chars): ...{}",
                    last_chars(&query, 500)
                );
                query
            }
            Err(e) => {
                error!(error = %e, "Error generating search query");
                question.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_format_context_joins_with_blank_line() {
        let docs = vec![Document::new("first"), Document::new("second")];
        assert_eq!(format_context(&docs), "first\n\nsecond");
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_last_chars_is_char_safe() {
        assert_eq!(last_chars("short", 500), "short");
        assert_eq!(last_chars("abcdef", 3), "def");
        assert_eq!(last_chars("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn test_retrieve_parses_results_in_order() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/knowledgebases/KB123/retrieve"))
            .and(header("Authorization", "Bearer kb-key"))
            .and(body_partial_json(json!({
                "retrievalQuery": {"text": "vpn setup"},
                "retrievalConfiguration": {
                    "vectorSearchConfiguration": {
                        "numberOfResults": 5,
                        "overrideSearchType": "SEMANTIC"
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retrievalResults": [
                    {
                        "content": {"text": "Install the VPN client."},
                        "location": {"s3Location": {"uri": "s3://wiki/vpn.md"}},
                        "score": 0.91
                    },
                    {
                        "content": {"text": "Ask IT for a token."},
                        "location": {"webLocation": {"url": "https://wiki/it"}},
                        "score": 0.55
                    },
                    {"location": {}}
                ]
            })))
            .mount(&mock_server)
            .await;

        let retriever = KnowledgeBaseRetriever::new(mock_server.uri(), "KB123")?
            .with_api_key(Some("kb-key".to_string()));
        let docs = retriever.retrieve("vpn setup").await?;

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "Install the VPN client.");
        assert_eq!(docs[0].source.as_deref(), Some("s3://wiki/vpn.md"));
        assert_eq!(docs[0].score, Some(0.91));
        assert_eq!(docs[1].source.as_deref(), Some("https://wiki/it"));
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_surfaces_http_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("denied"))
            .mount(&mock_server)
            .await;

        let retriever = KnowledgeBaseRetriever::new(mock_server.uri(), "KB").unwrap();
        assert!(retriever.retrieve("anything").await.is_err());
    }

    #[tokio::test]
    async fn test_rewrite_sends_history_and_trims_reply() {
        let provider = MockProvider::new(vec![
            Message::assistant().with_text("  corporate vpn installation  ")
        ]);
        let rewriter = QueryRewriter::new(Arc::new(provider.clone()));
        let history = vec![
            Message::user().with_text("I'm new here"),
            Message::assistant().with_text("Welcome!"),
        ];

        let query = rewriter.rewrite(&history, "how do I get on the vpn?").await;

        assert_eq!(query, "corporate vpn installation");
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, SEARCH_QUERY_SYSTEM_PROMPT);
        assert_eq!(
            calls[0].messages[0].text(),
            "Conversation History:\nUser: I'm new here\nAssistant: Welcome!\n\nCurrent Question: how do I get on the vpn?"
        );
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_on_failure() {
        let rewriter = QueryRewriter::new(Arc::new(MockProvider::failing()));
        assert_eq!(rewriter.rewrite(&[], "raw question").await, "raw question");
    }

    #[tokio::test]
    async fn test_rewrite_falls_back_on_empty_reply() {
        let provider = MockProvider::new(vec![Message::assistant().with_text("   ")]);
        let rewriter = QueryRewriter::new(Arc::new(provider));
        assert_eq!(rewriter.rewrite(&[], "raw question").await, "raw question");
    }
}
