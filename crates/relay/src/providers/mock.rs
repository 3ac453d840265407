use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, TextStream, Usage};

/// One call observed by the mock provider
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
}

/// A mock provider that returns pre-configured responses for testing
///
/// Responses are consumed in order. A `None` entry makes that call fail,
/// which is how tests simulate an unavailable collaborator. Every call is
/// recorded so tests can inspect what was sent.
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Option<Message>>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    stream_chunks: Vec<String>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_outcomes(responses.into_iter().map(Some).collect())
    }

    pub fn with_outcomes(responses: Vec<Option<Message>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Default::default()
        }
    }

    /// A provider whose every call fails
    pub fn failing() -> Self {
        Self::with_outcomes(vec![None; 8])
    }

    pub fn with_stream_chunks<S: Into<String>>(mut self, chunks: Vec<S>) -> Self {
        self.stream_chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, system: &str, messages: &[Message], tools: &[Tool]) {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.to_string(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        });
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.record(system, messages, tools);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            return Ok((Message::assistant().with_text(""), Usage::default()));
        }
        match responses.remove(0) {
            Some(message) => Ok((message, Usage::default())),
            None => Err(anyhow!("mock provider unavailable")),
        }
    }

    async fn stream(&self, system: &str, messages: &[Message]) -> Result<TextStream> {
        self.record(system, messages, &[]);
        let chunks: Vec<Result<String>> = self.stream_chunks.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
