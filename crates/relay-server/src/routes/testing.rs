use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::{Arc, Mutex};

use crate::state::{AppState, WikiState};
use relay::adapters::slack::{MessagingPlatform, SlackMessage};
use relay::apps::flight::FlightAssistant;
use relay::apps::unit_tests::UnitTestWriter;
use relay::apps::wiki::WikiBot;
use relay::models::message::Message;
use relay::models::tool::Tool;
use relay::providers::base::{Provider, TextStream, Usage};
use relay::retrieval::{Document, Retriever};

/// Always answers with the same text, or always fails
#[derive(Clone, Default)]
pub struct CannedProvider {
    pub reply: String,
    pub chunks: Vec<String>,
    pub fail: bool,
}

impl CannedProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Default::default()
        }
    }

    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Provider for CannedProvider {
    async fn complete(
        &self,
        _system: &str,
        _messages: &[Message],
        _tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        if self.fail {
            return Err(anyhow!("provider down"));
        }
        Ok((Message::assistant().with_text(&self.reply), Usage::default()))
    }

    async fn stream(&self, _system: &str, _messages: &[Message]) -> Result<TextStream> {
        if self.fail {
            return Err(anyhow!("provider down"));
        }
        Ok(stream::iter(self.chunks.clone().into_iter().map(Ok)).boxed())
    }
}

pub struct FixedRetriever;

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<Document>> {
        Ok(vec![Document::new("The office opens at 9am.")])
    }
}

/// Records sent replies; every thread holds only the triggering message
#[derive(Default)]
pub struct RecordingSlack {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl MessagingPlatform for RecordingSlack {
    async fn bot_user_id(&self) -> Result<String> {
        Ok("B1".to_string())
    }

    async fn fetch_thread_history(
        &self,
        _channel: &str,
        _thread_ts: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<SlackMessage>> {
        Ok(Vec::new())
    }

    async fn send_message(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((channel.into(), thread_ts.into(), text.into()));
        Ok(())
    }
}

pub const SIGNING_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

pub fn app_state(provider: CannedProvider) -> AppState {
    let provider: Arc<dyn Provider> = Arc::new(provider);
    AppState::new(
        FlightAssistant::new(provider.clone(), None, None).unwrap(),
        UnitTestWriter::new(provider.clone(), provider),
    )
}

pub fn wiki_state(provider: CannedProvider, slack: Arc<RecordingSlack>) -> AppState {
    let bot = WikiBot::new(Arc::new(provider.clone()), Arc::new(FixedRetriever));
    app_state(provider).with_wiki(WikiState {
        bot: Arc::new(bot),
        platform: slack,
        signing_secret: SIGNING_SECRET.to_string(),
    })
}
