use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relay::adapters::slack::MessagingPlatform;
use relay::apps::flight::FlightAssistant;
use relay::apps::unit_tests::UnitTestWriter;
use relay::apps::wiki::WikiBot;

/// The Slack side of the server, present when the wiki bot is configured
#[derive(Clone)]
pub struct WikiState {
    pub bot: Arc<WikiBot>,
    pub platform: Arc<dyn MessagingPlatform>,
    pub signing_secret: String,
}

/// One async lock per conversation thread so turns on a thread never overlap
#[derive(Clone, Default)]
pub struct ThreadLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ThreadLocks {
    pub fn lock_for(&self, thread: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // drop locks nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(thread.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub flight: Arc<FlightAssistant>,
    pub unit_tests: Arc<UnitTestWriter>,
    pub wiki: Option<WikiState>,
    pub threads: ThreadLocks,
}

impl AppState {
    pub fn new(flight: FlightAssistant, unit_tests: UnitTestWriter) -> Self {
        Self {
            flight: Arc::new(flight),
            unit_tests: Arc::new(unit_tests),
            wiki: None,
            threads: ThreadLocks::default(),
        }
    }

    pub fn with_wiki(mut self, wiki: WikiState) -> Self {
        self.wiki = Some(wiki);
        self
    }
}
