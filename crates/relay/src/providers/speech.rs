use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::configs::OPENAI_HOST;
use super::utils::handle_response;

pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";
pub const DEFAULT_VOICE: &str = "onyx";

/// Turns reply text into encoded audio (mp3)
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Where synthesized audio ends up
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, audio: &[u8]) -> Result<()>;
}

pub struct OpenAiSpeechSynthesizer {
    client: Client,
    host: String,
    api_key: String,
    model: String,
    voice: String,
}

impl OpenAiSpeechSynthesizer {
    pub fn new<K: Into<String>>(api_key: K) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self {
            client,
            host: OPENAI_HOST.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_SPEECH_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        })
    }

    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let url = format!("{}/v1/audio/speech", self.host.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "voice": self.voice,
                "input": text
            }))
            .send()
            .await?;

        let bytes = handle_response(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Writes every clip into its own mp3 file
pub struct FileAudioSink {
    dir: PathBuf,
}

impl FileAudioSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<cache dir>/relay/speech`, falling back to the temp dir
    pub fn in_cache_dir() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("relay").join("speech"))
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl AudioSink for FileAudioSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.mp3", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, audio).await?;
        debug!(path = %path.display(), bytes = audio.len(), "speech clip written");
        Ok(())
    }
}

/// Speaks replies out loud. Never fails: problems are logged and dropped.
#[derive(Clone)]
pub struct Talker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    sink: Arc<dyn AudioSink>,
}

impl Talker {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, sink: Arc<dyn AudioSink>) -> Self {
        Self { synthesizer, sink }
    }

    pub async fn talk(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let audio = match self.synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "speech synthesis failed");
                return;
            }
        };
        if let Err(e) = self.sink.play(&audio).await {
            warn!(error = %e, "audio playback failed");
        }
    }
}
