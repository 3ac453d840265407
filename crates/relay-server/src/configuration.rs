use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use relay::adapters::slack::SLACK_API_HOST;
use relay::apps::flight::CHAT_MODEL;
use relay::apps::unit_tests::{CLAUDE_MAX_TOKENS, CLAUDE_MODEL, OPENAI_MODEL};
use relay::providers::configs::{
    AnthropicProviderConfig, OpenAiProviderConfig, ANTHROPIC_HOST, OPENAI_HOST,
};
use relay::retrieval::DEFAULT_NUMBER_OF_RESULTS;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model behind the flight assistant
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_unit_test_model")]
    pub unit_test_model: String,
    /// Paint destination images for flight tool calls
    #[serde(default = "default_images")]
    pub images: bool,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            host: default_openai_host(),
            api_key: None,
            chat_model: default_chat_model(),
            unit_test_model: default_unit_test_model(),
            images: default_images(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnthropicSettings {
    #[serde(default = "default_anthropic_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i32,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            host: default_anthropic_host(),
            api_key: None,
            model: default_anthropic_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlackSettings {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default = "default_slack_host")]
    pub api_host: String,
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeBaseSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_number_of_results")]
    pub number_of_results: usize,
}

/// Everything the wiki bot needs, present only when Slack is configured
#[derive(Debug, Clone, PartialEq)]
pub struct WikiSettings {
    pub bot_token: String,
    pub signing_secret: String,
    pub slack_host: String,
    pub knowledge_base_host: String,
    pub knowledge_base_id: String,
    pub knowledge_base_api_key: Option<String>,
    pub number_of_results: usize,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub anthropic: AnthropicSettings,
    #[serde(default)]
    pub slack: Option<SlackSettings>,
    #[serde(default)]
    pub knowledge_base: Option<KnowledgeBaseSettings>,
}

fn required(value: &Option<String>, field_path: &str) -> Result<String, ConfigError> {
    value
        .as_ref()
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar {
            env_var: to_env_var(field_path),
        })
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })?;

        settings.chat_config()?;
        settings.claude_config()?;
        settings.wiki()?;
        Ok(settings)
    }

    /// The flight assistant's model
    pub fn chat_config(&self) -> Result<OpenAiProviderConfig, ConfigError> {
        let mut config = OpenAiProviderConfig::new(
            required(&self.openai.api_key, "openai.api_key")?,
            self.openai.chat_model.clone(),
        );
        config.host = self.openai.host.clone();
        Ok(config)
    }

    pub fn gpt_config(&self) -> Result<OpenAiProviderConfig, ConfigError> {
        let mut config = self.chat_config()?;
        config.model = self.openai.unit_test_model.clone();
        Ok(config)
    }

    pub fn claude_config(&self) -> Result<AnthropicProviderConfig, ConfigError> {
        let mut config = AnthropicProviderConfig::new(
            required(&self.anthropic.api_key, "anthropic.api_key")?,
            self.anthropic.model.clone(),
        );
        config.host = self.anthropic.host.clone();
        config.max_tokens = Some(self.anthropic.max_tokens);
        Ok(config)
    }

    /// `None` when the Slack section is absent; a partial section is an error
    pub fn wiki(&self) -> Result<Option<WikiSettings>, ConfigError> {
        let Some(slack) = &self.slack else {
            return Ok(None);
        };
        let bot_token = required(&slack.bot_token, "slack.bot_token")?;
        let signing_secret = required(&slack.signing_secret, "slack.signing_secret")?;

        let knowledge_base = self
            .knowledge_base
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("knowledge_base.id"),
            })?;

        Ok(Some(WikiSettings {
            bot_token,
            signing_secret,
            slack_host: slack.api_host.clone(),
            knowledge_base_host: required(&knowledge_base.host, "knowledge_base.host")?,
            knowledge_base_id: required(&knowledge_base.id, "knowledge_base.id")?,
            knowledge_base_api_key: knowledge_base.api_key.clone(),
            number_of_results: knowledge_base.number_of_results,
        }))
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_HOST.to_string()
}

fn default_chat_model() -> String {
    CHAT_MODEL.to_string()
}

fn default_unit_test_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_anthropic_model() -> String {
    CLAUDE_MODEL.to_string()
}

fn default_max_tokens() -> i32 {
    CLAUDE_MAX_TOKENS
}

fn default_images() -> bool {
    true
}

fn default_slack_host() -> String {
    SLACK_API_HOST.to_string()
}

fn default_number_of_results() -> usize {
    DEFAULT_NUMBER_OF_RESULTS
}
