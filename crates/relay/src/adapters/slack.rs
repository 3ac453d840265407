//! Slack as a messaging platform: Web API client, event payloads, thread
//! history conversion and the markdown dialect Slack understands.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::models::message::{Conversation, Message};

pub const SLACK_API_HOST: &str = "https://slack.com/api";

/// Requests older than this are rejected as replays
pub const SIGNATURE_MAX_AGE_SECS: i64 = 60 * 5;

type HmacSha256 = Hmac<Sha256>;

/// Subtypes that still carry a fresh user question.
const ANSWERABLE_SUBTYPES: &[&str] = &["thread_broadcast", "file_share"];

/// A Slack message as delivered by the Events API or `conversations.replies`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    #[serde(default)]
    pub channel: String,
    pub user: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub ts: String,
    pub thread_ts: Option<String>,
    pub channel_type: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
}

impl SlackMessage {
    pub fn is_direct_message(&self) -> bool {
        self.channel_type.as_deref() == Some("im")
    }

    /// Replies go into the existing thread, or start one under this message
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// Whether this event is a new message with text from a person
    ///
    /// Edits and deletions (`message_changed`, `message_deleted`) and other
    /// housekeeping subtypes are not, and neither is a message without text.
    pub fn is_answerable(&self) -> bool {
        if self.bot_id.is_some() {
            return false;
        }
        if let Some(subtype) = self.subtype.as_deref() {
            if !ANSWERABLE_SUBTYPES.contains(&subtype) {
                return false;
            }
        }
        self.text.as_deref().map(|text| !text.trim().is_empty()).unwrap_or(false)
    }
}

/// The outer envelope Slack posts to the events endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackEnvelope {
    UrlVerification { challenge: String },
    EventCallback { event: Value },
    #[serde(other)]
    Other,
}

/// What the wiki bot needs from a chat platform
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    /// The bot's own user id, as used in `<@ID>` mentions
    async fn bot_user_id(&self) -> Result<String>;

    /// Messages of a thread, oldest first
    async fn fetch_thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SlackMessage>>;

    async fn send_message(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()>;
}

pub struct SlackClient {
    client: Client,
    host: String,
    bot_token: String,
    bot_user_id: OnceCell<String>,
}

impl SlackClient {
    pub fn new<T: Into<String>>(bot_token: T) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            host: SLACK_API_HOST.to_string(),
            bot_token: bot_token.into(),
            bot_user_id: OnceCell::new(),
        })
    }

    pub fn with_host<H: Into<String>>(mut self, host: H) -> Self {
        self.host = host.into();
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.host.trim_end_matches('/'), method)
    }

    async fn auth_test(&self) -> Result<String> {
        let body: Value = self
            .client
            .post(self.url("auth.test"))
            .bearer_auth(&self.bot_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let body = Self::check_ok("auth.test", body)?;
        body["user_id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("auth.test returned no user_id"))
    }

    /// Slack reports failures as `{"ok": false, "error": ...}` with a 200
    fn check_ok(method: &str, body: Value) -> Result<Value> {
        if body["ok"].as_bool() == Some(true) {
            Ok(body)
        } else {
            Err(anyhow!(
                "Slack {} failed: {}",
                method,
                body["error"].as_str().unwrap_or("unknown error")
            ))
        }
    }
}

#[async_trait]
impl MessagingPlatform for SlackClient {
    async fn bot_user_id(&self) -> Result<String> {
        let id = self
            .bot_user_id
            .get_or_try_init(|| self.auth_test())
            .await?;
        Ok(id.clone())
    }

    async fn fetch_thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SlackMessage>> {
        let mut query = vec![("channel", channel.to_string()), ("ts", thread_ts.to_string())];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let body: Value = self
            .client
            .get(self.url("conversations.replies"))
            .bearer_auth(&self.bot_token)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let body = Self::check_ok("conversations.replies", body)?;

        let messages: Vec<SlackMessage> =
            serde_json::from_value(body["messages"].clone()).unwrap_or_default();
        info!(
            channel,
            thread_ts,
            count = messages.len(),
            "Retrieved messages from thread"
        );
        Ok(messages)
    }

    async fn send_message(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()> {
        let body: Value = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&json!({
                "channel": channel,
                "thread_ts": thread_ts,
                "text": text,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Self::check_ok("chat.postMessage", body)?;
        debug!(channel, thread_ts, "message sent");
        Ok(())
    }
}

pub fn mention_token(bot_id: &str) -> String {
    format!("<@{}>", bot_id)
}

pub fn mentions(text: &str, bot_id: &str) -> bool {
    text.contains(&mention_token(bot_id))
}

/// Remove the bot's mention tokens from text
pub fn strip_mention(text: &str, bot_id: &str) -> String {
    let token = mention_token(bot_id);
    if text.contains(&token) {
        text.replace(&token, "").trim().to_string()
    } else {
        text.to_string()
    }
}

/// Whether the bot should answer this message
///
/// Bot authored messages, edits, deletions and empty messages are ignored.
/// Otherwise the bot answers direct messages, messages mentioning it, and
/// messages inside a thread whose parent mentioned it.
pub fn should_respond(message: &SlackMessage, bot_id: &str, parent_mentions_bot: bool) -> bool {
    if !message.is_answerable() {
        return false;
    }
    let is_mentioned = !message.is_direct_message()
        && message
            .text
            .as_deref()
            .map(|text| mentions(text, bot_id))
            .unwrap_or(false);
    message.is_direct_message() || is_mentioned || parent_mentions_bot
}

/// Convert thread messages into a conversation
///
/// Messages with the `bot_message` subtype or without text are skipped, as is
/// the message with `exclude_ts` (the one currently being answered).
pub fn thread_to_conversation(
    messages: &[SlackMessage],
    bot_id: &str,
    exclude_ts: Option<&str>,
) -> Conversation {
    messages
        .iter()
        .filter(|msg| msg.subtype.as_deref() != Some("bot_message"))
        .filter(|msg| Some(msg.ts.as_str()) != exclude_ts)
        .filter_map(|msg| {
            let text = strip_mention(msg.text.as_deref()?, bot_id);
            let message = if msg.bot_id.is_some() {
                Message::assistant()
            } else {
                Message::user()
            };
            Some(message.with_text(text))
        })
        .collect()
}

lazy_static! {
    static ref BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").unwrap();
    static ref ITALIC: Regex = Regex::new(r"_([^_]+)_").unwrap();
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`]+)`").unwrap();
    static ref STRIKE: Regex = Regex::new(r"~~(.*?)~~").unwrap();
    static ref LINK: Regex = Regex::new(r"\[(.*?)\]\((.*?)\)").unwrap();
}

/// Rewrite common markdown into Slack's mrkdwn
pub fn to_slack_markdown(text: &str) -> String {
    let text = text.replace("```", "```\n");
    let text = BOLD.replace_all(&text, "*$1*");
    let text = ITALIC.replace_all(&text, "_${1}_");
    let text = INLINE_CODE.replace_all(&text, "`$1`");
    let text = STRIKE.replace_all(&text, "~$1~");
    LINK.replace_all(&text, "$1 ($2)").into_owned()
}

/// Check the `X-Slack-Signature` of a request against the signing secret
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: i64,
) -> Result<()> {
    let sent_at: i64 = timestamp
        .parse()
        .map_err(|_| anyhow!("invalid request timestamp"))?;
    if now.abs_diff(sent_at) > SIGNATURE_MAX_AGE_SECS as u64 {
        return Err(anyhow!("request timestamp too old"));
    }

    let sig_hex = signature
        .strip_prefix("v0=")
        .ok_or_else(|| anyhow!("malformed signature"))?;
    let expected = hex::decode(sig_hex).map_err(|_| anyhow!("signature is not valid hex"))?;

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| anyhow!("invalid signing secret"))?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| anyhow!("signature mismatch"))
}

/// Produce a `v0=` signature, as Slack would
pub fn sign(signing_secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| anyhow!("invalid signing secret"))?;
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}
