use anyhow::Result;
use std::path::PathBuf;

use crate::prompt::{InputType, Prompt};
use relay::apps::flight::FlightAssistant;
use relay::models::message::Message;
use relay::pipeline::APOLOGY;
use relay::tools::Artifact;

pub mod session_file;

use session_file::{persist_messages, read_messages, save_image};

/// An interactive FlightAI conversation, persisted after every turn
pub struct Session<'a> {
    assistant: FlightAssistant,
    prompt: Box<dyn Prompt + 'a>,
    session_file: PathBuf,
}

impl<'a> Session<'a> {
    pub fn new(assistant: FlightAssistant, prompt: Box<dyn Prompt + 'a>, session_file: PathBuf) -> Self {
        Session {
            assistant,
            prompt,
            session_file,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        let mut messages = read_messages(&self.session_file)?;
        if !messages.is_empty() {
            self.prompt.render_notice(&format!(
                "Resuming session with {} earlier messages",
                messages.len()
            ));
        }
        self.prompt.relay_ready();

        loop {
            let input = self.prompt.get_input()?;
            let content = match input.input_type {
                InputType::Exit => break,
                InputType::Message => match input.content {
                    Some(content) if !content.trim().is_empty() => content,
                    _ => continue,
                },
            };

            self.prompt.show_busy();
            let result = self
                .assistant
                .chat(std::mem::take(&mut messages), &content)
                .await;
            self.prompt.hide_busy();

            match result {
                Ok(outcome) => {
                    messages = outcome.conversation;
                    if let Some(Artifact::Image { data, .. }) = &outcome.artifact {
                        let path = save_image(&self.session_file, data)?;
                        self.prompt
                            .render_notice(&format!("Destination image saved to {}", path.display()));
                    }
                    self.prompt
                        .render(&Message::assistant().with_text(outcome.reply));
                }
                Err(failure) => {
                    tracing::error!(error = %failure, "turn failed");
                    messages = failure.conversation;
                    self.prompt.render(&Message::assistant().with_text(APOLOGY));
                }
            }

            persist_messages(&self.session_file, &messages)?;
        }

        self.prompt.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Input;
    use async_trait::async_trait;
    use relay::models::tool::{Tool, ToolCall};
    use relay::providers::base::{Provider, TextStream, Usage};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;

    struct ScriptedPrompt {
        inputs: Vec<&'static str>,
        rendered: Arc<Mutex<Vec<String>>>,
    }

    impl Prompt for ScriptedPrompt {
        fn render(&mut self, message: &Message) {
            self.rendered.lock().unwrap().push(message.text());
        }

        fn render_notice(&mut self, notice: &str) {
            self.rendered.lock().unwrap().push(notice.to_string());
        }

        fn get_input(&mut self) -> Result<Input> {
            if self.inputs.is_empty() {
                return Ok(Input {
                    input_type: InputType::Exit,
                    content: None,
                });
            }
            Ok(Input {
                input_type: InputType::Message,
                content: Some(self.inputs.remove(0).to_string()),
            })
        }

        fn show_busy(&mut self) {}
        fn hide_busy(&mut self) {}
        fn close(&self) {}
        fn relay_ready(&self) {}

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    /// Quotes London on the first call, then answers plainly
    struct FareDesk;

    #[async_trait]
    impl Provider for FareDesk {
        async fn complete(
            &self,
            _system: &str,
            messages: &[Message],
            tools: &[Tool],
        ) -> anyhow::Result<(Message, Usage)> {
            let reply = if !tools.is_empty() && messages.len() == 1 {
                Message::assistant().with_tool_request(
                    "call_1",
                    Ok(ToolCall::new("get_ticket_price", json!({"destination_city": "london"}))),
                )
            } else if messages.iter().any(|m| m.text().contains("fail")) {
                return Err(anyhow::anyhow!("quota exceeded"));
            } else {
                Message::assistant().with_text("London is $799 return.")
            };
            Ok((reply, Usage::default()))
        }

        async fn stream(&self, _system: &str, _messages: &[Message]) -> anyhow::Result<TextStream> {
            Err(anyhow::anyhow!("not used"))
        }
    }

    #[tokio::test]
    async fn test_session_persists_turns_and_apologises() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("trip.jsonl");
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let prompt = ScriptedPrompt {
            inputs: vec!["How much to London?", "   ", "please fail"],
            rendered: rendered.clone(),
        };
        let assistant = FlightAssistant::new(Arc::new(FareDesk), None, None)?;

        Session::new(assistant, Box::new(prompt), file.clone())
            .start()
            .await?;

        let rendered = rendered.lock().unwrap().clone();
        assert_eq!(rendered, vec!["London is $799 return.".to_string(), APOLOGY.to_string()]);

        let stored = read_messages(&file)?;
        // tool round (4 messages) plus the failed turn's user message
        assert_eq!(stored.len(), 5);
        assert_eq!(stored[4].text(), "please fail");
        Ok(())
    }
}
