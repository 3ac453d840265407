//! FlightAI: an airline assistant that quotes and books return tickets,
//! paints the destination and reads its answers out loud.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::AgentResult;
use crate::models::message::Conversation;
use crate::models::tool::Tool;
use crate::pipeline::{PipelineConfig, TurnFailure, TurnOutcome, TurnPipeline};
use crate::providers::base::Provider;
use crate::providers::images::ImageGenerator;
use crate::providers::speech::Talker;
use crate::tools::{required_str, Artifact, ToolHandler, ToolOutput, ToolRegistry};

pub const CHAT_MODEL: &str = "gpt-4o-mini";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for an Airline called FlightAI. \
Give short, courteous answers, no more than 1 sentence. \
Always be accurate. If you don't know the answer, say so.";

pub const UNKNOWN_PRICE: &str = "Unknown";

const TICKET_PRICES: [(&str, &str); 4] = [
    ("london", "$799"),
    ("paris", "$899"),
    ("tokyo", "$1400"),
    ("berlin", "$499"),
];

/// Price of a return ticket, matched case-insensitively
pub fn ticket_price(destination_city: &str) -> &'static str {
    let city = destination_city.to_lowercase();
    TICKET_PRICES
        .iter()
        .find(|(name, _)| *name == city)
        .map(|(_, price)| *price)
        .unwrap_or(UNKNOWN_PRICE)
}

pub fn image_prompt(city: &str) -> String {
    format!(
        "An image representing a vacation in {city}, showing tourist spots and everything unique about {city}, in a vibrant pop-art style"
    )
}

fn destination_parameters() -> Value {
    json!({
        "type": "object",
        "properties": {
            "destination_city": {
                "type": "string",
                "description": "The city that the customer wants to travel to",
            },
        },
        "required": ["destination_city"],
        "additionalProperties": false
    })
}

pub fn price_tool() -> Tool {
    Tool::new(
        "get_ticket_price",
        "Get the price of a return ticket to the destination city. Call this whenever you need to know the ticket price, for example when a customer asks 'How much is a ticket to this city'",
        destination_parameters(),
    )
}

pub fn book_tool() -> Tool {
    Tool::new(
        "book_ticket",
        "Book a return ticket to the destination city. Call this whenever you want to book a ticket, for example when a customer confirms their intent to buy a ticket after knowing the ticket price.",
        destination_parameters(),
    )
}

/// Paints the destination of a tool call; failures only cost the picture
#[derive(Clone)]
pub struct Artist {
    generator: Arc<dyn ImageGenerator>,
}

impl Artist {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }

    pub async fn paint(&self, city: &str) -> Option<Artifact> {
        match self.generator.generate_image(&image_prompt(city)).await {
            Ok(data) => Some(Artifact::png(data)),
            Err(e) => {
                warn!(city, error = %e, "image generation failed");
                None
            }
        }
    }
}

async fn paint(artist: &Option<Artist>, city: &str) -> Option<Artifact> {
    match artist {
        Some(artist) => artist.paint(city).await,
        None => None,
    }
}

pub struct TicketPriceTool {
    artist: Option<Artist>,
}

#[async_trait]
impl ToolHandler for TicketPriceTool {
    async fn call(&self, arguments: &Value) -> AgentResult<ToolOutput> {
        let city = required_str(arguments, "destination_city")?;
        info!(city, "Tool get_ticket_price called");
        let content = json!({
            "destination_city": city,
            "price": ticket_price(city),
        })
        .to_string();
        Ok(ToolOutput::text(content).with_artifact(paint(&self.artist, city).await))
    }
}

pub struct BookTicketTool {
    artist: Option<Artist>,
}

#[async_trait]
impl ToolHandler for BookTicketTool {
    async fn call(&self, arguments: &Value) -> AgentResult<ToolOutput> {
        let city = required_str(arguments, "destination_city")?;
        info!(city, "Return ticket booked");
        Ok(ToolOutput::text(format!("Return ticket booked to {}", city))
            .with_artifact(paint(&self.artist, city).await))
    }
}

pub fn flight_tools(artist: Option<Artist>) -> AgentResult<Arc<ToolRegistry>> {
    ToolRegistry::builder()
        .register(
            price_tool(),
            Arc::new(TicketPriceTool {
                artist: artist.clone(),
            }),
        )
        .register(book_tool(), Arc::new(BookTicketTool { artist }))
        .build()
}

pub struct FlightAssistant {
    pipeline: TurnPipeline,
    talker: Option<Talker>,
}

impl FlightAssistant {
    pub fn new(
        provider: Arc<dyn Provider>,
        artist: Option<Artist>,
        talker: Option<Talker>,
    ) -> AgentResult<Self> {
        let config = PipelineConfig::new(SYSTEM_PROMPT, provider).with_tools(flight_tools(artist)?);
        Ok(Self {
            pipeline: TurnPipeline::new(config),
            talker,
        })
    }

    /// One chat turn; the reply is spoken when a talker is configured
    pub async fn chat(
        &self,
        history: Conversation,
        message: &str,
    ) -> Result<TurnOutcome, TurnFailure> {
        let outcome = self.pipeline.process_turn(history, message).await?;
        if let Some(talker) = &self.talker {
            talker.talk(&outcome.reply).await;
        }
        Ok(outcome)
    }
}
