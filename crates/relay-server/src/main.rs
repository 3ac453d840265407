use std::sync::Arc;

use anyhow::Result;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay::adapters::slack::SlackClient;
use relay::apps::flight::{Artist, FlightAssistant};
use relay::apps::unit_tests::UnitTestWriter;
use relay::apps::wiki::WikiBot;
use relay::providers::configs::ProviderConfig;
use relay::providers::factory;
use relay::providers::images::OpenAiImageGenerator;
use relay::retrieval::KnowledgeBaseRetriever;

mod configuration;
mod error;
mod routes;
mod state;

use configuration::Settings;
use state::{AppState, WikiState};

fn build_state(settings: &Settings) -> Result<AppState> {
    let chat_config = settings.chat_config()?;
    let artist = if settings.openai.images {
        let generator = OpenAiImageGenerator::new(chat_config.api_key.clone())?
            .with_host(chat_config.host.clone());
        Some(Artist::new(Arc::new(generator)))
    } else {
        None
    };
    // no speaker on a server; replies are returned, not spoken
    let flight = FlightAssistant::new(
        factory::get_provider(ProviderConfig::OpenAi(chat_config))?,
        artist,
        None,
    )?;

    let gpt = factory::get_provider(ProviderConfig::OpenAi(settings.gpt_config()?))?;
    let claude = factory::get_provider(ProviderConfig::Anthropic(settings.claude_config()?))?;
    let state = AppState::new(flight, UnitTestWriter::new(gpt, claude.clone()));

    let Some(wiki) = settings.wiki()? else {
        info!("Slack is not configured, wiki bot disabled");
        return Ok(state);
    };
    let retriever = KnowledgeBaseRetriever::new(wiki.knowledge_base_host, wiki.knowledge_base_id)?
        .with_api_key(wiki.knowledge_base_api_key)
        .with_number_of_results(wiki.number_of_results);
    let slack = SlackClient::new(wiki.bot_token)?.with_host(wiki.slack_host);

    Ok(state.with_wiki(WikiState {
        bot: Arc::new(WikiBot::new(claude, Arc::new(retriever))),
        platform: Arc::new(slack),
        signing_secret: wiki.signing_secret,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new()?;
    let state = build_state(&settings)?;

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
