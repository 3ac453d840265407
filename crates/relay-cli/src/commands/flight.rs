use anyhow::Result;
use std::sync::Arc;

use crate::prompt::cliclack::CliclackPrompt;
use crate::session::session_file::{ensure_session_dir, session_path};
use crate::session::Session;
use crate::Credentials;
use relay::apps::flight::{Artist, FlightAssistant, CHAT_MODEL};
use relay::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use relay::providers::factory;
use relay::providers::images::OpenAiImageGenerator;
use relay::providers::speech::{FileAudioSink, OpenAiSpeechSynthesizer, Talker};

pub struct FlightOptions {
    pub session: String,
    pub speech: bool,
    pub images: bool,
}

pub fn build_session(credentials: &Credentials, options: &FlightOptions) -> Result<Session<'static>> {
    let api_key = credentials.openai_key()?;
    let mut config = OpenAiProviderConfig::new(api_key.clone(), CHAT_MODEL);
    config.host = credentials.openai_host.clone();
    let provider = factory::get_provider(ProviderConfig::OpenAi(config))?;

    let artist = if options.images {
        let generator =
            OpenAiImageGenerator::new(api_key.clone())?.with_host(credentials.openai_host.clone());
        Some(Artist::new(Arc::new(generator)))
    } else {
        None
    };

    let talker = if options.speech {
        let synthesizer =
            OpenAiSpeechSynthesizer::new(api_key)?.with_host(credentials.openai_host.clone());
        let sink = FileAudioSink::in_cache_dir();
        tracing::info!(dir = %sink.dir().display(), "writing spoken replies");
        Some(Talker::new(Arc::new(synthesizer), Arc::new(sink)))
    } else {
        None
    };

    let assistant = FlightAssistant::new(provider, artist, talker)?;
    let session_file = session_path(&ensure_session_dir()?, &options.session);

    Ok(Session::new(
        assistant,
        Box::new(CliclackPrompt::new()),
        session_file,
    ))
}
