use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use relay::apps::unit_tests::SampleProgram;
use relay::providers::configs::{ANTHROPIC_HOST, OPENAI_HOST};
use relay::providers::factory::ModelChoice;

mod commands;
mod prompt;
mod session;

use commands::flight::{build_session, FlightOptions};
use commands::unit_tests::UnitTestOptions;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "OPENAI_HOST", default_value = OPENAI_HOST, global = true)]
    openai_host: String,

    #[arg(long, env = "ANTHROPIC_HOST", default_value = ANTHROPIC_HOST, global = true)]
    anthropic_host: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with the FlightAI airline assistant
    Flight {
        /// Name of the session to start or resume
        #[arg(short, long, default_value = "flight")]
        session: String,

        /// Do not speak replies
        #[arg(long)]
        no_speech: bool,

        /// Do not generate destination images
        #[arg(long)]
        no_images: bool,
    },

    /// Stream a python unit-test suite for a program
    UnitTests {
        /// Model to write the tests with (gpt or claude)
        #[arg(short, long, default_value = "gpt")]
        model: ModelChoice,

        /// Built-in sample program (pi or python_hard)
        #[arg(long, default_value = "python_hard")]
        sample: SampleProgram,

        /// Python file to test instead of a sample
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Where to save the finished suite
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Keys and hosts shared by every command
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_host: String,
    pub anthropic_host: String,
}

impl Credentials {
    pub fn openai_key(&self) -> Result<String> {
        self.openai_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set or passed with --api-key"))
    }

    pub fn anthropic_key(&self) -> Result<String> {
        self.anthropic_api_key.clone().ok_or_else(|| {
            anyhow!("ANTHROPIC_API_KEY must be set or passed with --anthropic-api-key")
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let credentials = Credentials {
        openai_api_key: cli.api_key,
        anthropic_api_key: cli.anthropic_api_key,
        openai_host: cli.openai_host,
        anthropic_host: cli.anthropic_host,
    };

    match cli.command {
        Command::Flight {
            session,
            no_speech,
            no_images,
        } => {
            let options = FlightOptions {
                session,
                speech: !no_speech,
                images: !no_images,
            };
            let mut session = build_session(&credentials, &options)?;
            session.start().await
        }
        Command::UnitTests {
            model,
            sample,
            file,
            output,
        } => {
            commands::unit_tests::run(
                &credentials,
                UnitTestOptions {
                    model,
                    sample,
                    file,
                    output,
                },
            )
            .await
        }
    }
}
