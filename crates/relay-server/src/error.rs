use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// `openai.api_key` -> `RELAY_OPENAI__API_KEY`
pub fn to_env_var(field_path: &str) -> String {
    format!(
        "RELAY_{}",
        field_path
            .split('.')
            .map(str::to_uppercase)
            .collect::<Vec<_>>()
            .join("__")
    )
}
