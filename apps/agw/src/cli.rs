use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use agw_provider::config::ProviderConfig;

#[derive(Debug, Clone, Parser)]
#[command(name = "agw", version, about = "Multi-protocol LLM API gateway")]
pub struct Cli {
    /// Bind host.
    #[arg(long, env = "AGW_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Bind port.
    #[arg(long, env = "AGW_PORT", default_value_t = 8080)]
    pub port: u16,

    /// JSON file seeding API keys and their provider configs.
    #[arg(long, env = "AGW_KEYS_FILE")]
    pub keys_file: Option<PathBuf>,

    /// Default base URL for OpenAI-protocol upstreams.
    #[arg(long, env = "AGW_DEFAULT_BASE_URL_OPENAI")]
    pub openai_base_url: Option<String>,

    /// Default base URL for Anthropic upstreams.
    #[arg(long, env = "AGW_DEFAULT_BASE_URL_ANTHROPIC")]
    pub anthropic_base_url: Option<String>,

    /// Default base URL for Gemini upstreams.
    #[arg(long, env = "AGW_DEFAULT_BASE_URL_GEMINI")]
    pub gemini_base_url: Option<String>,

    /// Buffered upstream call deadline, seconds.
    #[arg(long, env = "AGW_HTTP_TIMEOUT_SECONDS", default_value_t = 600)]
    pub http_timeout_seconds: u64,

    /// Whole-stream deadline, seconds.
    #[arg(long, env = "AGW_STREAM_TIMEOUT_SECONDS", default_value_t = 1800)]
    pub stream_timeout_seconds: u64,

    /// Optional per-key total-token quota.
    #[arg(long, env = "AGW_QUOTA_TOKENS")]
    pub quota_tokens: Option<i64>,
}

/// One entry of the keys file: a gateway credential and its ordered provider
/// configurations.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySeed {
    pub key: String,
    #[serde(default)]
    pub configs: Vec<ProviderConfig>,
}
