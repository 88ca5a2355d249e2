use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agw_core::auth::{AuthSnapshot, MemoryAuth};
use agw_core::state::CoreState;
use agw_provider::config::DefaultBaseUrls;
use agw_provider::credential::{CallerCredential, PlainSecrets};
use agw_provider::upstream::{UpstreamClientConfig, WreqUpstreamClient};
use agw_provider::usage::MemoryUsageRecorder;

mod cli;

use cli::{Cli, KeySeed};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Cli::parse();

    let snapshot = load_keys(&args)?;
    let auth = Arc::new(MemoryAuth::new(snapshot));

    let mut base_urls = DefaultBaseUrls::default();
    if let Some(url) = args.openai_base_url.clone() {
        base_urls.openai = url;
    }
    if let Some(url) = args.anthropic_base_url.clone() {
        base_urls.anthropic = url;
    }
    if let Some(url) = args.gemini_base_url.clone() {
        base_urls.gemini = url;
    }

    let upstream = WreqUpstreamClient::new(UpstreamClientConfig {
        connect_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(args.http_timeout_seconds),
        stream_idle_timeout: Duration::from_secs(60),
    })
    .context("build upstream client")?;

    let state = Arc::new(CoreState {
        auth,
        secrets: Arc::new(PlainSecrets),
        usage: Arc::new(MemoryUsageRecorder::new(args.quota_tokens)),
        upstream: Arc::new(upstream),
        base_urls,
        stream_deadline: Duration::from_secs(args.stream_timeout_seconds),
    });

    let app = agw_core::handler::router(state);
    let bind = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

fn load_keys(args: &Cli) -> Result<AuthSnapshot> {
    let Some(path) = &args.keys_file else {
        tracing::warn!("no keys file configured; every request will be rejected");
        return Ok(AuthSnapshot::default());
    };

    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let seeds: Vec<KeySeed> = serde_json::from_slice(&raw)
        .with_context(|| format!("parse {}", path.display()))?;

    let mut keys = HashMap::new();
    for (index, seed) in seeds.into_iter().enumerate() {
        keys.insert(
            seed.key.clone(),
            CallerCredential {
                key_id: format!("key-{index}"),
                configs: seed.configs,
            },
        );
    }
    tracing::info!(count = keys.len(), "loaded api keys");
    Ok(AuthSnapshot { keys })
}
