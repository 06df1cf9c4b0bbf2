use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use influss::config::{Args, FileConfig};
use influss::content::JinaExtractor;
use influss::server::{self, AppState};
use influss::storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("influss=info")),
        )
        .init();

    let args = Args::parse();

    let store_config = args.store_config().context("Invalid store configuration")?;

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?,
        None => FileConfig::default(),
    };
    let feed = args.feed_settings(file_config.feed);

    let store = storage::open_store(&store_config, tracing::info_span!("store"))
        .await
        .context("Failed to open store")?;

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("influss/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;
    let extractor = JinaExtractor::new(
        client,
        file_config.extractor.base_url.as_deref(),
        file_config.extractor.resolve_api_key(),
    )
    .context("Invalid extractor configuration")?;

    let state = AppState::new(store, Arc::new(extractor), feed);
    server::serve(&args.listen_addr, state).await
}
