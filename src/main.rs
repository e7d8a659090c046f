//! WikiMD - a local-first wiki server for directories of Markdown.

mod cli;
mod config;
mod content;
mod error;
mod logger;
mod paths;
mod render;
mod search;
mod serve;
mod server;
mod tree;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::Config;
use content::{ContentService, ServiceOptions};
use render::Renderer;
use search::SearchService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(&cli).context("invalid configuration")?;

    tokio::runtime::Runtime::new()
        .context("start runtime")?
        .block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let renderer = Arc::new(Renderer::new());

    let content = ContentService::new(
        &config.root,
        renderer,
        ServiceOptions {
            include_hidden: config.include_hidden,
        },
    )
    .await
    .context("content service init failed")?;

    // Search is load-bearing: a missing rg binary fails startup.
    let search = SearchService::new(&config.root)
        .map(Arc::new)
        .context("search service init failed")?;

    let shutdown = CancellationToken::new();
    let state = serve::app_state(config, Arc::clone(&content), Some(search));

    let result = serve::serve(state, shutdown.clone()).await;

    shutdown.cancel();
    content.close();
    result
}
