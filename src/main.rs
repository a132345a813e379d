use std::io;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use openapi_assist::{
    Assistant, Cli, Collector, Config, DetailMarker, LlmAssisted, MissingFieldDetector,
    MissingFieldStrategy, OllamaClient, Session,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(&cli).context("failed to load configuration")?;
    let llm = OllamaClient::new(config.llm_http_client()?, &config.llm.url, &config.llm.model);

    let marker: DetailMarker = config.missing_fields.marker.clone();
    let assisted;
    let detector: &dyn MissingFieldDetector = match config.missing_fields.strategy {
        MissingFieldStrategy::Marker => &marker,
        MissingFieldStrategy::Llm => {
            assisted = LlmAssisted::new(&llm, marker.clone());
            &assisted
        }
    };

    let collector = Collector::new(io::stdin().lock(), io::stdout());
    let mut assistant = Assistant::new(config.http_client()?, &config, &llm, detector, collector);

    let mut session = Session::new();
    let outcomes = assistant.run(&mut session)?;
    tracing::debug!(endpoints = outcomes.len(), "run complete");
    Ok(())
}

/// Log to stderr, `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "openapi_assist=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
