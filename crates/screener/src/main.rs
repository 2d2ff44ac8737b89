mod cli;
mod ingest;
mod tui;

// remote imports
use anyhow::Context;
use clap::Parser;
use cli::Cli;
use screener_spider::repository::{MemoryRepository, PgRepository, Repository};
use screener_spider::Config;
use std::sync::Arc;
use tracing::{debug, subscriber, trace, warn, Level};
use tracing_subscriber::FmtSubscriber;

////////////////////////////////////////////////////////////////////////////

// preproccess the trace level
fn preprocess(trace_level: Level) -> anyhow::Result<()> {
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish();
    subscriber::set_global_default(my_subscriber)?;
    Ok(())
}

/// Postgres when `FINDUMP_URL` is set, otherwise an in-process store.
pub(crate) fn repository(config: &Config) -> anyhow::Result<Arc<dyn Repository>> {
    match &config.database_url {
        Some(url) => {
            trace!("creating findump connection pool");
            Ok(Arc::new(PgRepository::connect(url)?))
        }
        None => {
            warn!("FINDUMP_URL is not set, snapshots are kept in memory only");
            Ok(Arc::new(MemoryRepository::new()))
        }
    }
}

////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // set the trace level
    if let Some(trace_level) = cli.trace {
        preprocess(trace_level.into())?;
    }
    trace!("command line input recorded: {cli:?}");

    // if no trace level provided, use tui
    let tui = cli.trace.is_none();
    let config = Config::from_env()?;
    debug!(
        "configuration loaded, upstream {}, max concurrent {}",
        config.base_url, config.max_concurrent
    );

    // read cli inputs
    use cli::Commands::*;
    match cli.command {
        // `screener ingest <TICKERS>... [--force]`
        Ingest { tickers, force } => ingest::run(&config, tickers, force, tui).await?,

        // `screener show <TICKER>`
        Show { ticker } => {
            let repository = repository(&config)?;
            let snapshot = repository
                .get_snapshot(&ticker)
                .await?
                .with_context(|| format!("no snapshot stored for [{ticker}]"))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        // `screener migrate`
        Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("FINDUMP_URL must be set to migrate")?;
            PgRepository::connect(url)?.migrate().await?;
            println!("screener schema ready");
        }
    }

    Ok(())
}
