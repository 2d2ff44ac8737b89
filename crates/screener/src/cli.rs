use clap::{Parser, Subcommand, ValueEnum};
use screener_spider::ticker::TickerError;
use screener_spider::Ticker;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets the level of tracing; progress bars are shown only without it.
    #[arg(short, long, global = true)]
    pub trace: Option<TraceLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest company fundamentals from screener.in and wait for every run to finish.
    Ingest {
        /// Stock symbols, e.g. `SUZLON TCS INFY`. Repeats are ingested once.
        #[arg(required = true, value_parser = parse_ticker)]
        tickers: Vec<Ticker>,

        /// Re-ingest even when the stored data is still fresh.
        #[arg(short, long)]
        force: bool,
    },

    /// Print the stored snapshot of a ticker as JSON.
    Show {
        #[arg(value_parser = parse_ticker)]
        ticker: Ticker,
    },

    /// Create the `screener` schema in the PostgreSQL database (findump).
    Migrate,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[clap(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    DEBUG,
    ERROR,
    INFO,
    TRACE,
    WARN,
}

impl From<TraceLevel> for Level {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::DEBUG => Level::DEBUG,
            TraceLevel::ERROR => Level::ERROR,
            TraceLevel::INFO => Level::INFO,
            TraceLevel::TRACE => Level::TRACE,
            TraceLevel::WARN => Level::WARN,
        }
    }
}

fn parse_ticker(raw: &str) -> Result<Ticker, TickerError> {
    Ticker::parse(raw)
}
