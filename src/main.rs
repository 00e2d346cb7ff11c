use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Serialize, de::DeserializeOwned};

use dca_sim::api::{self, ScenarioPayload, StrategyArgs};
use dca_sim::core::{PricePoint, RatePoint, ValuePoint, rate_index_series};

#[derive(Parser, Debug)]
#[command(
    name = "dca-sim",
    about = "Replay dollar-cost averaging strategies over historical prices"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Simulate one strategy over one series.
    Simulate {
        #[arg(
            long,
            required_unless_present = "rates",
            conflicts_with = "rates",
            help = "JSON array of {date, price, dividendPerUnit?}"
        )]
        prices: Option<PathBuf>,
        #[arg(long, help = "JSON array of {date, annualRate} savings rates")]
        rates: Option<PathBuf>,
        #[arg(long, help = "JSON array of {date, value} consumer price index")]
        price_index: Option<PathBuf>,
        #[arg(long, default_value = "portfolio")]
        label: String,
        #[command(flatten)]
        strategy: StrategyArgs,
    },
    /// Compare several assets described by a scenario file.
    Compare { scenario: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => api::run_http_server(port)
            .await
            .context("HTTP server stopped"),
        Command::Simulate {
            prices,
            rates,
            price_index,
            label,
            strategy,
        } => {
            let series = match (prices, rates) {
                (Some(path), _) => read_json::<Vec<PricePoint>>(&path)?,
                (None, Some(path)) => {
                    let table = read_json::<Vec<RatePoint>>(&path)?;
                    rate_index_series(&table)
                        .with_context(|| format!("invalid rate table {}", path.display()))?
                }
                (None, None) => anyhow::bail!("either --prices or --rates is required"),
            };
            let index = price_index
                .map(|path| read_json::<Vec<ValuePoint>>(&path))
                .transpose()?;

            let response = api::simulate_series(&label, &strategy, &series, index.as_deref())
                .context("simulation failed")?;
            print_json(&response)
        }
        Command::Compare { scenario } => {
            let payload = read_json::<ScenarioPayload>(&scenario)?;
            let response = api::evaluate_scenario(payload).context("comparison failed")?;
            print_json(&response)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to encode result")?;
    println!("{out}");
    Ok(())
}
