use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tuner::{
    commands::{export_market_data, strategies, sweep},
    config::SweepSettings,
    strategy::StrategyRegistry,
};

#[derive(Parser)]
#[command(name = "tuner")]
#[command(about = "Exhaustive parameter sweeps for intraday FX strategies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest every combination of a strategy's parameter grid
    Sweep {
        /// Registered strategy name
        #[arg(long)]
        strategy: String,
        /// Symbols to sweep (defaults to EURUSD)
        #[arg(long = "symbol", value_delimiter = ',')]
        symbols: Vec<String>,
        /// Sweep all seven major pairs
        #[arg(long, conflicts_with = "symbols")]
        all_pairs: bool,
        /// JSON object of parameter name to candidate list
        #[arg(long, value_name = "PATH")]
        grid: Option<PathBuf>,
        /// Read candles from a market data snapshot instead of CSV files
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Report destination (defaults to {output_dir}/{strategy}_results.csv)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// List registered strategies and their declared grids
    Strategies,
    /// Export CSV market data into a snapshot for `sweep --data-file`
    ExportMarketData {
        #[arg(long = "symbol", value_delimiter = ',')]
        symbols: Vec<String>,
        #[arg(long)]
        all_pairs: bool,
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let Cli { command } = Cli::parse();

    let settings = SweepSettings::from_env()?;
    let registry = StrategyRegistry::with_builtin();

    match command {
        Commands::Sweep {
            strategy,
            symbols,
            all_pairs,
            grid,
            data_file,
            output,
        } => {
            let request = sweep::SweepRequest {
                strategy,
                symbols,
                all_pairs,
                grid_file: grid,
                output,
            };
            info!(
                "Sweeping {} over {}",
                request.strategy,
                request.resolved_symbols().join(", ")
            );
            sweep::run(&registry, &request, &settings, data_file.as_deref())?;
        }
        Commands::Strategies => {
            strategies::run(&registry)?;
        }
        Commands::ExportMarketData {
            symbols,
            all_pairs,
            output,
        } => {
            let request = sweep::SweepRequest {
                symbols,
                all_pairs,
                ..sweep::SweepRequest::default()
            };
            export_market_data::run(&settings, &request.resolved_symbols(), &output)?;
        }
    }

    Ok(())
}
