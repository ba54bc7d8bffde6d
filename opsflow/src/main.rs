//! Dropshipping operations pipeline CLI.
//!
//! `opsflow run` drives a catalog and order book through sourcing, listing,
//! pricing, routing and reporting, writing one artifact per stage into the
//! output directory. `price` and `eligible` expose the deterministic helpers on
//! their own.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use opsflow::core::catalog_filter::select_eligible;
use opsflow::core::pricing::compute_minimum_price;
use opsflow::exit_codes;
use opsflow::io::catalog::{catalog_to_csv, load_catalog};
use opsflow::io::config::{DEFAULT_CONFIG_FILE, PipelineConfig, load_config, write_config};
use opsflow::io::oracle::CommandOracle;
use opsflow::logging;
use opsflow::pipeline::{Orchestrator, load_inputs};

#[derive(Parser)]
#[command(
    name = "opsflow",
    version,
    about = "Dropshipping operations pipeline: sourcing, listing, pricing, routing, reporting"
)]
struct Cli {
    /// Path to the TOML config (defaults apply when the file is missing).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the full pipeline and write artifacts to the output directory.
    Run {
        /// Supplier catalog CSV.
        #[arg(long)]
        catalog: PathBuf,
        /// Order book CSV.
        #[arg(long)]
        orders: PathBuf,
        /// Output directory for stage artifacts and `run.json`.
        #[arg(long, default_value = "out")]
        out: PathBuf,
    },
    /// Print the minimum margin-safe price for one item as JSON.
    Price {
        #[arg(long)]
        cost: f64,
        #[arg(long)]
        shipping: f64,
    },
    /// Print the eligible catalog sample as CSV.
    Eligible {
        #[arg(long)]
        catalog: PathBuf,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("{err:#}");
            exit_code(exit_codes::INVALID)
        }
    }
}

fn dispatch(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Command::Init { force } => cmd_init(&cli.config, *force),
        Command::Run {
            catalog,
            orders,
            out,
        } => cmd_run(&cli.config, catalog, orders, out),
        Command::Price { cost, shipping } => cmd_price(&cli.config, *cost, *shipping),
        Command::Eligible { catalog } => cmd_eligible(&cli.config, catalog),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        println!("{} already exists (use --force to overwrite)", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &PipelineConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, catalog: &Path, orders: &Path, out: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let state = load_inputs(catalog, orders)?;
    let oracle = CommandOracle::from_config(&cfg);
    let orchestrator = Orchestrator::new(&oracle, cfg, out)?;
    let outcome = orchestrator.run(state)?;

    match outcome.failure() {
        None => {
            println!(
                "run completed: {} artifacts in {}",
                outcome.artifacts.len(),
                out.display()
            );
            Ok(exit_codes::OK)
        }
        Some(failure) => {
            eprintln!("run failed in {}: {}", failure.stage, failure.reason);
            eprintln!("summary: {}", outcome.summary_path.display());
            Ok(exit_codes::FAILED)
        }
    }
}

fn cmd_price(config_path: &Path, cost: f64, shipping: f64) -> Result<i32> {
    #[derive(Serialize)]
    struct PriceOutput {
        cost_price: f64,
        shipping_cost: f64,
        recommended_price: f64,
        margin: f64,
        margin_percentage: f64,
    }

    let cfg = load_config(config_path)?;
    let price = compute_minimum_price(cost, shipping, &cfg.pricing())?;
    let output = PriceOutput {
        cost_price: cost,
        shipping_cost: shipping,
        recommended_price: price.recommended_price,
        margin: price.margin,
        margin_percentage: price.margin_percentage,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("serialize price")?
    );
    Ok(exit_codes::OK)
}

fn cmd_eligible(config_path: &Path, catalog: &Path) -> Result<i32> {
    let cfg = load_config(config_path)?;
    let loaded = load_catalog(catalog)?;
    let eligible = select_eligible(&loaded.rows, cfg.min_stock, cfg.catalog_sample_limit)?;
    print!("{}", catalog_to_csv(&eligible)?);
    Ok(exit_codes::OK)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
