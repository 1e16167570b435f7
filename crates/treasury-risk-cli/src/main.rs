mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::schema::{AliasesArgs, SchemaArgs};
use commands::value::ValueArgs;
use treasury_risk_core::config::Config;

/// Bond portfolio valuation and yield shock analysis
#[derive(Parser)]
#[command(
    name = "trisk",
    version,
    about = "Bond portfolio valuation and yield shock analysis",
    long_about = "Reads a bond holdings CSV, normalizes its columns, and reports \
                  initial investment, amortized book value, market value and \
                  gain/loss per holding, with duration, convexity and DV01 under \
                  flat, parallel or per-ISIN yield scenarios."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// YAML config file (ingest and valuation settings)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Value a holdings CSV under a yield scenario
    Value(ValueArgs),
    /// Show how each CSV header maps to a canonical field
    Schema(SchemaArgs),
    /// Print the effective column alias table
    Aliases(AliasesArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => input::file::read_yaml(path)?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn fail(e: Box<dyn std::error::Error>) -> ! {
    eprintln!("{}: {}", "error".red().bold(), e);
    process::exit(1);
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(e),
    };

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Value(args) => commands::value::run_value(args, config),
        Commands::Schema(args) => commands::schema::run_schema(args, &config),
        Commands::Aliases(args) => commands::schema::run_aliases(args, &config),
        Commands::Version => {
            println!("trisk {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => fail(e),
    }
}
