//! GraftDB Command-Line Interface
//!
//! Tools for moving tables between GraftDB instances.
//!
//! # Usage
//!
//! ```bash
//! # Show the metadata embedded in a data file
//! graft inspect ./data/orders.gft
//!
//! # Walk a data file and check its structure
//! graft verify ./data/orders.gft
//!
//! # Print the configuration string to import a table elsewhere
//! graft export --data-dir ./data table:orders
//!
//! # Attach a copied data file using an exported configuration
//! graft import --data-dir ./other table:orders "$(graft export --data-dir ./data table:orders)"
//!
//! # Attach a data file without exported metadata
//! graft import --data-dir ./other --repair table:orders
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod formatter;

use formatter::OutputFormat;
use graft_common::config::EngineConfig;

/// GraftDB command-line interface
#[derive(Parser, Debug)]
#[command(
    name = "graft",
    author = "GraftDB Team",
    version,
    about = "Inspect, verify, export and import GraftDB tables",
    long_about = "Tools for moving tables between GraftDB instances.\n\n\
                  Export a table's configuration from one data directory, copy its data\n\
                  file, and import it into another directory without rewriting it."
)]
struct Args {
    /// Engine configuration file (TOML)
    #[arg(long, value_name = "FILE", env = "GRAFT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "table", global = true)]
    output: OutputFormatArg,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the metadata embedded in a data file
    Inspect {
        /// Data file to read
        file: PathBuf,
    },
    /// Walk a data file's page tree and check its structure
    Verify {
        /// Data file to read
        file: PathBuf,
    },
    /// Print a table's configuration string
    Export {
        /// Data directory (overrides the config file)
        #[arg(long, value_name = "DIR", env = "GRAFT_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Table URI, or file:<name> for the file-level view
        uri: String,
    },
    /// Create a table, or attach the data file already in the data directory
    Import {
        /// Data directory (overrides the config file)
        #[arg(long, value_name = "DIR", env = "GRAFT_DATA_DIR")]
        data_dir: Option<PathBuf>,
        /// Rebuild the table from the data file alone
        #[arg(long, conflicts_with = "table_config")]
        repair: bool,
        /// Reject files holding timestamps newer than this
        #[arg(long, value_name = "TS")]
        stable_timestamp: Option<u64>,
        /// Table URI
        uri: String,
        /// Exported configuration, or a create configuration
        #[arg(value_name = "CONFIG")]
        table_config: Option<String>,
    },
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Display results in a formatted table
    Table,
    /// Display results as JSON
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<String> {
    let args = Args::parse();
    init_logging(args.verbose);
    let format = OutputFormat::from(args.output);

    match &args.command {
        Command::Inspect { file } => commands::inspect(file, format),
        Command::Verify { file } => commands::verify(file, format),
        Command::Export { data_dir, uri } => {
            let config = load_config(&args, data_dir.as_ref())?;
            commands::export(config, uri, format)
        }
        Command::Import {
            data_dir,
            repair,
            stable_timestamp,
            uri,
            table_config,
        } => {
            let config = load_config(&args, data_dir.as_ref())?;
            info!(uri = %uri, data_dir = %config.data_dir.display(), "importing");
            let request = commands::ImportArgs {
                uri,
                table_config: table_config.as_deref(),
                repair: *repair,
                stable_timestamp: *stable_timestamp,
            };
            commands::import(config, &request, format)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("graft=debug,graft_cli=debug,graft_engine=debug,graft_catalog=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args, data_dir: Option<&PathBuf>) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}
