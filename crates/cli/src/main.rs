mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use commands::mutate::MutateArgs;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "HEARTH_LOG";

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Optimistic mutations against a REST API through the hearth query cache.
#[derive(Parser)]
#[command(
    name = "hearth",
    version,
    about = "Optimistic mutations over a client-side query cache"
)]
struct Cli {
    /// Path to the hearth.toml config file
    #[arg(long, global = true, default_value = "hearth.toml")]
    config: PathBuf,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a payload file against an entity's request schema
    Validate {
        /// Entity tag as configured under [entities]
        entity: String,
        /// Path to the JSON payload
        payload: PathBuf,
    },

    /// Fetch a list page and print it
    Fetch {
        entity: String,
        /// List query parameter, repeatable (e.g. --param page=1)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Create an entity, printing the list while pending and once settled
    Create {
        entity: String,
        /// Path to the JSON payload
        payload: PathBuf,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Update an entity, printing the list while pending and once settled
    Update {
        entity: String,
        /// Server id of the entity to update
        id: String,
        /// Path to the JSON payload with the changed fields
        payload: PathBuf,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Delete an entity, printing the list while pending and once settled
    Delete {
        entity: String,
        /// Server id of the entity to delete
        id: String,
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Validate { entity, payload } => {
            commands::validate::cmd_validate(&cli.config, &entity, &payload, cli.output, cli.quiet);
        }
        Commands::Fetch { entity, params } => {
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::fetch::cmd_fetch(
                &cli.config,
                &entity,
                &params,
                cli.output,
                cli.quiet,
            ));
        }
        Commands::Create {
            entity,
            payload,
            params,
        } => {
            let args = MutateArgs::create(entity, payload, params);
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::mutate::cmd_mutate(&cli.config, args, cli.output, cli.quiet));
        }
        Commands::Update {
            entity,
            id,
            payload,
            params,
        } => {
            let args = MutateArgs::update(entity, id, payload, params);
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::mutate::cmd_mutate(&cli.config, args, cli.output, cli.quiet));
        }
        Commands::Delete { entity, id, params } => {
            let args = MutateArgs::delete(entity, id, params);
            let rt = runtime(cli.output, cli.quiet);
            rt.block_on(commands::mutate::cmd_mutate(&cli.config, args, cli.output, cli.quiet));
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{}'", raw)),
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            let json = serde_json::json!({ "error": msg });
            eprintln!("{}", json);
        }
    }
}
