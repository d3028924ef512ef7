use std::process::ExitCode;

use clap::Parser;
use tabula_cli::{config, run, Command};
use tabula_db::Db;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Query a SQLite database and print JSON")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<String>,

    /// Database path, overriding the config file
    #[arg(short, long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Resolves the config file path from the command line, then
/// `TABULA_CONFIG_PATH`, then `tabula.toml`.
fn resolve_config_path(arg: Option<String>) -> (String, &'static str) {
    if let Some(path) = arg.filter(|value| !value.trim().is_empty()) {
        return (path, "cli-arg");
    }
    if let Ok(path) = std::env::var("TABULA_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (path, "env");
        }
    }
    ("tabula.toml".to_string(), "default")
}

fn main() -> ExitCode {
    let args = Args::parse();
    let (config_path, config_source) = resolve_config_path(args.config);

    let mut config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    if let Some(path) = args.database {
        config.database.path = path;
    }

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!(
        source = config_source,
        path = %config_path,
        "resolved configuration path"
    );

    let db = Db::new(config.database);
    match run(&db, &args.command).and_then(|output| Ok(serde_json::to_string_pretty(&output)?)) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
