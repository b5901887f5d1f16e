//! ruledao Command-Line Client
//!
//! Inspect constraint templates and query a local ruledao store.

mod executor;
mod formatter;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ruledao_core::{DaoConfig, Evaluator, FunctionTable, StoreSession};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use executor::ExecuteError;
use formatter::{create_formatter, OutputFormat};

/// ruledao Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "ruledao")]
#[command(version, about = "ruledao Command-Line Client")]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data directory, overriding the configured storage path
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a constraint template into a parameterized query
    Resolve {
        template: String,

        /// JSON record to evaluate the parameters against
        #[arg(short, long)]
        record: Option<String>,
    },

    /// Run query text against the store
    Query {
        text: String,

        /// Parameter binding as name=value (value read as JSON when possible)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Remove every record of an entity type
    Clean { entity: String },

    /// List stored entity types
    Entities,

    /// Print the effective configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ruledao_cli=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let formatter = create_formatter(args.format);

    match run(args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Result<DaoConfig, ExecuteError> {
    let mut config = match &args.config {
        Some(path) => DaoConfig::from_file(path)?,
        None => DaoConfig::default(),
    };
    if let Some(data) = &args.data {
        config.storage.path = data.clone();
    }
    debug!(path = %config.storage.path.display(), "configuration loaded");
    Ok(config)
}

fn run(args: Args) -> Result<String, ExecuteError> {
    let config = load_config(&args)?;
    let formatter = create_formatter(args.format);

    match &args.command {
        Command::Resolve { template, record } => {
            let evaluator = Evaluator::new(FunctionTable::builtins(), config.properties.clone());
            executor::resolve(template, record.as_deref(), &evaluator, &*formatter)
        }
        Command::Query { text, params } => {
            let session = StoreSession::open(config.storage)?;
            executor::query(&session, text, params, &*formatter)
        }
        Command::Clean { entity } => {
            let session = StoreSession::open(config.storage)?;
            executor::clean(&session, entity, &*formatter)
        }
        Command::Entities => {
            let session = StoreSession::open(config.storage)?;
            Ok(executor::entities(session.engine(), &*formatter))
        }
        Command::Config => serde_json::to_string_pretty(&config)
            .map_err(|e| ExecuteError::Core(ruledao_core::Error::Serialization(e.to_string()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = Args::parse_from([
            "ruledao",
            "--format",
            "json",
            "query",
            "find Country where code = :c",
            "-p",
            "c=FR",
        ]);
        assert_eq!(args.format, OutputFormat::Json);
        match args.command {
            Command::Query { text, params } => {
                assert_eq!(text, "find Country where code = :c");
                assert_eq!(params, vec!["c=FR".to_string()]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_data_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruledao.json");
        std::fs::write(&path, r#"{"continue_on_error": true}"#).unwrap();

        let args = Args::parse_from([
            "ruledao",
            "--config",
            path.to_str().unwrap(),
            "--data",
            "/tmp/elsewhere",
            "config",
        ]);
        let config = load_config(&args).unwrap();
        assert!(config.continue_on_error);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_run_against_store() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().to_str().unwrap();

        let out = run(Args::parse_from(["ruledao", "--data", data, "entities"])).unwrap();
        assert!(!out.contains("Country"));

        let out = run(Args::parse_from([
            "ruledao", "--data", data, "--format", "json", "query", "count Country",
        ]))
        .unwrap();
        assert!(out.contains("\"count\": 0"));
    }
}
