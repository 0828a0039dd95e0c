use clap::{Parser, Subcommand};
use docbridge::cli::{self as prog_cli, Command, OutputMode};
use docbridge::config::ClientConfig;
use docbridge::store::MemoryStore;
use docbridge::{Client, import, utils::logger};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "docbridge", version, about = "Run shaped document queries against a seeded in-memory store", long_about = None)]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// log4rs YAML file; takes precedence over the log settings in config/env
    #[arg(long)]
    log_config: Option<PathBuf>,
    /// Database to run against (overrides config/env)
    #[arg(long)]
    db: Option<String>,
    /// Seed a collection before running: COLLECTION=PATH (NDJSON or JSON array). Repeatable.
    #[arg(long = "seed", value_parser = parse_seed)]
    seeds: Vec<(String, PathBuf)>,
    /// Skip malformed seed lines instead of failing
    #[arg(long)]
    skip_errors: bool,
    /// Deadline for each find, in milliseconds (overrides config/env)
    #[arg(long)]
    deadline_ms: Option<u64>,
    /// Print counts only
    #[arg(long)]
    plain: bool,
    /// Write per-query bench lines to dev6.log (needs a log dir)
    #[arg(long)]
    dev6: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Find with decoded options: limit, multi-key sort and projection")]
    Find {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
        #[arg(long, default_value = "{}")]
        options: String,
        #[arg(long, default_value = "")]
        projection: String,
    },
    #[command(name = "find-all", about = "Every document in natural order")]
    FindAll { collection: String },
    #[command(name = "find-one", about = "First match in _id order")]
    FindOne {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
    },
    Insert { collection: String, doc: String },
    #[command(name = "delete-one")]
    DeleteOne {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
    },
    #[command(name = "delete-many")]
    DeleteMany {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
    },
    #[command(name = "update-many")]
    UpdateMany {
        collection: String,
        #[arg(long, default_value = "{}")]
        filter: String,
        update: String,
    },
    Drop { collection: String },
}

fn parse_seed(s: &str) -> Result<(String, PathBuf), String> {
    let (col, path) = s.split_once('=').ok_or_else(|| format!("expected COLLECTION=PATH, got {s}"))?;
    if col.is_empty() || path.is_empty() {
        return Err(format!("expected COLLECTION=PATH, got {s}"));
    }
    Ok((col.to_string(), PathBuf::from(path)))
}

impl From<Commands> for Command {
    fn from(c: Commands) -> Self {
        match c {
            Commands::Find { collection, filter, options, projection } => Self::Find {
                collection,
                filter_json: filter,
                options_json: options,
                projection_json: projection,
            },
            Commands::FindAll { collection } => Self::FindAll { collection },
            Commands::FindOne { collection, filter } => Self::FindOne { collection, filter_json: filter },
            Commands::Insert { collection, doc } => Self::Insert { collection, doc_json: doc },
            Commands::DeleteOne { collection, filter } => Self::DeleteOne { collection, filter_json: filter },
            Commands::DeleteMany { collection, filter } => Self::DeleteMany { collection, filter_json: filter },
            Commands::UpdateMany { collection, filter, update } => {
                Self::UpdateMany { collection, filter_json: filter, update_json: update }
            }
            Commands::Drop { collection } => Self::Drop { collection },
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = real_main(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main(cli: Cli) -> Result<(), docbridge::errors::DbError> {
    let overrides = ClientConfig { default_database: cli.db.clone(), deadline_ms: cli.deadline_ms, ..Default::default() };
    let cfg = ClientConfig::load(overrides, cli.config.as_deref())?;
    if let Some(path) = cli.log_config.as_deref() {
        logger::init_path(path)?;
    } else if cfg.log_dir.is_some() || cfg.log_level.is_some() {
        logger::configure_logging(cfg.log_dir.as_deref(), cfg.log_level.as_deref(), cfg.log_retention, cli.dev6)?;
    }
    let database = cfg.default_database.clone().unwrap_or_else(|| "test".to_string());

    let mut client = Client::new(Arc::new(MemoryStore::new()));
    if let Some(d) = cfg.deadline() {
        client = client.with_deadline(d);
    }
    for (collection, path) in &cli.seeds {
        let report = import::import_file(&client, &database, collection, path, cli.skip_errors)?;
        log::info!("seeded {database}.{collection}: {} inserted, {} skipped", report.inserted, report.skipped);
    }

    let mode = if cli.plain { OutputMode::Plain } else { OutputMode::Json };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    prog_cli::run(&client, &database, cli.command.into(), mode, &mut out)?;
    client.disconnect()
}
