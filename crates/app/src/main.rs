use std::path::Path;
use std::sync::Arc;

use annales_core::model::{ChapterCatalog, QuestionBank};
use services::{AppServices, Clock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

mod args;
mod bank;
mod commands;

use args::{Args, ArgsError, print_usage};
use commands::{StderrAlert, run_command};

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || matches!(argv[0].as_str(), "--help" | "-h") {
        print_usage();
        return Ok(());
    }

    let parsed = Args::parse(argv, |name| std::env::var(name).ok()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let (catalog, bank) = if parsed.bank.exists() {
        bank::load_bank(&parsed.bank)?
    } else if parsed.command.needs_bank() {
        return Err(format!("question bank not found: {}", parsed.bank.display()).into());
    } else {
        (ChapterCatalog::default(), QuestionBank::default())
    };

    prepare_sqlite_file(&parsed.config.db_url)?;
    let app = AppServices::open(&parsed.config, bank, Clock::default(), Arc::new(StderrAlert)).await?;
    app.wait_loaded().await?;

    run_command(app, &catalog, parsed.command).await
}

/// Creates the database file and its parent directories ahead of the pool.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
