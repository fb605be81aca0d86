//! Seed poll records into the aggregate store from a JSON file.
//!
//! The counter never creates polls itself; it only increments aggregates
//! on polls that already exist. This tool populates the store for
//! development and testing.
//!
//! Usage:
//!   cargo run --bin seed_polls [polls.json]
//!
//! File format: [{"id": "...", "title": "...", "options": ["...", ...]}]
//! Environment: VOTEFLOW_DB_PATH, VOTEFLOW_SCHEMA_DIR (see main binary).

use dotenv::dotenv;
use log::info;
use rusqlite::Connection;
use voteflow::config::Config;
use voteflow::store::{load_poll_file, run_schema_migrations, seed_polls};

fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "polls.json".to_string());
    if let Err(e) = run(&path) {
        eprintln!("{}", e);
        eprintln!();
        eprintln!("Usage: seed_polls [polls.json]");
        std::process::exit(1);
    }
}

fn run(path: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env();

    let polls = load_poll_file(path)?;
    info!("Loaded {} poll(s) from {}", polls.len(), path);

    let mut conn = Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    let seeded = seed_polls(&mut conn, &polls)?;

    info!("Seeded {} poll(s) into {}", seeded, config.db_path);
    Ok(())
}
