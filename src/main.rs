
pub mod bus;
pub mod config;
pub mod flush;
pub mod ingest;
pub mod lifecycle;
pub mod store;
pub mod tally;

use {
    bus::{RedisVoteSource, VoteSource},
    config::Config,
    flush::flush_cycle_task,
    ingest::VoteIngestor,
    lifecycle::LifecycleCoordinator,
    rusqlite::Connection,
    std::sync::Arc,
    store::{run_schema_migrations, PollStoreWriter, SqlitePollWriter},
    tally::TallyTable,
    tokio::time::Duration,
};

#[tokio::main]
pub async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Startup failures are fatal: print the error plus usage and exit
    // non-zero. Steady-state failures never reach here.
    if let Err(e) = run().await {
        eprintln!("{}", e);
        eprintln!();
        config::print_usage();
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env();

    log::info!("Starting voteflow");
    log::info!("   Bus: {} (channel '{}')", config.bus_url, config.bus_channel);
    log::info!("   Store: {}", config.db_path);
    log::info!("   Flush interval: {}ms", config.flush_interval_ms);

    log::info!("Connecting to store...");
    let mut conn = Connection::open(&config.db_path)?;
    run_schema_migrations(&mut conn, &config.schema_dir)?;
    drop(conn);
    let store: Arc<dyn PollStoreWriter> = Arc::new(SqlitePollWriter::new(&config.db_path)?);

    log::info!("Connecting to bus...");
    let source = RedisVoteSource::connect(&config.bus_url, &config.bus_channel).await?;

    let tally = Arc::new(TallyTable::new());
    let ingestor = Arc::new(VoteIngestor::new(tally.clone()));
    let coordinator = LifecycleCoordinator::new();

    coordinator.attach_flusher(tokio::spawn(flush_cycle_task(
        tally.clone(),
        store,
        Duration::from_millis(config.flush_interval_ms),
        config.unknown_option_policy,
        coordinator.flush_token(),
    )));

    let bus_token = coordinator.bus_token();
    coordinator.attach_consumer(tokio::spawn(async move {
        source.consume(ingestor, bus_token).await
    }));

    log::info!("Waiting for votes...");
    wait_for_termination().await;

    coordinator.request_shutdown();
    coordinator
        .await_stopped(Duration::from_millis(config.shutdown_timeout_ms))
        .await;

    log::info!("voteflow stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(mut sigterm), Ok(mut sighup)) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                _ = sigterm.recv() => log::info!("Received SIGTERM"),
                _ = sighup.recv() => log::info!("Received SIGHUP"),
            }
        }
        _ => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for termination signals: {}", e);
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for CTRL+C: {}", e);
    }
}
