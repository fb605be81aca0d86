//! End-to-end flow: bus source -> ingestor -> tally -> flush -> SQLite.
//!
//! Exercises the whole counter against a real (temp-file) store, plus the
//! coordinated shutdown sequence.

use rusqlite::Connection;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::time::Duration;
use voteflow::bus::{ChannelVoteSource, VoteSource};
use voteflow::flush::{flush_cycle_task, run_flush_tick, UnknownOptionPolicy};
use voteflow::ingest::VoteIngestor;
use voteflow::lifecycle::{LifecycleCoordinator, LifecycleState};
use voteflow::store::{
    run_schema_migrations, seed_polls, PollRecord, PollStoreWriter, SqlitePollWriter,
};
use voteflow::tally::TallyTable;

fn create_seeded_store() -> (NamedTempFile, Arc<SqlitePollWriter>) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap();

    let mut conn = Connection::open(db_path).unwrap();
    run_schema_migrations(&mut conn, "sql").unwrap();
    seed_polls(
        &mut conn,
        &[PollRecord {
            id: "groceries".to_string(),
            title: "What should we buy?".to_string(),
            options: vec!["milk".to_string(), "eggs".to_string(), "bread".to_string()],
        }],
    )
    .unwrap();
    drop(conn);

    let writer = Arc::new(SqlitePollWriter::new(db_path).unwrap());
    (temp_file, writer)
}

fn read_votes(db_path: &str, option: &str) -> Option<i64> {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row(
        "SELECT votes FROM poll_results WHERE poll_id = 'groceries' AND option = ?1",
        rusqlite::params![option],
        |row| row.get(0),
    )
    .ok()
}

#[tokio::test]
async fn test_votes_flow_from_bus_to_store() {
    let (temp, writer) = create_seeded_store();
    let db_path = temp.path().to_str().unwrap();

    let tally = Arc::new(TallyTable::new());
    let ingestor = Arc::new(VoteIngestor::new(tally.clone()));
    let (tx, source) = ChannelVoteSource::new(16);

    for payload in [&b"milk"[..], b"eggs", b"milk"] {
        tx.send(payload.to_vec()).await.unwrap();
    }
    drop(tx);
    source
        .consume(ingestor, tokio_util::sync::CancellationToken::new())
        .await
        .unwrap();

    let outcomes = run_flush_tick(&tally, writer.as_ref(), UnknownOptionPolicy::Ignore).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.succeeded()));

    assert_eq!(read_votes(db_path, "milk"), Some(2));
    assert_eq!(read_votes(db_path, "eggs"), Some(1));
    assert!(tally.is_empty());

    // A late vote before the next tick snapshots alone.
    tally.increment("milk");
    let snapshot = tally.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.get("milk"), Some(&1));

    run_flush_tick(&tally, writer.as_ref(), UnknownOptionPolicy::Ignore).await;
    assert_eq!(read_votes(db_path, "milk"), Some(3));
}

#[tokio::test]
async fn test_unknown_option_does_not_pollute_store() {
    let (temp, writer) = create_seeded_store();
    let db_path = temp.path().to_str().unwrap();

    let tally = Arc::new(TallyTable::new());
    tally.increment("anchovies");

    let outcomes = run_flush_tick(&tally, writer.as_ref(), UnknownOptionPolicy::Warn).await;
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].succeeded());
    assert_eq!(outcomes[0].matched, 0);

    assert_eq!(read_votes(db_path, "anchovies"), None);
    assert!(tally.is_empty());
}

/// The full runtime wiring: spawned flush cycle and consumer, shutdown
/// via the coordinator, store updated, process-exit path unblocked.
#[tokio::test]
async fn test_lifecycle_shutdown_drains_consumer() {
    let (temp, writer) = create_seeded_store();
    let db_path = temp.path().to_str().unwrap();

    let tally = Arc::new(TallyTable::new());
    let ingestor = Arc::new(VoteIngestor::new(tally.clone()));
    let (tx, source) = ChannelVoteSource::new(16);
    let coordinator = LifecycleCoordinator::new();

    coordinator.attach_flusher(tokio::spawn(flush_cycle_task(
        tally.clone(),
        writer.clone() as Arc<dyn PollStoreWriter>,
        Duration::from_millis(20),
        UnknownOptionPolicy::Ignore,
        coordinator.flush_token(),
    )));

    let bus_token = coordinator.bus_token();
    coordinator.attach_consumer(tokio::spawn(async move {
        source.consume(ingestor, bus_token).await
    }));

    for _ in 0..3 {
        tx.send(b"bread".to_vec()).await.unwrap();
    }

    // Let at least one flush tick run before stopping.
    tokio::time::sleep(Duration::from_millis(80)).await;

    coordinator.request_shutdown();
    coordinator.await_stopped(Duration::from_secs(2)).await;
    assert_eq!(coordinator.state(), LifecycleState::Stopped);

    assert_eq!(read_votes(db_path, "bread"), Some(3));

    // The consumer is gone, so a late vote is refused rather than counted.
    assert!(tx.send(b"bread".to_vec()).await.is_err());
    assert_eq!(read_votes(db_path, "bread"), Some(3));
}
