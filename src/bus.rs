//! Bus-collaborator interface: delivery of raw vote payloads to a handler.
//!
//! The aggregator only depends on the two traits here. `RedisVoteSource` is
//! the production implementation (pub/sub channel, one payload per message);
//! `ChannelVoteSource` delivers from an in-process channel and is what the
//! tests and embedded setups use.

use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub enum BusError {
    Connection(String),
    Subscription(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Connection(err.to_string())
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Connection(msg) => write!(f, "bus connection error: {}", msg),
            BusError::Subscription(msg) => write!(f, "bus subscription error: {}", msg),
        }
    }
}

impl std::error::Error for BusError {}

/// Receiver side of the bus: one call per delivered message.
///
/// Returning `Ok` acknowledges the message; returning an error tells the
/// source to treat it as undelivered, with retry semantics owned by the
/// source. Implementations must tolerate concurrent invocation.
#[async_trait]
pub trait VoteHandler: Send + Sync {
    async fn on_vote(&self, payload: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A stream of vote payloads from the message bus.
///
/// `consume` delivers messages to `handler` until `cancellation` fires,
/// then drains: it returns only once no further handler invocation is in
/// flight. That return is the "stopped" acknowledgment the lifecycle
/// coordinator waits on.
#[async_trait]
pub trait VoteSource: Send + Sync {
    async fn consume(
        &self,
        handler: Arc<dyn VoteHandler>,
        cancellation: CancellationToken,
    ) -> Result<(), BusError>;
}

/// Redis pub/sub vote source.
///
/// Subscribes to a single channel; the raw message payload is the vote.
/// Pub/sub has no redelivery, so a handler error can only be logged here.
pub struct RedisVoteSource {
    client: redis::Client,
    channel: String,
}

impl RedisVoteSource {
    /// Open a client and verify the server is reachable.
    ///
    /// Startup-time failures (bad URL, server down) surface here so the
    /// process can abort before the flush cycle is ever started.
    pub async fn connect(url: &str, channel: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            client,
            channel: channel.to_string(),
        })
    }
}

#[async_trait]
impl VoteSource for RedisVoteSource {
    async fn consume(
        &self,
        handler: Arc<dyn VoteHandler>,
        cancellation: CancellationToken,
    ) -> Result<(), BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| BusError::Subscription(e.to_string()))?;
        log::info!("Subscribed to bus channel '{}'", self.channel);

        {
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => {
                        log::info!("Bus consumer stopping, no further deliveries");
                        break;
                    }
                    msg = messages.next() => match msg {
                        Some(msg) => {
                            if let Err(e) = handler.on_vote(msg.get_payload_bytes()).await {
                                // No redelivery on pub/sub; the vote is gone.
                                log::warn!("Vote handler rejected message: {}", e);
                            }
                        }
                        None => {
                            log::warn!("Bus subscription stream ended");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = pubsub.unsubscribe(&self.channel).await {
            log::warn!("Unsubscribe failed during shutdown: {}", e);
        }
        Ok(())
    }
}

/// In-process vote source backed by a tokio mpsc channel.
pub struct ChannelVoteSource {
    receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
}

impl ChannelVoteSource {
    /// Returns the sender half alongside the source.
    pub fn new(buffer: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                receiver: Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl VoteSource for ChannelVoteSource {
    async fn consume(
        &self,
        handler: Arc<dyn VoteHandler>,
        cancellation: CancellationToken,
    ) -> Result<(), BusError> {
        let mut receiver = self.receiver.lock().await;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                msg = receiver.recv() => match msg {
                    Some(payload) => {
                        if let Err(e) = handler.on_vote(&payload).await {
                            log::warn!("Vote handler rejected message: {}", e);
                        }
                    }
                    // All senders dropped.
                    None => break,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::time::{timeout, Duration};

    struct CollectingHandler {
        payloads: StdMutex<Vec<Vec<u8>>>,
    }

    impl CollectingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                payloads: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VoteHandler for CollectingHandler {
        async fn on_vote(
            &self,
            payload: &[u8],
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.payloads.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_channel_source_delivers_payloads() {
        let (tx, source) = ChannelVoteSource::new(16);
        let handler = CollectingHandler::new();
        let cancellation = CancellationToken::new();

        tx.send(b"milk".to_vec()).await.unwrap();
        tx.send(b"eggs".to_vec()).await.unwrap();
        drop(tx);

        source
            .consume(handler.clone(), cancellation)
            .await
            .unwrap();

        let payloads = handler.payloads.lock().unwrap();
        assert_eq!(*payloads, vec![b"milk".to_vec(), b"eggs".to_vec()]);
    }

    #[tokio::test]
    async fn test_channel_source_stops_on_cancellation() {
        let (tx, source) = ChannelVoteSource::new(16);
        let handler = CollectingHandler::new();
        let cancellation = CancellationToken::new();

        let consume_token = cancellation.clone();
        let consume_handler = handler.clone();
        let consumer = tokio::spawn(async move {
            source.consume(consume_handler, consume_token).await
        });

        tx.send(b"milk".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();

        // consume must return (the "stopped" acknowledgment), sender still alive.
        let result = timeout(Duration::from_secs(1), consumer).await;
        assert!(result.is_ok());
        assert_eq!(handler.payloads.lock().unwrap().len(), 1);
    }

    struct RejectingHandler;

    #[async_trait]
    impl VoteHandler for RejectingHandler {
        async fn on_vote(
            &self,
            _payload: &[u8],
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("nope".into())
        }
    }

    #[tokio::test]
    async fn test_channel_source_survives_handler_errors() {
        let (tx, source) = ChannelVoteSource::new(16);
        let cancellation = CancellationToken::new();

        tx.send(b"milk".to_vec()).await.unwrap();
        tx.send(b"eggs".to_vec()).await.unwrap();
        drop(tx);

        // Errors are logged, not propagated; consume still drains and returns.
        source
            .consume(Arc::new(RejectingHandler), cancellation)
            .await
            .unwrap();
    }
}
