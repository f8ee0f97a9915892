//! In-memory relay shared by participants running in one process

use super::{async_trait, Envelope, Relay};
use crate::{Error, ParticipantId, Result, SessionId};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::trace;

type BroadcastKey = (SessionId, u32);
type DirectKey = (SessionId, u32, ParticipantId);
type Mailbox<K> = DashMap<K, Vec<(ParticipantId, Vec<u8>)>>;

/// In-memory message relay
///
/// Clones share the same mailboxes, so every participant task gets its own
/// handle. Posters are trusted to name themselves, which holds for tasks of
/// one process.
#[derive(Clone)]
pub struct MemoryRelay {
    /// Broadcast messages: (session_id, round) -> [(from, message_bytes)]
    broadcasts: Arc<Mailbox<BroadcastKey>>,
    /// Direct messages: (session_id, round, to) -> [(from, message_bytes)]
    directs: Arc<Mailbox<DirectKey>>,
    /// Notification channel
    notify: broadcast::Sender<()>,
    /// Give up on a round after this long
    timeout: Option<Duration>,
}

impl MemoryRelay {
    /// Create a new in-memory relay that waits indefinitely
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            broadcasts: Arc::new(DashMap::new()),
            directs: Arc::new(DashMap::new()),
            notify,
            timeout: None,
        }
    }

    /// Fail a collect call that waits longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn post<K: std::hash::Hash + Eq>(
        &self,
        mailbox: &Mailbox<K>,
        key: K,
        kind: &'static str,
        from: ParticipantId,
        bytes: Vec<u8>,
    ) -> Result<()> {
        {
            let mut messages = mailbox.entry(key).or_default();
            if messages.iter().any(|(poster, _)| *poster == from) {
                return Err(Error::DuplicateMessage {
                    message: kind,
                    from,
                });
            }
            messages.push((from, bytes));
        }

        let _ = self.notify.send(());
        Ok(())
    }

    async fn wait_for<K, T>(
        &self,
        mailbox: &Mailbox<K>,
        key: K,
        round: u32,
        count: usize,
    ) -> Result<Vec<Envelope<T>>>
    where
        K: std::hash::Hash + Eq + Send + Sync,
        T: DeserializeOwned + Send,
    {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut rx = self.notify.subscribe();
        let deadline = self.timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let available = match mailbox.get(&key) {
                Some(messages) if messages.len() >= count => {
                    return messages
                        .iter()
                        .take(count)
                        .map(|(from, bytes)| {
                            Ok(Envelope {
                                from: *from,
                                message: deserialize(bytes)?,
                            })
                        })
                        .collect();
                }
                Some(messages) => messages.len(),
                None => 0,
            };

            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Err(Error::Relay(format!(
                        "timed out in round {}: {} of {} messages",
                        round, available, count
                    )));
                }
            }

            trace!(round, available, count, "Waiting for messages");

            // Wait for notification with timeout
            tokio::select! {
                _ = rx.recv() => continue,
                _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
            }
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: ParticipantId,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        self.post(&self.broadcasts, (*session_id, round), "broadcast", from, bytes)
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: ParticipantId,
        to: ParticipantId,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;
        self.post(&self.directs, (*session_id, round, to), "direct", from, bytes)
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<Envelope<T>>> {
        self.wait_for(&self.broadcasts, (*session_id, round), round, count)
            .await
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: ParticipantId,
        count: usize,
    ) -> Result<Vec<Envelope<T>>> {
        self.wait_for(&self.directs, (*session_id, round, my_id), round, count)
            .await
    }
}
