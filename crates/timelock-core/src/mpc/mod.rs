//! Message transport between DKG participants

use crate::{ParticipantId, Result, SessionId};
use serde::{de::DeserializeOwned, Serialize};

pub use ::async_trait::async_trait;

/// A collected message together with the participant that posted it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    pub from: ParticipantId,
    pub message: T,
}

/// Message relay trait for DKG communication
///
/// [`run_dkg`](crate::keygen::run_dkg) relies on this contract:
///
/// - Rounds are numbered per session and a message is only ever collected by
///   the round it was sent in.
/// - The relay attests the poster of every message. [`Envelope::from`] is the
///   authenticated sender, never a field read from the payload.
/// - A participant posts at most one broadcast per round and at most one
///   direct message per recipient per round. Broadcast rounds carry a bundle
///   (possibly empty), so a round is complete once all `n` participants have
///   posted.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Broadcast `from`'s message of a round to all participants, the sender included
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: ParticipantId,
        message: &T,
    ) -> Result<()>;

    /// Send `from`'s message of a round to participant `to` only
    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        from: ParticipantId,
        to: ParticipantId,
        message: &T,
    ) -> Result<()>;

    /// Wait until `count` participants have broadcast in a round
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<Envelope<T>>>;

    /// Wait until `count` participants have sent a direct message to `my_id`
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: ParticipantId,
        count: usize,
    ) -> Result<Vec<Envelope<T>>>;
}

/// In-process relay
pub mod memory;

pub use memory::MemoryRelay;
