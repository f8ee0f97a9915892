//! Core types shared by key generation and epoch key derivation

use crate::primitives::{g2_to_bytes, scalar_from_bytes, scalar_to_bytes, SCALAR_SIZE};
use blstrs::{G2Projective, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Index of a participant in a DKG session (`0..n`)
pub type ParticipantId = usize;

/// Unique identifier for a session
pub type SessionId = [u8; 32];

/// Configuration for a DKG session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgConfig {
    /// Session identifier
    pub session_id: SessionId,

    /// Number of participants
    pub n_participants: usize,

    /// Threshold (t-of-n)
    pub threshold: usize,

    /// This participant's ID
    pub participant_id: ParticipantId,
}

impl DkgConfig {
    /// Create a new session configuration
    pub fn new(
        session_id: SessionId,
        n_participants: usize,
        threshold: usize,
        participant_id: ParticipantId,
    ) -> crate::Result<Self> {
        if threshold == 0 {
            return Err(crate::Error::InvalidConfig(
                "Threshold must be at least 1".into(),
            ));
        }
        if threshold > n_participants {
            return Err(crate::Error::InvalidConfig(
                "Threshold cannot exceed number of participants".into(),
            ));
        }
        if participant_id >= n_participants {
            return Err(crate::Error::InvalidParticipantId(participant_id));
        }

        Ok(Self {
            session_id,
            n_participants,
            threshold,
            participant_id,
        })
    }

    /// All participant IDs of the session
    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> {
        0..self.n_participants
    }
}

/// A participant's share of the master secret
///
/// Kept in its byte encoding so it can be wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyShare([u8; SCALAR_SIZE]);

impl SecretKeyShare {
    pub(crate) fn from_scalar(scalar: &Scalar) -> Self {
        Self(scalar_to_bytes(scalar))
    }

    pub(crate) fn scalar(&self) -> crate::Result<Scalar> {
        scalar_from_bytes(&self.0)
    }
}

impl std::fmt::Debug for SecretKeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKeyShare(..)")
    }
}

/// Output of a finalized DKG session
///
/// Produced exactly once per session and never mutated afterwards; request
/// handlers share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DkgResult {
    /// This participant's ID
    pub participant_id: ParticipantId,

    /// Total number of participants
    pub n_participants: usize,

    /// Threshold
    pub threshold: usize,

    /// Participants whose contributions make up the key
    pub qualified: BTreeSet<ParticipantId>,

    /// Master (eon) public key: sum of qualified constant-term commitments
    pub master_public_key: G2Projective,

    /// This participant's secret share: sum of qualified evaluations
    pub secret_share: SecretKeyShare,

    /// `g2^{share_j}` for every participant, indexed by participant ID
    pub public_key_shares: Vec<G2Projective>,
}

impl DkgResult {
    /// Master public key, compressed and hex encoded
    pub fn master_public_key_hex(&self) -> String {
        hex::encode(g2_to_bytes(&self.master_public_key))
    }

    /// Public key share of one participant
    pub fn public_key_share(&self, participant: ParticipantId) -> Option<&G2Projective> {
        self.public_key_shares.get(participant)
    }

    /// Check whether a participant made it into the qualified set
    pub fn is_qualified(&self, participant: ParticipantId) -> bool {
        self.qualified.contains(&participant)
    }
}
