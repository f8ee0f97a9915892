//! Error types for time-lock operations

use crate::ParticipantId;
use thiserror::Error;

/// Result type alias for time-lock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during key generation, epoch key derivation and
/// time-lock encryption
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid session or service configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Participant index outside of `0..n`
    #[error("Invalid participant ID: {0}")]
    InvalidParticipantId(ParticipantId),

    /// Inbound message could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Message delivered in a phase that does not accept it
    #[error("Message {message} rejected in phase {phase}")]
    OutOfPhase {
        phase: &'static str,
        message: &'static str,
    },

    /// Second message of the same kind from one participant
    #[error("Duplicate {message} from participant {from}")]
    DuplicateMessage {
        message: &'static str,
        from: ParticipantId,
    },

    /// Message that the protocol does not allow
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Qualified set smaller than the threshold
    #[error("Insufficient participants: required {required}, got {actual}")]
    InsufficientParticipants { required: usize, actual: usize },

    /// Fewer epoch key shares than the threshold
    #[error("Insufficient shares: required {required}, got {actual}")]
    InsufficientShares { required: usize, actual: usize },

    /// Same participant index supplied twice for combination
    #[error("Duplicate share index: {0}")]
    DuplicateShareIndex(ParticipantId),

    /// Timestamp or identifier that cannot be turned into an epoch identity
    #[error("Invalid epoch: {0}")]
    InvalidEpoch(String),

    /// Decryption requested before the epoch elapsed
    #[error("Epoch {epoch} has not elapsed yet ({remaining}s remaining)")]
    TooEarly { epoch: i64, remaining: i64 },

    /// Ciphertext envelope is malformed
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Ciphertext does not verify against the key
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Epoch key share or combined key failed its pairing check
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// OS entropy source unavailable
    #[error("Randomness unavailable: {0}")]
    Randomness(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by request handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed input; always recoverable
    Malformed,
    /// Policy rejection: the epoch has not elapsed
    TooEarly,
    /// Ciphertext, share or key failed a cryptographic check
    Crypto,
    /// Setup, configuration or internal failure
    Internal,
}

impl Error {
    /// Map this error onto the request-level taxonomy
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Decode(_)
            | Error::InvalidEpoch(_)
            | Error::InvalidCiphertext(_)
            | Error::Deserialization(_) => ErrorCategory::Malformed,
            Error::TooEarly { .. } => ErrorCategory::TooEarly,
            Error::Decryption(_)
            | Error::VerificationFailed(_)
            | Error::InsufficientShares { .. }
            | Error::InsufficientParticipants { .. }
            | Error::DuplicateShareIndex(_)
            | Error::Crypto(_) => ErrorCategory::Crypto,
            _ => ErrorCategory::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Decode(e.to_string())
    }
}
