//! Time-Lock API
//!
//! Request and response bodies of the time-lock service. Field names are the
//! service's wire format and must not change.

use serde::{Deserialize, Serialize};

/// Cause for bad JSON, bad hex, bad timestamps and malformed ciphertexts
pub const CAUSE_MALFORMED: &str = "request body unmarshalling error";

/// Cause for decrypting before the epoch elapsed
pub const CAUSE_TOO_EARLY: &str = "too early decryption";

/// Cause for ciphertexts or keys that fail to verify
pub const CAUSE_DECRYPTION: &str = "decryption error";

/// Cause for failures that are not the caller's fault
pub const CAUSE_INTERNAL: &str = "internal error";

/// Body of every error response (HTTP 400)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub cause: String,
    pub message: String,
}

/// Encrypt to a timestamp epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptWithTimeRequest {
    /// Plaintext, despite the name
    pub cypher_text: String,
    pub timestamp: i64,
}

/// Encrypt to a custom identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptCustomRequest {
    pub cypher_text: String,
    pub epoch_id: String,
}

/// Encrypt to the current epoch (auto mode)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptRequest {
    pub cypher_text: String,
}

/// Decrypt a timestamp-bound ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptWithTimeRequest {
    /// Hex ciphertext
    pub encrypted_msg: String,
    pub timestamp: i64,
}

/// Decrypt a ciphertext bound to a custom identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptCustomRequest {
    pub encrypted_msg: String,
    pub epoch_id: String,
}

/// Decrypt an auto-mode ciphertext
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    pub encrypted_msg: String,
    /// Epoch timestamp in hex, as returned by encrypt
    pub identifier: String,
}

/// Hex ciphertext from encrypt, plaintext from decrypt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Auto-mode encrypt result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptResponse {
    pub message: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Public parameters of the running DKG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EonKeyResponse {
    /// Compressed G2 master public key, hex
    pub eon_public_key: String,
    pub threshold: usize,
    pub participants: usize,
    pub qualified: Vec<usize>,
    pub epoch_mode: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub epoch_delay: Option<i64>,
    /// Same as `epoch_delay`, under the name older clients read
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub epoch_duration: Option<i64>,
    /// Identifier of the current auto-mode epoch, once one exists
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_epoch: Option<String>,
}

/// Which epoch a key request names; exactly one field is expected
///
/// Used by `/decryption-key` and `/epoch-public-key`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecryptionKeyQuery {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub epoch_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub identifier: Option<String>,
}

/// A released epoch key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptionKeyResponse {
    /// Compressed G1 epoch secret key, hex
    pub epoch_secret_key: String,
    /// Hex of the epoch identity bytes the key belongs to
    pub identifier: String,
}

/// Public key of an epoch: `H1(identity)` on G1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochPublicKeyResponse {
    /// Compressed G1 point, hex
    pub epoch_public_key: String,
    /// Hex of the epoch identity bytes
    pub identifier: String,
}
