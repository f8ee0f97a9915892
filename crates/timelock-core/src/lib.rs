//! # Timelock Core
//!
//! Threshold time-lock encryption on BLS12-381.
//!
//! This crate provides:
//! - Distributed Key Generation (DKG) with accusations and apologies
//! - Epoch key shares and their Lagrange combination
//! - Boneh-Franklin IBE (Fujisaki-Okamoto) bound to epoch identities
//! - The time-lock facade with explicit and auto epoch modes
//!
//! ## Protocol Overview
//!
//! `n` keypers run a Joint-Feldman DKG and end up with shares of a master
//! secret `s` whose public key `g2^s` (the eon key) everybody knows. Anyone
//! can encrypt to an epoch identity under the eon key. Once the epoch has
//! passed, any `t` keypers publish `s_j · H1(identity)` and the combination
//! of their shares decrypts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use timelock_core::{keygen, EpochKeyManager, EpochMode, LocalKeypers, TimeLock};
//!
//! let results = keygen::run_local_dkg(3, 2, None).await?;
//! let keys = EpochKeyManager::new(Arc::new(LocalKeypers::new(results)?));
//! let timelock = TimeLock::new(keys, EpochMode::Explicit);
//!
//! let ciphertext = timelock.encrypt_at(b"hello", 1_700_000_000)?;
//! let message = timelock.decrypt_at(&ciphertext, 1_700_000_000)?;
//! ```

pub mod epoch;
pub mod error;
pub mod ibe;
pub mod keygen;
pub mod mpc;
pub mod primitives;
pub mod timelock;
pub mod types;

pub use epoch::{
    combine_shares, derive_epoch_identity, request_epoch_share, verify_epoch_secret_key,
    verify_epoch_share, EpochId, EpochIdentifier, EpochKeyManager, EpochSecretKey,
    EpochSecretKeyShare, EpochShareSource, LocalKeypers,
};
pub use error::{Error, ErrorCategory, Result};
pub use ibe::{encrypt, EncryptedMessage, Sigma};
pub use timelock::{Clock, Epoch, EpochClock, EpochMode, ManualClock, SystemClock, TimeLock};
pub use types::{DkgConfig, DkgResult, ParticipantId, SecretKeyShare, SessionId};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default threshold for a single-keyper setup
pub const DEFAULT_THRESHOLD: usize = 1;

/// Default number of keypers
pub const DEFAULT_KEYPERS: usize = 1;
