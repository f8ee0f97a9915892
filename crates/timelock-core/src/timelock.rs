//! Time-lock facade: epoch policy on top of the IBE scheme

use crate::epoch::{EpochIdentifier, EpochKeyManager, EpochSecretKey};
use crate::ibe::{encrypt, EncryptedMessage, Sigma};
use crate::primitives::entropy_rng;
use crate::{Error, Result};
use blstrs::G2Projective;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// How epochs are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochMode {
    /// Callers name the epoch on every request
    Explicit,
    /// The service keeps a current epoch that rotates every `delay` seconds
    Auto { delay: i64 },
}

impl EpochMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochMode::Explicit => "explicit",
            EpochMode::Auto { .. } => "auto",
        }
    }

    pub fn delay(&self) -> Option<i64> {
        match self {
            EpochMode::Explicit => None,
            EpochMode::Auto { delay } => Some(*delay),
        }
    }
}

impl fmt::Display for EpochMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the current Unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// One minted epoch of auto mode
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    pub timestamp: i64,
    /// Incremented on every rotation
    pub generation: u64,
}

impl Epoch {
    /// Identifier handed to callers: the timestamp in hex
    pub fn identifier(&self) -> String {
        format!("{:x}", self.timestamp)
    }
}

/// Current epoch of auto mode
#[derive(Debug, Default)]
pub struct EpochClock {
    state: Mutex<Epoch>,
}

impl EpochClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch, `None` before the first rotation
    pub fn current(&self) -> Result<Option<Epoch>> {
        let state = self.lock()?;
        Ok((state.timestamp != 0).then_some(*state))
    }

    /// Rotate if unset or at least `delay` seconds old, then return the epoch
    ///
    /// Read, check and update happen under one lock, so concurrent callers
    /// crossing a boundary agree on a single new epoch.
    pub fn advance(&self, now: i64, delay: i64) -> Result<Epoch> {
        let mut state = self.lock()?;
        if state.timestamp == 0 || now - state.timestamp >= delay {
            state.timestamp = now;
            state.generation += 1;
            info!(
                timestamp = now,
                generation = state.generation,
                "Rotated epoch"
            );
        }
        Ok(*state)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Epoch>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("epoch lock poisoned".into()))
    }
}

/// Time-lock encryption service core
///
/// Holds the key manager by composition; the DKG results behind it are never
/// mutated after startup.
pub struct TimeLock {
    keys: EpochKeyManager,
    mode: EpochMode,
    legacy_sigma: bool,
    clock: Arc<dyn Clock>,
    epoch: EpochClock,
}

impl TimeLock {
    pub fn new(keys: EpochKeyManager, mode: EpochMode) -> Self {
        Self {
            keys,
            mode,
            legacy_sigma: false,
            clock: Arc::new(SystemClock),
            epoch: EpochClock::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Derive sigma from the wall clock instead of the CSPRNG
    pub fn with_legacy_sigma(mut self, legacy_sigma: bool) -> Self {
        self.legacy_sigma = legacy_sigma;
        self
    }

    pub fn mode(&self) -> EpochMode {
        self.mode
    }

    pub fn keys(&self) -> &EpochKeyManager {
        &self.keys
    }

    pub fn master_public_key(&self) -> &G2Projective {
        self.keys.master_public_key()
    }

    pub fn current_epoch(&self) -> Result<Option<Epoch>> {
        self.epoch.current()
    }

    /// Encrypt to the epoch of a timestamp
    pub fn encrypt_at(&self, message: &[u8], timestamp: i64) -> Result<EncryptedMessage> {
        self.require_explicit("encrypt with timestamp")?;
        self.encrypt_to(message, &EpochIdentifier::from_timestamp(timestamp)?)
    }

    /// Encrypt to a caller-chosen identity
    pub fn encrypt_for_identity(&self, message: &[u8], identity: &str) -> Result<EncryptedMessage> {
        self.require_explicit("encrypt with custom identity")?;
        self.encrypt_to(message, &EpochIdentifier::from_raw(identity))
    }

    /// Encrypt to the current epoch, rotating it first if due
    ///
    /// Returns the ciphertext and the identifier needed to decrypt it.
    pub fn encrypt_current(&self, message: &[u8]) -> Result<(EncryptedMessage, String)> {
        let delay = self.require_auto("encrypt to current epoch")?;
        let epoch = self.epoch.advance(self.clock.now(), delay)?;
        let ciphertext = self.encrypt_to(message, &EpochIdentifier::from_timestamp(epoch.timestamp)?)?;
        Ok((ciphertext, epoch.identifier()))
    }

    /// Decrypt a ciphertext bound to a timestamp that has passed
    pub fn decrypt_at(&self, ciphertext: &EncryptedMessage, timestamp: i64) -> Result<Vec<u8>> {
        let (_, key) = self.release_key_at(timestamp)?;
        ciphertext.decrypt(&key)
    }

    /// Decrypt a ciphertext bound to a custom identity
    pub fn decrypt_for_identity(&self, ciphertext: &EncryptedMessage, identity: &str) -> Result<Vec<u8>> {
        let (_, key) = self.release_key_for_identity(identity)?;
        ciphertext.decrypt(&key)
    }

    /// Decrypt a ciphertext produced by [`TimeLock::encrypt_current`]
    pub fn decrypt_identifier(&self, ciphertext: &EncryptedMessage, identifier: &str) -> Result<Vec<u8>> {
        let (_, key) = self.release_key_for_identifier(identifier)?;
        ciphertext.decrypt(&key)
    }

    /// Epoch key of a timestamp, once the timestamp has passed
    #[instrument(skip(self))]
    pub fn release_key_at(&self, timestamp: i64) -> Result<(EpochIdentifier, EpochSecretKey)> {
        self.require_explicit("decrypt with timestamp")?;
        let now = self.clock.now();
        if now < timestamp {
            return Err(Error::TooEarly {
                epoch: timestamp,
                remaining: timestamp - now,
            });
        }
        self.release(EpochIdentifier::from_timestamp(timestamp)?)
    }

    /// Epoch key of a custom identity; custom identities carry no time policy
    #[instrument(skip(self))]
    pub fn release_key_for_identity(&self, identity: &str) -> Result<(EpochIdentifier, EpochSecretKey)> {
        self.require_explicit("decrypt with custom identity")?;
        self.release(EpochIdentifier::from_raw(identity))
    }

    /// Epoch key of an auto-mode identifier, once `delay` seconds have passed
    #[instrument(skip(self))]
    pub fn release_key_for_identifier(&self, identifier: &str) -> Result<(EpochIdentifier, EpochSecretKey)> {
        let delay = self.require_auto("decrypt with identifier")?;
        let timestamp = parse_identifier(identifier)?;

        let elapsed = self.clock.now().saturating_sub(timestamp);
        if elapsed <= delay {
            return Err(Error::TooEarly {
                epoch: timestamp,
                remaining: delay.saturating_sub(elapsed).saturating_add(1),
            });
        }
        self.release(EpochIdentifier::from_timestamp(timestamp)?)
    }

    fn release(&self, identifier: EpochIdentifier) -> Result<(EpochIdentifier, EpochSecretKey)> {
        let key = self.keys.epoch_secret_key(&identifier)?;
        Ok((identifier, key))
    }

    fn encrypt_to(&self, message: &[u8], identifier: &EpochIdentifier) -> Result<EncryptedMessage> {
        let sigma = if self.legacy_sigma {
            Sigma::from_wall_clock(self.clock.now())
        } else {
            Sigma::random(&mut entropy_rng()?)
        };

        debug!(identifier = %identifier, bytes = message.len(), "Encrypting");
        encrypt(message, self.master_public_key(), &identifier.identity(), &sigma)
    }

    fn require_explicit(&self, operation: &str) -> Result<()> {
        match self.mode {
            EpochMode::Explicit => Ok(()),
            EpochMode::Auto { .. } => Err(Error::InvalidConfig(format!(
                "{} is not available in auto epoch mode",
                operation
            ))),
        }
    }

    fn require_auto(&self, operation: &str) -> Result<i64> {
        match self.mode {
            EpochMode::Auto { delay } => Ok(delay),
            EpochMode::Explicit => Err(Error::InvalidConfig(format!(
                "{} is not available in explicit epoch mode",
                operation
            ))),
        }
    }
}

/// Parse an auto-mode identifier: bare hex digits of a non-negative timestamp
pub fn parse_identifier(identifier: &str) -> Result<i64> {
    if identifier.is_empty() || !identifier.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidEpoch(format!(
            "identifier {:?} is not a hex timestamp",
            identifier
        )));
    }
    i64::from_str_radix(identifier, 16)
        .map_err(|e| Error::InvalidEpoch(format!("identifier {:?}: {}", identifier, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::LocalKeypers;
    use crate::keygen::run_local_dkg;
    use crate::ErrorCategory;

    const NOW: i64 = 1_800_000_000;

    async fn timelock(n: usize, t: usize, mode: EpochMode) -> (TimeLock, Arc<ManualClock>) {
        let results = run_local_dkg(n, t, Some([4u8; 32])).await.unwrap();
        let keys = EpochKeyManager::new(Arc::new(LocalKeypers::new(results).unwrap()));
        let clock = Arc::new(ManualClock::new(NOW));
        let timelock = TimeLock::new(keys, mode).with_clock(clock.clone());
        (timelock, clock)
    }

    #[tokio::test]
    async fn test_single_keyper_scenario() {
        let (timelock, _) = timelock(1, 1, EpochMode::Explicit).await;

        let ciphertext = timelock.encrypt_at(b"hello", 1_700_000_000).unwrap();
        assert_eq!(timelock.decrypt_at(&ciphertext, 1_700_000_000).unwrap(), b"hello");

        assert!(matches!(
            timelock.decrypt_at(&ciphertext, 1_700_000_001),
            Err(Error::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_threshold_round_trip() {
        let (timelock, _) = timelock(5, 3, EpochMode::Explicit).await;
        let message = vec![42u8; 70];

        let ciphertext = timelock.encrypt_at(&message, 1_700_000_000).unwrap();
        let parsed = EncryptedMessage::from_hex(&ciphertext.to_hex()).unwrap();
        assert_eq!(timelock.decrypt_at(&parsed, 1_700_000_000).unwrap(), message);
    }

    #[tokio::test]
    async fn test_explicit_too_early() {
        let (timelock, clock) = timelock(1, 1, EpochMode::Explicit).await;
        let future = NOW + 0x100;

        let ciphertext = timelock.encrypt_at(b"later", future).unwrap();
        let err = timelock.decrypt_at(&ciphertext, future).unwrap_err();
        assert!(matches!(err, Error::TooEarly { remaining: 0x100, .. }));
        assert_eq!(err.category(), ErrorCategory::TooEarly);

        clock.set(future);
        assert_eq!(timelock.decrypt_at(&ciphertext, future).unwrap(), b"later");
    }

    #[tokio::test]
    async fn test_custom_identity() {
        let (timelock, _) = timelock(3, 2, EpochMode::Explicit).await;

        let ciphertext = timelock.encrypt_for_identity(b"secret", "launch-day").unwrap();
        assert_eq!(
            timelock.decrypt_for_identity(&ciphertext, "launch-day").unwrap(),
            b"secret"
        );
        assert!(timelock.decrypt_for_identity(&ciphertext, "launch-night").is_err());
    }

    #[tokio::test]
    async fn test_malformed_timestamp() {
        let (timelock, _) = timelock(1, 1, EpochMode::Explicit).await;
        assert!(matches!(
            timelock.encrypt_at(b"x", 0xabc),
            Err(Error::InvalidEpoch(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_mode_rotation_and_policy() {
        let (timelock, clock) = timelock(2, 2, EpochMode::Auto { delay: 10 }).await;
        assert_eq!(timelock.current_epoch().unwrap(), None);

        let (ciphertext, identifier) = timelock.encrypt_current(b"auto").unwrap();
        assert_eq!(identifier, format!("{:x}", NOW));
        let first = timelock.current_epoch().unwrap().unwrap();
        assert_eq!(first.generation, 1);

        // Still inside the epoch
        clock.advance(9);
        let (_, same) = timelock.encrypt_current(b"auto").unwrap();
        assert_eq!(same, identifier);

        // now - epoch == delay is still too early to decrypt, but rotates
        clock.advance(1);
        assert!(matches!(
            timelock.decrypt_identifier(&ciphertext, &identifier),
            Err(Error::TooEarly { remaining: 1, .. })
        ));
        let (_, next) = timelock.encrypt_current(b"auto").unwrap();
        assert_eq!(next, format!("{:x}", NOW + 10));
        assert_eq!(timelock.current_epoch().unwrap().unwrap().generation, 2);

        clock.advance(1);
        assert_eq!(
            timelock.decrypt_identifier(&ciphertext, &identifier).unwrap(),
            b"auto"
        );
    }

    #[tokio::test]
    async fn test_mode_gating() {
        let (auto, _) = timelock(1, 1, EpochMode::Auto { delay: 5 }).await;
        assert!(matches!(auto.encrypt_at(b"x", NOW), Err(Error::InvalidConfig(_))));
        assert!(matches!(
            auto.decrypt_identifier(
                &auto.encrypt_current(b"x").unwrap().0,
                "not-hex"
            ),
            Err(Error::InvalidEpoch(_))
        ));

        let (explicit, _) = timelock(1, 1, EpochMode::Explicit).await;
        assert!(matches!(explicit.encrypt_current(b"x"), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_signed_or_extreme_identifiers() {
        let (timelock, _) = timelock(1, 1, EpochMode::Auto { delay: 10 }).await;
        let (ciphertext, _) = timelock.encrypt_current(b"x").unwrap();

        for identifier in ["-8000000000000000", "+6553f100", "-1", ""] {
            let err = timelock.decrypt_identifier(&ciphertext, identifier).unwrap_err();
            assert!(matches!(err, Error::InvalidEpoch(_)), "{:?}: {:?}", identifier, err);
            assert_eq!(err.category(), ErrorCategory::Malformed);
        }

        // Far future: no overflow, just too early
        assert!(matches!(
            timelock.decrypt_identifier(&ciphertext, "7fffffffffffffff"),
            Err(Error::TooEarly { .. })
        ));
        assert!(matches!(
            timelock.release_key_for_identifier("8000000000000000"),
            Err(Error::InvalidEpoch(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_sigma_is_deterministic() {
        let (timelock, _) = timelock(1, 1, EpochMode::Explicit).await;
        let timelock = timelock.with_legacy_sigma(true);

        let a = timelock.encrypt_at(b"same", 1_700_000_000).unwrap();
        let b = timelock.encrypt_at(b"same", 1_700_000_000).unwrap();
        assert_eq!(a, b);
        assert_eq!(timelock.decrypt_at(&a, 1_700_000_000).unwrap(), b"same");
    }

    #[test]
    fn test_epoch_clock_concurrent_rotation() {
        let clock = Arc::new(EpochClock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || clock.advance(NOW, 60).unwrap())
            })
            .collect();

        for handle in handles {
            let epoch = handle.join().unwrap();
            assert_eq!(epoch.timestamp, NOW);
            assert_eq!(epoch.generation, 1);
        }
    }
}
