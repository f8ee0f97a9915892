//! Epoch identities and threshold derivation of epoch secret keys
//!
//! An epoch secret key is `s · H1(identity)` where `s` is the master secret
//! nobody holds. Each keyper contributes `s_j · H1(identity)` and any `t`
//! contributions interpolate to the key in G1.

use crate::primitives::{
    g1_from_bytes, g1_to_bytes, hash_to_g1, lagrange_coefficient, pairing, participant_x,
    G1_SIZE,
};
use crate::{DkgResult, Error, ParticipantId, Result};
use blstrs::{G1Projective, G2Projective};
use group::Group;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Byte string an epoch key is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpochIdentifier(Vec<u8>);

impl EpochIdentifier {
    /// Identifier of a timestamp epoch, see [`derive_epoch_identity`]
    pub fn from_timestamp(timestamp: i64) -> Result<Self> {
        derive_epoch_identity(timestamp)
    }

    /// Caller-chosen identity, used as is
    pub fn from_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Hash the identifier onto G1
    pub fn identity(&self) -> EpochId {
        EpochId(hash_to_g1(&self.0))
    }
}

impl fmt::Display for EpochIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Derive the identifier of a timestamp epoch
///
/// The timestamp is printed as lowercase hex and that text is hex-decoded
/// back into bytes, so 1700000000 (`6553f100`) becomes `[0x65, 0x53, 0xf1,
/// 0x00]`. Timestamps with an odd number of hex digits have no such encoding
/// and are rejected.
pub fn derive_epoch_identity(timestamp: i64) -> Result<EpochIdentifier> {
    if timestamp < 0 {
        return Err(Error::InvalidEpoch(format!(
            "negative timestamp {}",
            timestamp
        )));
    }

    let text = format!("{:x}", timestamp);
    hex::decode(&text).map(EpochIdentifier).map_err(|e| {
        Error::InvalidEpoch(format!(
            "timestamp {} ({}) has no byte encoding: {}",
            timestamp, text, e
        ))
    })
}

/// Identity point `H1(identifier)` in G1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochId(G1Projective);

impl EpochId {
    pub fn point(&self) -> &G1Projective {
        &self.0
    }
}

/// One keyper's contribution to an epoch secret key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EpochSecretKeyShare {
    participant: ParticipantId,
    value: [u8; G1_SIZE],
}

impl EpochSecretKeyShare {
    pub fn new(participant: ParticipantId, point: &G1Projective) -> Self {
        Self {
            participant,
            value: g1_to_bytes(point),
        }
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn point(&self) -> Result<G1Projective> {
        g1_from_bytes(&self.value)
    }
}

impl fmt::Debug for EpochSecretKeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochSecretKeyShare")
            .field("participant", &self.participant)
            .finish_non_exhaustive()
    }
}

/// Reconstructed decryption key of one epoch
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EpochSecretKey([u8; G1_SIZE]);

impl EpochSecretKey {
    pub fn from_point(point: &G1Projective) -> Self {
        Self(g1_to_bytes(point))
    }

    /// Parse a compressed key, rejecting bytes that are not a G1 point
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let point = g1_from_bytes(bytes)?;
        Ok(Self::from_point(&point))
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(text)?)
    }

    pub fn point(&self) -> Result<G1Projective> {
        g1_from_bytes(&self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EpochSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EpochSecretKey(..)")
    }
}

/// Compute this keyper's share of the key for `identity`
pub fn request_epoch_share(result: &DkgResult, identity: &EpochId) -> Result<EpochSecretKeyShare> {
    let share = result.secret_share.scalar()?;
    Ok(EpochSecretKeyShare::new(
        result.participant_id,
        &(identity.0 * share),
    ))
}

/// Lagrange-combine epoch key shares at zero
///
/// `indices[i]` is the participant that produced `shares[i]`.
pub fn combine_shares(
    shares: &[EpochSecretKeyShare],
    indices: &[ParticipantId],
    threshold: usize,
) -> Result<EpochSecretKey> {
    if shares.len() != indices.len() {
        return Err(Error::InvalidConfig(format!(
            "{} shares but {} indices",
            shares.len(),
            indices.len()
        )));
    }
    if shares.len() < threshold {
        return Err(Error::InsufficientShares {
            required: threshold,
            actual: shares.len(),
        });
    }

    let mut seen = HashSet::with_capacity(indices.len());
    for index in indices {
        if !seen.insert(*index) {
            return Err(Error::DuplicateShareIndex(*index));
        }
    }

    let xs: Vec<_> = indices.iter().map(|id| participant_x(*id)).collect();
    let mut key = G1Projective::identity();

    for (share, x) in shares.iter().zip(&xs) {
        let lambda = lagrange_coefficient(x, &xs)?;
        key += share.point()? * lambda;
    }

    Ok(EpochSecretKey::from_point(&key))
}

/// Check `e(share, g2) == e(H1(id), g2^{s_j})`
pub fn verify_epoch_share(
    share: &EpochSecretKeyShare,
    public_key_share: &G2Projective,
    identity: &EpochId,
) -> bool {
    match share.point() {
        Ok(point) => {
            pairing(&point, &G2Projective::generator()) == pairing(&identity.0, public_key_share)
        }
        Err(_) => false,
    }
}

/// Check `e(key, g2) == e(H1(id), mpk)`
pub fn verify_epoch_secret_key(
    key: &EpochSecretKey,
    master_public_key: &G2Projective,
    identity: &EpochId,
) -> bool {
    match key.point() {
        Ok(point) => {
            pairing(&point, &G2Projective::generator()) == pairing(&identity.0, master_public_key)
        }
        Err(_) => false,
    }
}

/// Where epoch key shares come from
pub trait EpochShareSource: Send + Sync {
    /// Shares needed to combine a key
    fn threshold(&self) -> usize;

    /// Total number of keypers
    fn n_participants(&self) -> usize;

    /// Keypers whose shares make up the key
    fn qualified(&self) -> &BTreeSet<ParticipantId>;

    fn master_public_key(&self) -> &G2Projective;

    fn public_key_share(&self, participant: ParticipantId) -> Option<G2Projective>;

    /// Ask the keypers for their shares of `identity`
    fn epoch_shares(&self, identity: &EpochId) -> Result<Vec<EpochSecretKeyShare>>;
}

/// Every keyper of an in-process DKG run
pub struct LocalKeypers {
    results: Vec<Arc<DkgResult>>,
}

impl LocalKeypers {
    /// Wrap the results of one DKG session
    pub fn new(results: Vec<DkgResult>) -> Result<Self> {
        let first = results
            .first()
            .ok_or_else(|| Error::InvalidConfig("no DKG results".into()))?;

        if results
            .iter()
            .any(|r| r.master_public_key != first.master_public_key || r.qualified != first.qualified)
        {
            return Err(Error::InvalidConfig(
                "DKG results disagree on the eon key".into(),
            ));
        }

        Ok(Self {
            results: results.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn results(&self) -> &[Arc<DkgResult>] {
        &self.results
    }

    fn first(&self) -> &DkgResult {
        &self.results[0]
    }
}

impl EpochShareSource for LocalKeypers {
    fn threshold(&self) -> usize {
        self.first().threshold
    }

    fn n_participants(&self) -> usize {
        self.first().n_participants
    }

    fn qualified(&self) -> &BTreeSet<ParticipantId> {
        &self.first().qualified
    }

    fn master_public_key(&self) -> &G2Projective {
        &self.first().master_public_key
    }

    fn public_key_share(&self, participant: ParticipantId) -> Option<G2Projective> {
        self.first().public_key_share(participant).copied()
    }

    fn epoch_shares(&self, identity: &EpochId) -> Result<Vec<EpochSecretKeyShare>> {
        self.results
            .iter()
            .filter(|r| r.is_qualified(r.participant_id))
            .map(|r| request_epoch_share(r, identity))
            .collect()
    }
}

/// Collects, checks and combines epoch key shares
#[derive(Clone)]
pub struct EpochKeyManager {
    source: Arc<dyn EpochShareSource>,
}

impl EpochKeyManager {
    pub fn new(source: Arc<dyn EpochShareSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &dyn EpochShareSource {
        self.source.as_ref()
    }

    pub fn master_public_key(&self) -> &G2Projective {
        self.source.master_public_key()
    }

    /// Derive the secret key of an epoch
    ///
    /// Shares that fail their pairing check are dropped; the combined key is
    /// checked against the eon key before it is handed out.
    #[instrument(skip_all, fields(identifier = %identifier))]
    pub fn epoch_secret_key(&self, identifier: &EpochIdentifier) -> Result<EpochSecretKey> {
        let identity = identifier.identity();
        let shares = self.source.epoch_shares(&identity)?;

        let verified: Vec<EpochSecretKeyShare> = shares
            .into_iter()
            .filter(|share| {
                let valid = self
                    .source
                    .public_key_share(share.participant())
                    .map(|pk| verify_epoch_share(share, &pk, &identity))
                    .unwrap_or(false);
                if !valid {
                    warn!(participant = share.participant(), "Dropping invalid epoch key share");
                }
                valid
            })
            .collect();

        let indices: Vec<ParticipantId> = verified.iter().map(|s| s.participant()).collect();
        let key = combine_shares(&verified, &indices, self.source.threshold())?;

        if !verify_epoch_secret_key(&key, self.source.master_public_key(), &identity) {
            return Err(Error::VerificationFailed(
                "combined epoch key does not match the eon key".into(),
            ));
        }

        debug!(shares = verified.len(), "Epoch secret key derived");
        Ok(key)
    }
}
