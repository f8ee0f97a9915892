//! BLS12-381 building blocks
//!
//! Everything the protocol code needs from the pairing library lives here:
//! scalar and point codecs, polynomial evaluation and commitment, identity
//! hashing, the Keccak-256 based hash family used by the encryption scheme,
//! Lagrange coefficients and randomness sources.

use crate::{Error, ParticipantId, Result};
use blstrs::{Compress, G1Affine, G1Projective, G2Affine, G2Projective, Gt, Scalar};
use ff::Field;
use group::{Curve, Group};
use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore, SeedableRng};
use sha3::{Digest, Keccak256};

/// Size of a big-endian scalar encoding
pub const SCALAR_SIZE: usize = 32;

/// Size of a compressed G1 point
pub const G1_SIZE: usize = 48;

/// Size of a compressed G2 point
pub const G2_SIZE: usize = 96;

/// Domain separation tag for hashing epoch identities onto G1
const IDENTITY_DST: &[u8] = b"TIMELOCK_V01_BLS12381G1_XMD:SHA-256_SSWU_RO_";

/// Evaluation point of a participant (`id + 1`, zero is reserved for the secret)
pub fn participant_x(id: ParticipantId) -> Scalar {
    Scalar::from(id as u64 + 1)
}

/// Sample a uniformly random scalar
pub fn random_scalar<R: RngCore>(rng: &mut R) -> Scalar {
    Scalar::random(&mut *rng)
}

/// ChaCha20 generator seeded from the OS entropy source
///
/// Unlike `OsRng` used directly, a failing entropy source surfaces as an
/// error here instead of a panic deep inside scalar sampling.
pub fn entropy_rng() -> Result<ChaCha20Rng> {
    let mut seed = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut seed)
        .map_err(|e| Error::Randomness(e.to_string()))?;
    Ok(ChaCha20Rng::from_seed(seed))
}

/// Deterministic generator for reproducible runs
pub fn seeded_rng(seed: [u8; 32]) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(seed)
}

/// Evaluate a polynomial (coefficients in ascending degree) at `x`
pub fn eval_poly(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
}

/// Feldman commitment to polynomial coefficients: `g2^{a_k}`
pub fn commit_poly(coefficients: &[Scalar]) -> Vec<G2Projective> {
    coefficients
        .iter()
        .map(|coef| G2Projective::generator() * coef)
        .collect()
}

/// Evaluate a commitment "in the exponent": `Σ γ_k · x^k`
pub fn eval_commitment(gammas: &[G2Projective], x: &Scalar) -> G2Projective {
    let mut result = G2Projective::identity();
    let mut x_power = Scalar::ONE;

    for gamma in gammas {
        result += *gamma * x_power;
        x_power *= x;
    }

    result
}

/// Check an evaluation share against the dealer's commitment
pub fn verify_eval(eval: &Scalar, gammas: &[G2Projective], x: &Scalar) -> bool {
    G2Projective::generator() * eval == eval_commitment(gammas, x)
}

/// Hash an epoch identity onto G1
pub fn hash_to_g1(identity: &[u8]) -> G1Projective {
    G1Projective::hash_to_curve(identity, IDENTITY_DST, &[])
}

/// Keccak-256 over a one-byte domain prefix and the given parts
pub fn keccak(prefix: u8, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update([prefix]);
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Hash onto the scalar field by reducing the big-endian digest
pub fn hash_to_scalar(prefix: u8, parts: &[&[u8]]) -> Scalar {
    let digest = keccak(prefix, parts);
    let base = Scalar::from(256u64);
    digest
        .iter()
        .fold(Scalar::ZERO, |acc, byte| acc * base + Scalar::from(*byte as u64))
}

/// Optimal ate pairing
pub fn pairing(p: &G1Projective, q: &G2Projective) -> Gt {
    blstrs::pairing(&p.to_affine(), &q.to_affine())
}

/// Canonical byte encoding of a target group element
pub fn gt_to_bytes(gt: &Gt) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(288);
    (*gt)
        .write_compressed(&mut bytes)
        .map_err(|e| Error::Crypto(format!("GT serialization failed: {}", e)))?;
    Ok(bytes)
}

/// Lagrange coefficient at zero for `x_i` within `xs`
///
/// λ_i = Π_{j≠i} x_j / (x_j - x_i)
pub fn lagrange_coefficient(x_i: &Scalar, xs: &[Scalar]) -> Result<Scalar> {
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for x_j in xs {
        if x_j == x_i {
            continue;
        }
        numerator *= x_j;
        denominator *= *x_j - x_i;
    }

    let inverse = Option::<Scalar>::from(denominator.invert())
        .ok_or_else(|| Error::Crypto("Lagrange denominator is zero".into()))?;

    Ok(numerator * inverse)
}

pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; SCALAR_SIZE] {
    scalar.to_bytes_be()
}

pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; SCALAR_SIZE] = bytes.try_into().map_err(|_| {
        Error::Decode(format!(
            "scalar must be {} bytes, got {}",
            SCALAR_SIZE,
            bytes.len()
        ))
    })?;
    Option::<Scalar>::from(Scalar::from_bytes_be(&array))
        .ok_or_else(|| Error::Decode("scalar is not reduced".into()))
}

pub fn g1_to_bytes(point: &G1Projective) -> [u8; G1_SIZE] {
    point.to_affine().to_compressed()
}

pub fn g1_from_bytes(bytes: &[u8]) -> Result<G1Projective> {
    let array: [u8; G1_SIZE] = bytes.try_into().map_err(|_| {
        Error::Decode(format!("G1 point must be {} bytes, got {}", G1_SIZE, bytes.len()))
    })?;
    Option::<G1Affine>::from(G1Affine::from_compressed(&array))
        .map(G1Projective::from)
        .ok_or_else(|| Error::Decode("invalid G1 point".into()))
}

pub fn g2_to_bytes(point: &G2Projective) -> [u8; G2_SIZE] {
    point.to_affine().to_compressed()
}

pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Projective> {
    let array: [u8; G2_SIZE] = bytes.try_into().map_err(|_| {
        Error::Decode(format!("G2 point must be {} bytes, got {}", G2_SIZE, bytes.len()))
    })?;
    Option::<G2Affine>::from(G2Affine::from_compressed(&array))
        .map(G2Projective::from)
        .ok_or_else(|| Error::Decode("invalid G2 point".into()))
}
