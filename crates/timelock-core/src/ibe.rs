//! Boneh-Franklin IBE with the Fujisaki-Okamoto transform
//!
//! ```text
//! r  = H3(sigma || m)
//! C1 = r · g2
//! C2 = sigma ⊕ H2(e(H1(id), mpk)^r)
//! C3 = pad(m) ⊕ H4(sigma || i)     for each 32-byte block i
//! ```
//!
//! Decryption recovers sigma from C2, unmasks C3 and accepts only if
//! recomputing `r` reproduces C1.

use crate::epoch::{EpochId, EpochSecretKey};
use crate::primitives::{
    g2_from_bytes, g2_to_bytes, gt_to_bytes, hash_to_scalar, keccak, pairing, G2_SIZE,
};
use crate::{Error, Result};
use blstrs::{G2Projective, Gt};
use group::Group;
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of sigma and of every C3 block
pub const BLOCK_SIZE: usize = 32;

/// C1, C2 and at least one padded block
pub const MIN_CIPHERTEXT_SIZE: usize = G2_SIZE + 2 * BLOCK_SIZE;

const H2: u8 = 0x02;
const H3: u8 = 0x03;
const H4: u8 = 0x04;

type Block = [u8; BLOCK_SIZE];

/// Per-message encryption randomness
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Sigma(Block);

impl Sigma {
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut sigma = [0u8; BLOCK_SIZE];
        rng.fill_bytes(&mut sigma);
        Self(sigma)
    }

    pub fn from_bytes(bytes: Block) -> Self {
        Self(bytes)
    }

    /// Decimal seconds copied into a zeroed buffer
    ///
    /// Guessable; only for producing ciphertexts that match older deployments.
    pub fn from_wall_clock(seconds: i64) -> Self {
        let digits = seconds.to_string();
        let mut sigma = [0u8; BLOCK_SIZE];
        let len = digits.len().min(BLOCK_SIZE);
        sigma[..len].copy_from_slice(&digits.as_bytes()[..len]);
        Self(sigma)
    }

    pub fn as_bytes(&self) -> &Block {
        &self.0
    }
}

/// Ciphertext bound to an eon key and an epoch identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub c1: G2Projective,
    pub c2: Block,
    pub c3: Vec<Block>,
}

impl EncryptedMessage {
    /// `C1 || C2 || C3`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(G2_SIZE + BLOCK_SIZE * (1 + self.c3.len()));
        bytes.extend_from_slice(&g2_to_bytes(&self.c1));
        bytes.extend_from_slice(&self.c2);
        for block in &self.c3 {
            bytes.extend_from_slice(block);
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_CIPHERTEXT_SIZE {
            return Err(Error::InvalidCiphertext(format!(
                "{} bytes is shorter than the minimum of {}",
                bytes.len(),
                MIN_CIPHERTEXT_SIZE
            )));
        }
        if (bytes.len() - G2_SIZE - BLOCK_SIZE) % BLOCK_SIZE != 0 {
            return Err(Error::InvalidCiphertext(format!(
                "{} bytes does not end on a block boundary",
                bytes.len()
            )));
        }

        let (c1, rest) = bytes.split_at(G2_SIZE);
        let c1 = g2_from_bytes(c1).map_err(|e| Error::InvalidCiphertext(e.to_string()))?;
        let (c2, c3) = rest.split_at(BLOCK_SIZE);

        Ok(Self {
            c1,
            c2: to_block(c2),
            c3: c3.chunks_exact(BLOCK_SIZE).map(to_block).collect(),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes =
            hex::decode(text).map_err(|e| Error::InvalidCiphertext(format!("bad hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    /// Open the ciphertext with the epoch's secret key
    pub fn decrypt(&self, key: &EpochSecretKey) -> Result<Vec<u8>> {
        let key = key.point()?;
        let shared = gt_to_bytes(&pairing(&key, &self.c1))?;
        let mask = keccak(H2, &[&shared[..]]);
        let sigma = Sigma::from_bytes(xor(&self.c2, &mask));

        let mut padded = Vec::with_capacity(self.c3.len() * BLOCK_SIZE);
        for (i, block) in self.c3.iter().enumerate() {
            padded.extend_from_slice(&xor(block, &block_key(&sigma, i)));
        }
        let message = unpad(padded)?;

        let r = hash_to_scalar(H3, &[&sigma.as_bytes()[..], &message[..]]);
        if G2Projective::generator() * r != self.c1 {
            return Err(Error::Decryption("ciphertext does not verify".into()));
        }

        Ok(message)
    }
}

/// Encrypt `message` to the epoch `identity` under the eon key
pub fn encrypt(
    message: &[u8],
    master_public_key: &G2Projective,
    identity: &EpochId,
    sigma: &Sigma,
) -> Result<EncryptedMessage> {
    let r = hash_to_scalar(H3, &[&sigma.as_bytes()[..], message]);
    let c1 = G2Projective::generator() * r;

    let shared: Gt = pairing(identity.point(), master_public_key) * r;
    let mask = keccak(H2, &[&gt_to_bytes(&shared)?[..]]);
    let c2 = xor(sigma.as_bytes(), &mask);

    let c3 = pad(message)
        .chunks_exact(BLOCK_SIZE)
        .enumerate()
        .map(|(i, block)| xor(&to_block(block), &block_key(sigma, i)))
        .collect();

    Ok(EncryptedMessage { c1, c2, c3 })
}

fn block_key(sigma: &Sigma, index: usize) -> Block {
    keccak(H4, &[&sigma.as_bytes()[..], &(index as u32).to_be_bytes()[..]])
}

fn xor(a: &Block, b: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

fn to_block(bytes: &[u8]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(bytes);
    block
}

/// PKCS#7 to a multiple of the block size; always adds at least one byte
fn pad(message: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - message.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(message.len() + pad_len);
    padded.extend_from_slice(message);
    padded.resize(message.len() + pad_len, pad_len as u8);
    padded
}

fn unpad(mut padded: Vec<u8>) -> Result<Vec<u8>> {
    let pad_len = padded.last().copied().unwrap_or(0) as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > padded.len() {
        return Err(Error::Decryption("invalid padding".into()));
    }
    if padded[padded.len() - pad_len..]
        .iter()
        .any(|b| *b as usize != pad_len)
    {
        return Err(Error::Decryption("invalid padding".into()));
    }
    padded.truncate(padded.len() - pad_len);
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::EpochIdentifier;
    use crate::primitives::{random_scalar, seeded_rng};

    struct Keys {
        mpk: G2Projective,
        identity: EpochId,
        key: EpochSecretKey,
    }

    fn keys(identifier: &[u8]) -> Keys {
        let secret = random_scalar(&mut seeded_rng([6u8; 32]));
        let identity = EpochIdentifier::from_raw(identifier).identity();
        Keys {
            mpk: G2Projective::generator() * secret,
            identity,
            key: EpochSecretKey::from_point(&(*identity.point() * secret)),
        }
    }

    fn sigma() -> Sigma {
        Sigma::random(&mut seeded_rng([8u8; 32]))
    }

    #[test]
    fn test_encrypt_decrypt() {
        let keys = keys(b"epoch");
        let messages: [&[u8]; 4] = [b"", b"hello", &[7u8; 32], &[1u8; 100]];
        for message in messages {
            let ciphertext = encrypt(message, &keys.mpk, &keys.identity, &sigma()).unwrap();
            assert_eq!(ciphertext.c3.len(), message.len() / BLOCK_SIZE + 1);

            let parsed = EncryptedMessage::from_hex(&ciphertext.to_hex()).unwrap();
            assert_eq!(parsed, ciphertext);
            assert_eq!(parsed.decrypt(&keys.key).unwrap(), message);
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let a = keys(b"epoch-a");
        let b = keys(b"epoch-b");
        let ciphertext = encrypt(b"hello", &a.mpk, &a.identity, &sigma()).unwrap();

        assert!(matches!(
            ciphertext.decrypt(&b.key),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_tampering_detected() {
        let keys = keys(b"epoch");
        let bytes = encrypt(b"attack at dawn", &keys.mpk, &keys.identity, &sigma())
            .unwrap()
            .to_bytes();

        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;

            let result = EncryptedMessage::from_bytes(&tampered).and_then(|c| c.decrypt(&keys.key));
            if i < G2_SIZE {
                // A flipped C1 may no longer decode as a point
                assert!(
                    matches!(result, Err(Error::Decryption(_)) | Err(Error::InvalidCiphertext(_))),
                    "byte {} flip went undetected",
                    i
                );
            } else {
                assert!(
                    matches!(result, Err(Error::Decryption(_))),
                    "byte {} flip gave {:?}",
                    i,
                    result
                );
            }
        }
    }

    #[test]
    fn test_envelope_validation() {
        assert!(matches!(
            EncryptedMessage::from_bytes(&[0u8; MIN_CIPHERTEXT_SIZE - 1]),
            Err(Error::InvalidCiphertext(_))
        ));
        assert!(matches!(
            EncryptedMessage::from_bytes(&[0u8; MIN_CIPHERTEXT_SIZE + 1]),
            Err(Error::InvalidCiphertext(_))
        ));
        assert!(matches!(
            EncryptedMessage::from_hex("zz"),
            Err(Error::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_sigma_changes_ciphertext() {
        let keys = keys(b"epoch");
        let a = encrypt(b"hello", &keys.mpk, &keys.identity, &Sigma::from_bytes([1u8; 32])).unwrap();
        let b = encrypt(b"hello", &keys.mpk, &keys.identity, &Sigma::from_bytes([2u8; 32])).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.decrypt(&keys.key).unwrap(), b.decrypt(&keys.key).unwrap());
    }

    #[test]
    fn test_wall_clock_sigma() {
        let sigma = Sigma::from_wall_clock(1_700_000_000);
        assert_eq!(&sigma.as_bytes()[..10], b"1700000000");
        assert!(sigma.as_bytes()[10..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad(b"").len(), BLOCK_SIZE);
        assert_eq!(pad(&[0u8; 31]).last(), Some(&1u8));
        assert_eq!(unpad(pad(b"hello")).unwrap(), b"hello");
        assert!(unpad(vec![0u8; BLOCK_SIZE]).is_err());
        assert!(unpad(vec![33u8; BLOCK_SIZE]).is_err());
    }
}
