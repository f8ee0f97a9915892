//! Feldman secret sharing of one participant's contribution

use super::{PolyCommitmentMsg, PolyEvalMsg};
use crate::primitives::{
    commit_poly, eval_poly, g2_to_bytes, participant_x, random_scalar, scalar_to_bytes,
};
use crate::{Error, ParticipantId, Result};
use blstrs::{G2Projective, Scalar};
use ff::Field;
use rand_core::{CryptoRng, RngCore};

/// Secret polynomial of degree `t - 1`; the constant term is the dealer's secret
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Sample a random polynomial with `threshold` coefficients
    pub fn random<R: RngCore + CryptoRng>(threshold: usize, rng: &mut R) -> Self {
        let coefficients = (0..threshold).map(|_| random_scalar(rng)).collect();
        Self { coefficients }
    }

    /// Evaluation at a participant's point
    pub fn eval_for(&self, participant: ParticipantId) -> Scalar {
        eval_poly(&self.coefficients, &participant_x(participant))
    }

    /// Public commitment to the coefficients
    pub fn commitment(&self) -> Vec<G2Projective> {
        commit_poly(&self.coefficients)
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }
}

impl Drop for Polynomial {
    fn drop(&mut self) {
        for coefficient in self.coefficients.iter_mut() {
            *coefficient = Scalar::ZERO;
        }
    }
}

/// Deal a fresh secret among `n_participants`
///
/// Returns the polynomial (kept by the dealer to answer accusations), the
/// commitment to broadcast and one evaluation per participant, the dealer's
/// own self-share included.
pub fn deal<R: RngCore + CryptoRng>(
    threshold: usize,
    n_participants: usize,
    dealer: ParticipantId,
    rng: &mut R,
) -> Result<(Polynomial, PolyCommitmentMsg, Vec<PolyEvalMsg>)> {
    if threshold == 0 || threshold > n_participants {
        return Err(Error::InvalidConfig(format!(
            "cannot deal a {}-of-{} sharing",
            threshold, n_participants
        )));
    }
    if dealer >= n_participants {
        return Err(Error::InvalidParticipantId(dealer));
    }

    let polynomial = Polynomial::random(threshold, rng);

    let commitment = PolyCommitmentMsg {
        sender: dealer,
        gammas: polynomial
            .commitment()
            .iter()
            .map(|gamma| g2_to_bytes(gamma).to_vec())
            .collect(),
    };

    let evals = (0..n_participants)
        .map(|receiver| PolyEvalMsg {
            sender: dealer,
            receiver,
            eval: scalar_to_bytes(&polynomial.eval_for(receiver)).to_vec(),
        })
        .collect();

    Ok((polynomial, commitment, evals))
}
