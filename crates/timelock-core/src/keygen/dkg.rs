//! DKG protocol driver over a message relay

use super::{AccusationMsg, ApologyMsg, DkgMessage, DkgSession, PolyCommitmentMsg, PolyEvalMsg};
use crate::mpc::{Envelope, MemoryRelay, Relay};
use crate::primitives::{entropy_rng, seeded_rng};
use crate::{DkgConfig, DkgResult, Error, ParticipantId, Result};
use rand_core::{CryptoRng, RngCore};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const ROUND_COMMITMENTS: u32 = 1;
const ROUND_EVALS: u32 = 2;
const ROUND_ACCUSATIONS: u32 = 3;
const ROUND_APOLOGIES: u32 = 4;

/// How long an in-process participant waits for the others in one round
const LOCAL_ROUND_TIMEOUT: Duration = Duration::from_secs(60);

/// Run the distributed key generation protocol
///
/// One relay round per phase: commitments and accusation/apology bundles are
/// broadcast, evaluations are sent directly. Every participant posts exactly
/// one message per broadcast round (possibly an empty bundle), so the number
/// of messages to wait for is always known.
///
/// # Arguments
/// * `config` - Session configuration
/// * `relay` - Message relay for communication
/// * `rng` - Randomness for the participant's polynomial
///
/// # Returns
/// The participant's result after the session is finalized
#[instrument(skip(relay, rng))]
pub async fn run_dkg<R: Relay, G: RngCore + CryptoRng + Send>(
    config: &DkgConfig,
    relay: &R,
    rng: &mut G,
) -> Result<DkgResult> {
    info!(
        participant_id = config.participant_id,
        n_participants = config.n_participants,
        threshold = config.threshold,
        "Starting DKG"
    );

    let session_id = &config.session_id;
    let me = config.participant_id;
    let n = config.n_participants;
    let mut session = DkgSession::new(config.clone());

    // Dealing: commitments
    debug!("DKG Round 1: Commitments");
    let (commitment, evals) = session.start_dealing(rng)?;
    relay
        .broadcast(session_id, ROUND_COMMITMENTS, me, &commitment)
        .await?;

    let commitments = relay
        .collect_broadcasts::<PolyCommitmentMsg>(session_id, ROUND_COMMITMENTS, n)
        .await?;
    for envelope in commitments {
        absorb(&mut session, envelope.from, envelope.message.into());
    }

    // Dealing: evaluations, self-share handled locally
    debug!("DKG Round 2: Evaluations");
    for eval in evals {
        if eval.receiver == me {
            absorb(&mut session, me, eval.into());
            continue;
        }
        relay
            .send_direct(session_id, ROUND_EVALS, me, eval.receiver, &eval)
            .await?;
    }

    let received = relay
        .collect_direct::<PolyEvalMsg>(session_id, ROUND_EVALS, me, n - 1)
        .await?;
    for envelope in received {
        absorb(&mut session, envelope.from, envelope.message.into());
    }

    // Accusing
    debug!("DKG Round 3: Accusations");
    let accusations = session.start_accusing()?;
    relay
        .broadcast(session_id, ROUND_ACCUSATIONS, me, &accusations)
        .await?;

    let bundles = relay
        .collect_broadcasts::<Vec<AccusationMsg>>(session_id, ROUND_ACCUSATIONS, n)
        .await?;
    absorb_bundles(&mut session, bundles);

    // Apologizing
    debug!("DKG Round 4: Apologies");
    let apologies = session.start_apologizing()?;
    relay
        .broadcast(session_id, ROUND_APOLOGIES, me, &apologies)
        .await?;

    let bundles = relay
        .collect_broadcasts::<Vec<ApologyMsg>>(session_id, ROUND_APOLOGIES, n)
        .await?;
    absorb_bundles(&mut session, bundles);

    let qualified = session.finalize()?.len();
    let result = session.compute_result()?;

    info!(
        participant_id = me,
        qualified,
        master_public_key = %result.master_public_key_hex(),
        "DKG completed successfully"
    );

    Ok(result)
}

/// Feed a message posted by `from` to the session; bad messages are logged
/// and the dealer is dealt with by the accusation rounds
fn absorb(session: &mut DkgSession, from: ParticipantId, msg: DkgMessage) {
    if let Err(e) = session.handle_message(from, &msg) {
        warn!(
            kind = msg.kind(),
            from,
            error = %e,
            "Rejected DKG message"
        );
    }
}

/// Feed every entry of every posted bundle, each attributed to its poster
fn absorb_bundles<M: Into<DkgMessage>>(session: &mut DkgSession, bundles: Vec<Envelope<Vec<M>>>) {
    for Envelope { from, message } in bundles {
        for msg in message {
            absorb(session, from, msg.into());
        }
    }
}

/// Run a complete session for `n_participants` keypers inside this process
///
/// Each keyper runs on its own task over a shared [`MemoryRelay`]. A round
/// that stalls fails after a minute instead of hanging startup. With a seed the whole run, session ID included, is reproducible.
pub async fn run_local_dkg(
    n_participants: usize,
    threshold: usize,
    seed: Option<[u8; 32]>,
) -> Result<Vec<DkgResult>> {
    let seed = match seed {
        Some(seed) => seed,
        None => {
            let mut seed = [0u8; 32];
            entropy_rng()?.fill_bytes(&mut seed);
            seed
        }
    };

    let mut session_id = [0u8; 32];
    seeded_rng(seed).fill_bytes(&mut session_id);

    let relay = MemoryRelay::new().with_timeout(LOCAL_ROUND_TIMEOUT);
    let mut handles = Vec::with_capacity(n_participants);

    for participant_id in 0..n_participants {
        let config = DkgConfig::new(session_id, n_participants, threshold, participant_id)?;
        let relay = relay.clone();

        handles.push(tokio::spawn(async move {
            let mut rng = seeded_rng(seed);
            rng.set_stream(participant_id as u64 + 1);
            run_dkg(&config, &relay, &mut rng).await
        }));
    }

    futures_util::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.map_err(|e| Error::Internal(format!("DKG task failed: {}", e)))?)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::participant_x;
    use blstrs::G2Projective;
    use group::Group;

    #[tokio::test]
    async fn test_local_dkg() {
        let results = run_local_dkg(3, 2, Some([1u8; 32])).await.unwrap();
        assert_eq!(results.len(), 3);

        for (id, result) in results.iter().enumerate() {
            assert_eq!(result.participant_id, id);
            assert_eq!(result.qualified, (0..3).collect());
            assert_eq!(result.master_public_key, results[0].master_public_key);
            assert_eq!(result.public_key_shares, results[0].public_key_shares);
            assert_eq!(
                result.public_key_shares[id],
                G2Projective::generator() * result.secret_share.scalar().unwrap()
            );
        }

        // Shares of participants 0 and 2 interpolate to the master key
        let xs = [participant_x(0), participant_x(2)];
        let combined = [&results[0], &results[2]].iter().zip(&xs).fold(
            G2Projective::identity(),
            |acc, (result, x)| {
                let lambda = crate::primitives::lagrange_coefficient(x, &xs).unwrap();
                acc + result.public_key_shares[result.participant_id] * lambda
            },
        );
        assert_eq!(combined, results[0].master_public_key);
    }

    #[tokio::test]
    async fn test_local_dkg_is_reproducible_with_seed() {
        let first = run_local_dkg(2, 2, Some([9u8; 32])).await.unwrap();
        let second = run_local_dkg(2, 2, Some([9u8; 32])).await.unwrap();
        let other = run_local_dkg(2, 2, None).await.unwrap();

        assert_eq!(first[0].master_public_key, second[0].master_public_key);
        assert_ne!(first[0].master_public_key, other[0].master_public_key);
    }

    #[tokio::test]
    async fn test_single_keyper() {
        let results = run_local_dkg(1, 1, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_qualified(0));
    }

    #[tokio::test]
    async fn test_rejects_bad_threshold() {
        assert!(matches!(
            run_local_dkg(2, 3, None).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_stalled_round_times_out() {
        let relay = MemoryRelay::new().with_timeout(Duration::from_millis(200));
        let config = DkgConfig::new([6u8; 32], 2, 2, 0).unwrap();

        // Participant 1 never shows up
        let result = run_dkg(&config, &relay, &mut seeded_rng([6u8; 32])).await;
        assert!(matches!(result, Err(Error::Relay(_))));
    }

    #[tokio::test]
    async fn test_bundle_entries_bound_to_poster() {
        use crate::keygen::AccusationReason;
        use crate::primitives::scalar_to_bytes;
        use blstrs::Scalar;

        let session_id = [7u8; 32];
        let relay = MemoryRelay::new().with_timeout(Duration::from_secs(10));

        // Participant 2 deals honestly, falsely accuses 0, tries to accuse 0
        // in 1's name and answers its own accusation in 0's name
        let mut cheater = DkgSession::new(DkgConfig::new(session_id, 3, 2, 2).unwrap());
        let (commitment, evals) = cheater.start_dealing(&mut seeded_rng([8u8; 32])).unwrap();
        relay.broadcast(&session_id, ROUND_COMMITMENTS, 2, &commitment).await.unwrap();
        for eval in evals.iter().filter(|eval| eval.receiver != 2) {
            relay
                .send_direct(&session_id, ROUND_EVALS, 2, eval.receiver, eval)
                .await
                .unwrap();
        }
        let accusations = vec![
            AccusationMsg {
                accuser: 2,
                accused: 0,
                reason: AccusationReason::InvalidEval,
            },
            AccusationMsg {
                accuser: 1,
                accused: 0,
                reason: AccusationReason::InvalidEval,
            },
        ];
        relay.broadcast(&session_id, ROUND_ACCUSATIONS, 2, &accusations).await.unwrap();
        let apologies = vec![ApologyMsg {
            accused: 0,
            accuser: 2,
            eval: scalar_to_bytes(&Scalar::from(99u64)).to_vec(),
        }];
        relay.broadcast(&session_id, ROUND_APOLOGIES, 2, &apologies).await.unwrap();

        let honest = |id: usize| {
            let relay = relay.clone();
            async move {
                let config = DkgConfig::new(session_id, 3, 2, id).unwrap();
                let mut rng = seeded_rng([id as u8; 32]);
                run_dkg(&config, &relay, &mut rng).await
            }
        };
        let (first, second) = tokio::join!(honest(0), honest(1));

        for result in [first.unwrap(), second.unwrap()] {
            assert_eq!(result.qualified, (0..3).collect());
        }
    }
}
