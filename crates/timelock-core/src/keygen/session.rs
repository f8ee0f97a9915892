//! DKG session state machine
//!
//! A session walks through four phases:
//!
//! 1. **Dealing**: every participant deals its polynomial and ingests the
//!    commitments and the evaluations addressed to it.
//! 2. **Accusing**: every received evaluation is checked against the
//!    dealer's commitment; failures turn into accusations.
//! 3. **Apologizing**: accused dealers reveal the disputed evaluation in the
//!    clear; a revealed value that still fails (or never arrives) marks the
//!    dealer as corrupt.
//! 4. **Finalized**: the qualified set is frozen and the result computed.

use super::dealer::{deal, Polynomial};
use super::{AccusationMsg, AccusationReason, ApologyMsg, DkgMessage, PolyCommitmentMsg, PolyEvalMsg};
use crate::primitives::{
    eval_commitment, g2_from_bytes, participant_x, scalar_from_bytes, scalar_to_bytes, verify_eval,
};
use crate::types::SecretKeyShare;
use crate::{DkgConfig, DkgResult, Error, ParticipantId, Result};
use blstrs::{G2Projective, Scalar};
use ff::Field;
use group::Group;
use rand_core::{CryptoRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Protocol phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Dealing,
    Accusing,
    Apologizing,
    Finalized,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Dealing => "dealing",
            Phase::Accusing => "accusing",
            Phase::Apologizing => "apologizing",
            Phase::Finalized => "finalized",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local view of one participant in a DKG session
pub struct DkgSession {
    config: DkgConfig,
    phase: Phase,
    /// Our own polynomial, kept to answer accusations
    polynomial: Option<Polynomial>,
    /// Decoded commitments per dealer
    commitments: BTreeMap<ParticipantId, Vec<G2Projective>>,
    /// Evaluations addressed to us, per dealer
    evals: BTreeMap<ParticipantId, Scalar>,
    /// Dealers that sent us something we could not decode
    malformed: BTreeSet<ParticipantId>,
    /// (accuser, accused) -> reason
    accusations: BTreeMap<(ParticipantId, ParticipantId), AccusationReason>,
    /// Accusations answered by a verified apology
    cleared: BTreeSet<(ParticipantId, ParticipantId)>,
    /// Dealers excluded for good
    corrupt: BTreeSet<ParticipantId>,
    qualified: Option<BTreeSet<ParticipantId>>,
}

impl DkgSession {
    /// Create a new DKG session
    pub fn new(config: DkgConfig) -> Self {
        Self {
            config,
            phase: Phase::Dealing,
            polynomial: None,
            commitments: BTreeMap::new(),
            evals: BTreeMap::new(),
            malformed: BTreeSet::new(),
            accusations: BTreeMap::new(),
            cleared: BTreeSet::new(),
            corrupt: BTreeSet::new(),
            qualified: None,
        }
    }

    pub fn config(&self) -> &DkgConfig {
        &self.config
    }

    /// Get current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Qualified set, once finalized
    pub fn qualified(&self) -> Option<&BTreeSet<ParticipantId>> {
        self.qualified.as_ref()
    }

    /// Whether a dealer has been excluded
    pub fn is_corrupt(&self, participant: ParticipantId) -> bool {
        self.corrupt.contains(&participant)
    }

    /// All accusations seen so far as (accuser, accused) pairs
    pub fn accusations(&self) -> impl Iterator<Item = (ParticipantId, ParticipantId)> + '_ {
        self.accusations.keys().copied()
    }

    /// Deal our contribution
    ///
    /// The returned evaluations include our self-share; route it back through
    /// [`DkgSession::handle_eval`] like any other.
    pub fn start_dealing<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<(PolyCommitmentMsg, Vec<PolyEvalMsg>)> {
        self.expect_phase(Phase::Dealing, "deal")?;
        if self.polynomial.is_some() {
            return Err(Error::ProtocolViolation("already dealt".into()));
        }

        let (polynomial, commitment, evals) = deal(
            self.config.threshold,
            self.config.n_participants,
            self.config.participant_id,
            rng,
        )?;
        self.polynomial = Some(polynomial);

        debug!(
            participant_id = self.config.participant_id,
            evals = evals.len(),
            "Dealt polynomial"
        );

        Ok((commitment, evals))
    }

    /// Dispatch a message posted by `from` to the handler of its kind
    ///
    /// `from` is the sender as attested by the transport. A message speaking
    /// for anyone else (an accusation in another accuser's name, an apology
    /// for another dealer) is rejected before it can touch the session.
    pub fn handle_message(&mut self, from: ParticipantId, msg: &DkgMessage) -> Result<()> {
        if msg.sender() != from {
            return Err(Error::ProtocolViolation(format!(
                "participant {} posted a {} on behalf of participant {}",
                from,
                msg.kind(),
                msg.sender()
            )));
        }

        match msg {
            DkgMessage::Commitment(msg) => self.handle_commitment(msg),
            DkgMessage::Eval(msg) => self.handle_eval(msg),
            DkgMessage::Accusation(msg) => self.handle_accusation(msg),
            DkgMessage::Apology(msg) => self.handle_apology(msg),
        }
    }

    /// Store a dealer's polynomial commitment
    pub fn handle_commitment(&mut self, msg: &PolyCommitmentMsg) -> Result<()> {
        self.expect_phase(Phase::Dealing, "commitment")?;
        self.check_participant(msg.sender)?;
        if self.commitments.contains_key(&msg.sender) {
            return Err(Error::DuplicateMessage {
                message: "commitment",
                from: msg.sender,
            });
        }

        let gammas = match self.decode_gammas(&msg.gammas) {
            Ok(gammas) => gammas,
            Err(e) => {
                warn!(sender = msg.sender, error = %e, "Malformed commitment");
                self.malformed.insert(msg.sender);
                return Err(e);
            }
        };

        self.commitments.insert(msg.sender, gammas);
        Ok(())
    }

    /// Store an evaluation addressed to us
    pub fn handle_eval(&mut self, msg: &PolyEvalMsg) -> Result<()> {
        self.expect_phase(Phase::Dealing, "eval")?;
        self.check_participant(msg.sender)?;
        if msg.receiver != self.config.participant_id {
            return Err(Error::ProtocolViolation(format!(
                "eval for participant {} delivered to participant {}",
                msg.receiver, self.config.participant_id
            )));
        }
        if self.evals.contains_key(&msg.sender) {
            return Err(Error::DuplicateMessage {
                message: "eval",
                from: msg.sender,
            });
        }

        let eval = match scalar_from_bytes(&msg.eval) {
            Ok(eval) => eval,
            Err(e) => {
                warn!(sender = msg.sender, error = %e, "Malformed eval");
                self.malformed.insert(msg.sender);
                return Err(e);
            }
        };

        self.evals.insert(msg.sender, eval);
        Ok(())
    }

    /// Close dealing and accuse every dealer whose evaluation does not verify
    pub fn start_accusing(&mut self) -> Result<Vec<AccusationMsg>> {
        self.expect_phase(Phase::Dealing, "start accusing")?;
        self.phase = Phase::Accusing;

        let me = self.config.participant_id;
        let x = participant_x(me);
        let mut accusations = Vec::new();

        for dealer in self.config.participants() {
            if dealer == me {
                continue;
            }

            let reason = match (self.commitments.get(&dealer), self.evals.get(&dealer)) {
                (None, _) if self.malformed.contains(&dealer) => AccusationReason::MalformedMessage,
                (None, _) => AccusationReason::MissingCommitment,
                (Some(_), None) if self.malformed.contains(&dealer) => {
                    AccusationReason::MalformedMessage
                }
                (Some(_), None) => AccusationReason::MissingEval,
                (Some(gammas), Some(eval)) => {
                    if verify_eval(eval, gammas, &x) {
                        continue;
                    }
                    AccusationReason::InvalidEval
                }
            };

            self.accusations.insert((me, dealer), reason);
            accusations.push(AccusationMsg {
                accuser: me,
                accused: dealer,
                reason,
            });
        }

        info!(
            participant_id = me,
            accusations = accusations.len(),
            "Accusing phase started"
        );

        Ok(accusations)
    }

    /// Record an accusation (ours echoed back, or anyone else's)
    pub fn handle_accusation(&mut self, msg: &AccusationMsg) -> Result<()> {
        self.expect_phase(Phase::Accusing, "accusation")?;
        self.check_participant(msg.accuser)?;
        self.check_participant(msg.accused)?;
        if msg.accuser == msg.accused {
            return Err(Error::ProtocolViolation(format!(
                "participant {} accused itself",
                msg.accuser
            )));
        }

        self.accusations
            .entry((msg.accuser, msg.accused))
            .or_insert(msg.reason);

        if msg.accused == self.config.participant_id {
            debug!(accuser = msg.accuser, reason = ?msg.reason, "Accused");
        }
        Ok(())
    }

    /// Close accusing and reveal the evaluation behind every accusation against us
    pub fn start_apologizing(&mut self) -> Result<Vec<ApologyMsg>> {
        self.expect_phase(Phase::Accusing, "start apologizing")?;
        self.phase = Phase::Apologizing;

        let me = self.config.participant_id;
        let polynomial = self
            .polynomial
            .as_ref()
            .ok_or_else(|| Error::ProtocolViolation("apologizing without dealing".into()))?;

        let apologies: Vec<ApologyMsg> = self
            .accusations
            .keys()
            .filter(|(_, accused)| *accused == me)
            .map(|(accuser, _)| ApologyMsg {
                accused: me,
                accuser: *accuser,
                eval: scalar_to_bytes(&polynomial.eval_for(*accuser)).to_vec(),
            })
            .collect();

        info!(
            participant_id = me,
            apologies = apologies.len(),
            "Apologizing phase started"
        );

        Ok(apologies)
    }

    /// Re-verify a revealed evaluation against the accused dealer's commitment
    pub fn handle_apology(&mut self, msg: &ApologyMsg) -> Result<()> {
        self.expect_phase(Phase::Apologizing, "apology")?;
        self.check_participant(msg.accuser)?;
        self.check_participant(msg.accused)?;

        let key = (msg.accuser, msg.accused);
        if !self.accusations.contains_key(&key) {
            return Err(Error::ProtocolViolation(format!(
                "apology from {} to {} without accusation",
                msg.accused, msg.accuser
            )));
        }
        if self.cleared.contains(&key) {
            return Err(Error::DuplicateMessage {
                message: "apology",
                from: msg.accused,
            });
        }

        let eval = match scalar_from_bytes(&msg.eval) {
            Ok(eval) => eval,
            Err(e) => {
                warn!(accused = msg.accused, error = %e, "Malformed apology");
                self.corrupt.insert(msg.accused);
                return Err(e);
            }
        };

        let verified = self
            .commitments
            .get(&msg.accused)
            .map(|gammas| verify_eval(&eval, gammas, &participant_x(msg.accuser)))
            .unwrap_or(false);

        if !verified {
            warn!(
                accused = msg.accused,
                accuser = msg.accuser,
                "Apology does not verify"
            );
            self.corrupt.insert(msg.accused);
            return Ok(());
        }

        self.cleared.insert(key);
        if msg.accuser == self.config.participant_id {
            self.evals.insert(msg.accused, eval);
        }

        debug!(
            accused = msg.accused,
            accuser = msg.accuser,
            "Accusation cleared"
        );
        Ok(())
    }

    /// Freeze the qualified set
    pub fn finalize(&mut self) -> Result<&BTreeSet<ParticipantId>> {
        self.expect_phase(Phase::Apologizing, "finalize")?;
        self.phase = Phase::Finalized;

        let qualified: BTreeSet<ParticipantId> = self
            .config
            .participants()
            .filter(|p| self.commitments.contains_key(p))
            .filter(|p| !self.corrupt.contains(p))
            .filter(|&p| {
                self.accusations
                    .keys()
                    .filter(|(_, accused)| *accused == p)
                    .all(|key| self.cleared.contains(key))
            })
            .collect();

        info!(
            participant_id = self.config.participant_id,
            qualified = ?qualified,
            "DKG finalized"
        );

        Ok(&*self.qualified.insert(qualified))
    }

    /// Combine the qualified contributions into the session result
    pub fn compute_result(&self) -> Result<DkgResult> {
        self.expect_phase(Phase::Finalized, "compute result")?;
        let qualified = self
            .qualified
            .as_ref()
            .ok_or_else(|| Error::Internal("finalized without qualified set".into()))?;

        if qualified.len() < self.config.threshold {
            return Err(Error::InsufficientParticipants {
                required: self.config.threshold,
                actual: qualified.len(),
            });
        }

        let mut secret_share = Scalar::ZERO;
        let mut master_public_key = G2Projective::identity();
        let mut qualified_gammas = Vec::with_capacity(qualified.len());

        for dealer in qualified {
            let eval = self
                .evals
                .get(dealer)
                .ok_or_else(|| Error::Internal(format!("no eval from qualified dealer {}", dealer)))?;
            let gammas = self
                .commitments
                .get(dealer)
                .ok_or_else(|| Error::Internal(format!("no commitment from qualified dealer {}", dealer)))?;

            secret_share += eval;
            master_public_key += gammas[0];
            qualified_gammas.push(gammas);
        }

        let public_key_shares = self
            .config
            .participants()
            .map(|participant| {
                let x = participant_x(participant);
                qualified_gammas
                    .iter()
                    .fold(G2Projective::identity(), |acc, gammas| {
                        acc + eval_commitment(gammas, &x)
                    })
            })
            .collect();

        Ok(DkgResult {
            participant_id: self.config.participant_id,
            n_participants: self.config.n_participants,
            threshold: self.config.threshold,
            qualified: qualified.clone(),
            master_public_key,
            secret_share: SecretKeyShare::from_scalar(&secret_share),
            public_key_shares,
        })
    }

    fn expect_phase(&self, expected: Phase, message: &'static str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::OutOfPhase {
                phase: self.phase.as_str(),
                message,
            });
        }
        Ok(())
    }

    fn check_participant(&self, participant: ParticipantId) -> Result<()> {
        if participant >= self.config.n_participants {
            return Err(Error::InvalidParticipantId(participant));
        }
        Ok(())
    }

    fn decode_gammas(&self, gammas: &[Vec<u8>]) -> Result<Vec<G2Projective>> {
        if gammas.len() != self.config.threshold {
            return Err(Error::Decode(format!(
                "expected {} commitments, got {}",
                self.config.threshold,
                gammas.len()
            )));
        }
        gammas.iter().map(|bytes| g2_from_bytes(bytes)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{lagrange_coefficient, seeded_rng};

    fn new_sessions(n: usize, t: usize) -> Vec<DkgSession> {
        (0..n)
            .map(|id| DkgSession::new(DkgConfig::new([0u8; 32], n, t, id).unwrap()))
            .collect()
    }

    type Outbox = Vec<(ParticipantId, DkgMessage)>;

    /// Deliver every message to its recipients, attested as coming from the
    /// participant that produced it; `tamper` may rewrite a message in
    /// transit or drop it by returning false
    fn deliver(
        sessions: &mut [DkgSession],
        outbox: Outbox,
        tamper: &mut dyn FnMut(&mut DkgMessage) -> bool,
    ) {
        for (from, mut msg) in outbox {
            if !tamper(&mut msg) {
                continue;
            }
            for session in sessions.iter_mut() {
                if let DkgMessage::Eval(eval) = &msg {
                    if eval.receiver != session.config().participant_id {
                        continue;
                    }
                }
                let _ = session.handle_message(from, &msg);
            }
        }
    }

    fn deal_all(sessions: &mut [DkgSession]) -> Outbox {
        let mut rng = seeded_rng([5u8; 32]);
        let mut outbox = Vec::new();
        for session in sessions.iter_mut() {
            let me = session.config().participant_id;
            let (commitment, evals) = session.start_dealing(&mut rng).unwrap();
            outbox.push((me, DkgMessage::from(commitment)));
            outbox.extend(evals.into_iter().map(|eval| (me, DkgMessage::from(eval))));
        }
        outbox
    }

    fn accuse_all(sessions: &mut [DkgSession]) -> Outbox {
        sessions
            .iter_mut()
            .flat_map(|s| {
                let me = s.config().participant_id;
                s.start_accusing()
                    .unwrap()
                    .into_iter()
                    .map(move |msg| (me, DkgMessage::from(msg)))
            })
            .collect()
    }

    fn apologize_all(sessions: &mut [DkgSession]) -> Outbox {
        sessions
            .iter_mut()
            .flat_map(|s| {
                let me = s.config().participant_id;
                s.start_apologizing()
                    .unwrap()
                    .into_iter()
                    .map(move |msg| (me, DkgMessage::from(msg)))
            })
            .collect()
    }

    fn drive(sessions: &mut [DkgSession], tamper: &mut dyn FnMut(&mut DkgMessage) -> bool) {
        let outbox = deal_all(sessions);
        deliver(sessions, outbox, tamper);

        let outbox = accuse_all(sessions);
        deliver(sessions, outbox, tamper);

        let outbox = apologize_all(sessions);
        deliver(sessions, outbox, tamper);

        for session in sessions.iter_mut() {
            session.finalize().unwrap();
        }
    }

    fn honest(_: &mut DkgMessage) -> bool {
        true
    }

    /// All results agree on the key and any `t` shares interpolate to it
    fn assert_consistent(results: &[DkgResult]) {
        let first = &results[0];
        for result in results {
            assert_eq!(result.master_public_key, first.master_public_key);
            assert_eq!(result.qualified, first.qualified);
            let share = result.secret_share.scalar().unwrap();
            assert_eq!(
                result.public_key_shares[result.participant_id],
                G2Projective::generator() * share
            );
        }

        let subset = &results[results.len() - first.threshold..];
        let xs: Vec<Scalar> = subset.iter().map(|r| participant_x(r.participant_id)).collect();
        let combined = subset.iter().zip(&xs).fold(G2Projective::identity(), |acc, (r, x)| {
            let lambda = lagrange_coefficient(x, &xs).unwrap();
            acc + G2Projective::generator() * (r.secret_share.scalar().unwrap() * lambda)
        });
        assert_eq!(combined, first.master_public_key);
    }

    #[test]
    fn test_honest_session() {
        let mut sessions = new_sessions(4, 3);
        drive(&mut sessions, &mut honest);

        let results: Vec<DkgResult> = sessions.iter().map(|s| s.compute_result().unwrap()).collect();
        for result in &results {
            assert_eq!(result.qualified, (0..4).collect());
        }
        assert_consistent(&results);
    }

    #[test]
    fn test_single_participant() {
        let mut sessions = new_sessions(1, 1);
        drive(&mut sessions, &mut honest);

        let result = sessions[0].compute_result().unwrap();
        assert_eq!(result.qualified.len(), 1);
        assert_eq!(
            result.master_public_key,
            G2Projective::generator() * result.secret_share.scalar().unwrap()
        );
    }

    #[test]
    fn test_corrupted_eval_cleared_by_apology() {
        let mut sessions = new_sessions(4, 2);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| {
            if let DkgMessage::Eval(eval) = msg {
                if eval.sender == 1 && eval.receiver == 2 {
                    eval.eval = scalar_to_bytes(&Scalar::ONE).to_vec();
                }
            }
            true
        });

        assert!(sessions[0].accusations().any(|pair| pair == (2, 1)));
        let results: Vec<DkgResult> = sessions.iter().map(|s| s.compute_result().unwrap()).collect();
        assert!(results.iter().all(|r| r.is_qualified(1)));
        assert_consistent(&results);
    }

    #[test]
    fn test_cheating_dealer_excluded() {
        let mut sessions = new_sessions(4, 2);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| {
            match msg {
                DkgMessage::Eval(eval) if eval.sender == 1 && eval.receiver == 3 => {
                    eval.eval = scalar_to_bytes(&Scalar::from(7u64)).to_vec();
                }
                DkgMessage::Apology(apology) if apology.accused == 1 => {
                    apology.eval = scalar_to_bytes(&Scalar::from(7u64)).to_vec();
                }
                _ => {}
            }
            true
        });

        let results: Vec<DkgResult> = sessions.iter().map(|s| s.compute_result().unwrap()).collect();
        for result in &results {
            assert_eq!(result.qualified, [0, 2, 3].into_iter().collect());
        }
        assert_consistent(&results);
    }

    #[test]
    fn test_silent_dealer_excluded() {
        let mut sessions = new_sessions(3, 2);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| match msg {
            DkgMessage::Eval(eval) if eval.sender == 0 && eval.receiver == 1 => false,
            DkgMessage::Apology(apology) if apology.accused == 0 => false,
            _ => true,
        });

        let results: Vec<DkgResult> = sessions.iter().map(|s| s.compute_result().unwrap()).collect();
        for result in &results {
            assert!(!result.is_qualified(0));
            assert_eq!(result.qualified.len(), 2);
        }
        assert_consistent(&results);
    }

    #[test]
    fn test_malformed_apology_confirms_accusation() {
        let mut sessions = new_sessions(3, 2);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| {
            match msg {
                DkgMessage::Eval(eval) if eval.sender == 2 && eval.receiver == 0 => {
                    eval.eval = vec![1, 2, 3];
                }
                DkgMessage::Apology(apology) if apology.accused == 2 => {
                    apology.eval = vec![0xff; 32];
                }
                _ => {}
            }
            true
        });

        for session in &sessions {
            assert!(session.is_corrupt(2));
            assert!(!session.qualified().unwrap().contains(&2));
        }
    }

    #[test]
    fn test_malformed_commitment_excludes_dealer() {
        let mut sessions = new_sessions(4, 3);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| {
            if let DkgMessage::Commitment(commitment) = msg {
                if commitment.sender == 2 {
                    commitment.gammas[0] = vec![0u8; 5];
                }
            }
            true
        });

        let results: Vec<DkgResult> = sessions.iter().map(|s| s.compute_result().unwrap()).collect();
        for result in &results {
            assert_eq!(result.qualified, [0, 1, 3].into_iter().collect());
        }
        assert_consistent(&results);
    }

    #[test]
    fn test_insufficient_participants() {
        let mut sessions = new_sessions(2, 2);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| {
            !matches!(msg, DkgMessage::Commitment(c) if c.sender == 1)
        });

        assert!(matches!(
            sessions[0].compute_result(),
            Err(Error::InsufficientParticipants {
                required: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_no_readmission_after_exclusion() {
        let mut sessions = new_sessions(3, 2);
        drive(&mut sessions, &mut |msg: &mut DkgMessage| {
            match msg {
                // Participant 0 ends up accused by both 1 and 2, and only the
                // apology towards 1 is forged.
                DkgMessage::Eval(eval) if eval.sender == 0 && eval.receiver != 0 => {
                    eval.eval = scalar_to_bytes(&Scalar::from(11u64)).to_vec();
                }
                DkgMessage::Apology(apology) if apology.accused == 0 && apology.accuser == 1 => {
                    apology.eval = scalar_to_bytes(&Scalar::from(11u64)).to_vec();
                }
                _ => {}
            }
            true
        });

        for session in &sessions {
            assert!(session.is_corrupt(0));
            assert!(!session.qualified().unwrap().contains(&0));
        }
    }

    #[test]
    fn test_out_of_phase_messages_rejected() {
        let mut session = DkgSession::new(DkgConfig::new([0u8; 32], 2, 1, 0).unwrap());

        let accusation = AccusationMsg {
            accuser: 1,
            accused: 0,
            reason: AccusationReason::InvalidEval,
        };
        assert!(matches!(
            session.handle_accusation(&accusation),
            Err(Error::OutOfPhase { phase: "dealing", .. })
        ));
        assert!(session.finalize().is_err());

        session.start_dealing(&mut seeded_rng([0u8; 32])).unwrap();
        session.start_accusing().unwrap();

        let commitment = PolyCommitmentMsg {
            sender: 1,
            gammas: vec![],
        };
        assert!(matches!(
            session.handle_commitment(&commitment),
            Err(Error::OutOfPhase { phase: "accusing", .. })
        ));
        assert!(session.compute_result().is_err());
    }

    #[test]
    fn test_duplicate_and_misaddressed_messages() {
        let mut sessions = new_sessions(2, 1);
        let mut rng = seeded_rng([4u8; 32]);
        let (commitment, evals) = sessions[1].start_dealing(&mut rng).unwrap();

        let session = &mut sessions[0];
        session.handle_commitment(&commitment).unwrap();
        assert!(matches!(
            session.handle_commitment(&commitment),
            Err(Error::DuplicateMessage { from: 1, .. })
        ));

        // evals[1] is the dealer's self-share
        assert!(matches!(
            session.handle_eval(&evals[1]),
            Err(Error::ProtocolViolation(_))
        ));
        session.handle_eval(&evals[0]).unwrap();
        assert!(matches!(
            session.handle_eval(&evals[0]),
            Err(Error::DuplicateMessage { .. })
        ));

        let stranger = PolyCommitmentMsg {
            sender: 9,
            gammas: commitment.gammas.clone(),
        };
        assert!(matches!(
            session.handle_commitment(&stranger),
            Err(Error::InvalidParticipantId(9))
        ));
    }

    #[test]
    fn test_apology_without_accusation_rejected() {
        let mut session = DkgSession::new(DkgConfig::new([0u8; 32], 2, 1, 0).unwrap());
        session.start_dealing(&mut seeded_rng([1u8; 32])).unwrap();
        session.start_accusing().unwrap();
        session.start_apologizing().unwrap();

        let apology = ApologyMsg {
            accused: 1,
            accuser: 0,
            eval: scalar_to_bytes(&Scalar::ONE).to_vec(),
        };
        // Participant 1 never dealt to us, so we accused it; apologizing for
        // a pair nobody accused is a violation.
        let stray = ApologyMsg {
            accused: 0,
            accuser: 1,
            eval: apology.eval.clone(),
        };
        assert!(matches!(
            session.handle_apology(&stray),
            Err(Error::ProtocolViolation(_))
        ));
        assert!(session.handle_apology(&apology).is_ok());
        assert!(session.is_corrupt(1));
    }

    #[test]
    fn test_messages_in_another_participants_name_ignored() {
        let mut sessions = new_sessions(3, 2);
        let outbox = deal_all(&mut sessions);
        deliver(&mut sessions, outbox, &mut honest);

        // Participant 2 falsely accuses 0, and also tries to accuse 0 in 1's name
        let mut outbox = accuse_all(&mut sessions);
        outbox.push((
            2,
            DkgMessage::from(AccusationMsg {
                accuser: 2,
                accused: 0,
                reason: AccusationReason::InvalidEval,
            }),
        ));
        let spoofed_accusation = DkgMessage::from(AccusationMsg {
            accuser: 1,
            accused: 0,
            reason: AccusationReason::InvalidEval,
        });
        assert!(matches!(
            sessions[0].handle_message(2, &spoofed_accusation),
            Err(Error::ProtocolViolation(_))
        ));
        outbox.push((2, spoofed_accusation));
        deliver(&mut sessions, outbox, &mut honest);

        for session in &sessions {
            assert!(session.accusations().any(|pair| pair == (2, 0)));
            assert!(!session.accusations().any(|pair| pair == (1, 0)));
        }

        // ...then answers the accusation with a junk apology in 0's name,
        // ahead of 0's genuine one
        let mut outbox = vec![(
            2,
            DkgMessage::from(ApologyMsg {
                accused: 0,
                accuser: 2,
                eval: scalar_to_bytes(&Scalar::from(99u64)).to_vec(),
            }),
        )];
        outbox.extend(apologize_all(&mut sessions));
        deliver(&mut sessions, outbox, &mut honest);

        for session in sessions.iter_mut() {
            session.finalize().unwrap();
            assert!(!session.is_corrupt(0));
        }

        let results: Vec<DkgResult> = sessions.iter().map(|s| s.compute_result().unwrap()).collect();
        for result in &results {
            assert_eq!(result.qualified, (0..3).collect());
        }
        assert_consistent(&results);
    }
}
