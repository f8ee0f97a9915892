//! DKG message types
//!
//! Field elements and points travel in their compressed byte encodings; the
//! session decodes and validates them on receipt.

use crate::ParticipantId;
use serde::{Deserialize, Serialize};

/// Dealing: commitment to the sender's secret polynomial (broadcast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyCommitmentMsg {
    /// Sender participant ID
    pub sender: ParticipantId,
    /// Compressed G2 commitments to the polynomial coefficients (Feldman VSS)
    pub gammas: Vec<Vec<u8>>,
}

/// Dealing: evaluation of the sender's polynomial at the receiver's point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyEvalMsg {
    /// Sender participant ID
    pub sender: ParticipantId,
    /// Receiver participant ID
    pub receiver: ParticipantId,
    /// Big-endian scalar
    pub eval: Vec<u8>,
}

/// Why an accuser rejects a dealer's contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccusationReason {
    /// No commitment received from the dealer
    MissingCommitment,
    /// No evaluation received from the dealer
    MissingEval,
    /// Commitment or evaluation could not be decoded
    MalformedMessage,
    /// Evaluation does not match the dealer's commitment
    InvalidEval,
}

/// Accusing: `accuser` rejects the evaluation it got from `accused` (broadcast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccusationMsg {
    pub accuser: ParticipantId,
    pub accused: ParticipantId,
    pub reason: AccusationReason,
}

/// Apologizing: `accused` reveals the evaluation for `accuser` in the clear (broadcast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApologyMsg {
    pub accused: ParticipantId,
    pub accuser: ParticipantId,
    /// Big-endian scalar
    pub eval: Vec<u8>,
}

/// Every message a DKG session accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DkgMessage {
    Commitment(PolyCommitmentMsg),
    Eval(PolyEvalMsg),
    Accusation(AccusationMsg),
    Apology(ApologyMsg),
}

impl DkgMessage {
    /// Get the sender of this message
    pub fn sender(&self) -> ParticipantId {
        match self {
            DkgMessage::Commitment(msg) => msg.sender,
            DkgMessage::Eval(msg) => msg.sender,
            DkgMessage::Accusation(msg) => msg.accuser,
            DkgMessage::Apology(msg) => msg.accused,
        }
    }

    /// Short name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            DkgMessage::Commitment(_) => "commitment",
            DkgMessage::Eval(_) => "eval",
            DkgMessage::Accusation(_) => "accusation",
            DkgMessage::Apology(_) => "apology",
        }
    }
}

impl From<PolyCommitmentMsg> for DkgMessage {
    fn from(msg: PolyCommitmentMsg) -> Self {
        DkgMessage::Commitment(msg)
    }
}

impl From<PolyEvalMsg> for DkgMessage {
    fn from(msg: PolyEvalMsg) -> Self {
        DkgMessage::Eval(msg)
    }
}

impl From<AccusationMsg> for DkgMessage {
    fn from(msg: AccusationMsg) -> Self {
        DkgMessage::Accusation(msg)
    }
}

impl From<ApologyMsg> for DkgMessage {
    fn from(msg: ApologyMsg) -> Self {
        DkgMessage::Apology(msg)
    }
}
