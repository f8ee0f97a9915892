//! Distributed Key Generation (DKG) module
//!
//! Joint-Feldman DKG on BLS12-381 with an accusation/apology round that
//! removes dealers whose shares cannot be verified.

mod dealer;
mod dkg;
mod messages;
mod session;

pub use dealer::{deal, Polynomial};
pub use dkg::{run_dkg, run_local_dkg};
pub use messages::*;
pub use session::{DkgSession, Phase};
