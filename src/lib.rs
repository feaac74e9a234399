//! Demonstrations of three cryptographic implementation flaws
//!
//! This library recovers ECDSA private keys from signatures that reuse a
//! nonce, shows how an aborted multi-stage protocol leaks its intermediate
//! secrets, and detects input-dependent timing as a side channel.

pub mod attack;
pub mod error;
pub mod math;
pub mod protocol;
pub mod signature;
pub mod timing;

pub use attack::{Attack, Finding};
pub use error::{Error, Result};
pub use protocol::{HardenedSession, ProtocolSession};
pub use signature::{CurveParams, Signature, SignedMessage};
pub use timing::{analyze, TimingAnalyzer, TimingSample, Verdict};
