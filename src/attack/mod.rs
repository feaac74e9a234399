//! Demonstration traits and findings

use crate::error::Result;
use rand::RngCore;
use serde::Serialize;

pub mod nonce_reuse;
pub mod protocol_abort;
pub mod side_channel;

pub use nonce_reuse::{NonceReuseAttack, NonceReuseDemo};
pub use protocol_abort::ProtocolAbortAttack;
pub use side_channel::SideChannelAttack;

/// One self-contained flaw demonstration.
///
/// Every run draws its randomness from the source it is handed, so the same
/// seed reproduces the same finding.
pub trait Attack {
    fn name(&self) -> &'static str;
    fn run(&self, rng: &mut dyn RngCore) -> Result<Finding>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Finding {
    NonceReuse(nonce_reuse::NonceReuseFinding),
    ProtocolAbort(protocol_abort::ProtocolAbortFinding),
    SideChannel(side_channel::SideChannelFinding),
}

impl Finding {
    /// Whether the demonstration exposed the flaw it targets.
    pub fn is_vulnerable(&self) -> bool {
        match self {
            Finding::NonceReuse(f) => f.key_matches,
            Finding::ProtocolAbort(f) => f.leaks.iter().any(|l| !l.leaked_fields.is_empty()),
            Finding::SideChannel(f) => f.verdict.is_detected(),
        }
    }
}
