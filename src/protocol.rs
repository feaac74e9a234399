//! Four-stage signing-style protocol with an abort path
//!
//! [`ProtocolSession`] accumulates every intermediate value it computes and
//! hands all of them back from [`ProtocolSession::abort`]; anyone holding an
//! aborted session can read the nonce and the secret-dependent products.
//! [`HardenedSession`] runs the same stages but zeroizes on abort, after
//! finalize and on drop.

use crate::error::{Error, Result};
use rand::{Rng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroize;

/// `finalize` reduces the last intermediate into `[0, RESULT_MODULUS)`.
pub const RESULT_MODULUS: u64 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialized,
    Started,
    Phase1Done,
    Phase2Done,
    Finalized,
    Aborted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialized => "initialized",
            Stage::Started => "started",
            Stage::Phase1Done => "phase1_done",
            Stage::Phase2Done => "phase2_done",
            Stage::Finalized => "finalized",
            Stage::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Finalized | Stage::Aborted)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values recorded by each stage. A field is `Some` once its stage has run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Zeroize)]
pub struct Intermediates {
    pub nonce: Option<u64>,
    pub phase1_result: Option<u64>,
    pub phase2_result: Option<u64>,
}

impl Intermediates {
    /// Names of the fields that currently hold a value.
    pub fn leaked_fields(&self) -> Vec<&'static str> {
        [
            ("nonce", self.nonce),
            ("phase1_result", self.phase1_result),
            ("phase2_result", self.phase2_result),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|_| name))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.leaked_fields().is_empty()
    }

    /// `phase1_result` is `nonce * secret`, so both together give the secret away.
    pub fn recover_secret(&self) -> Option<u32> {
        let nonce = self.nonce.filter(|n| *n != 0)?;
        let product = self.phase1_result?;
        if product % nonce != 0 {
            return None;
        }
        u32::try_from(product / nonce).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    Started {
        digest: [u8; 32],
        nonce: u64,
    },
    Phase1Done {
        digest: [u8; 32],
        nonce: u64,
        phase1_result: u64,
    },
    Phase2Done {
        digest: [u8; 32],
        nonce: u64,
        phase1_result: u64,
        phase2_result: u64,
    },
    Finalized {
        result: u64,
        intermediates: Intermediates,
    },
    Aborted {
        from: Stage,
        intermediates: Intermediates,
    },
}

impl SessionState {
    pub fn stage(&self) -> Stage {
        match self {
            SessionState::Initialized => Stage::Initialized,
            SessionState::Started { .. } => Stage::Started,
            SessionState::Phase1Done { .. } => Stage::Phase1Done,
            SessionState::Phase2Done { .. } => Stage::Phase2Done,
            SessionState::Finalized { .. } => Stage::Finalized,
            SessionState::Aborted { .. } => Stage::Aborted,
        }
    }

    fn intermediates(&self) -> Intermediates {
        match *self {
            SessionState::Initialized => Intermediates::default(),
            SessionState::Started { nonce, .. } => Intermediates {
                nonce: Some(nonce),
                ..Intermediates::default()
            },
            SessionState::Phase1Done {
                nonce,
                phase1_result,
                ..
            } => Intermediates {
                nonce: Some(nonce),
                phase1_result: Some(phase1_result),
                phase2_result: None,
            },
            SessionState::Phase2Done {
                nonce,
                phase1_result,
                phase2_result,
                ..
            } => Intermediates {
                nonce: Some(nonce),
                phase1_result: Some(phase1_result),
                phase2_result: Some(phase2_result),
            },
            SessionState::Finalized { intermediates, .. }
            | SessionState::Aborted { intermediates, .. } => intermediates,
        }
    }

    fn zeroize_values(&mut self) {
        match self {
            SessionState::Initialized => {}
            SessionState::Started { digest, nonce } => {
                digest.zeroize();
                nonce.zeroize();
            }
            SessionState::Phase1Done {
                digest,
                nonce,
                phase1_result,
            } => {
                digest.zeroize();
                nonce.zeroize();
                phase1_result.zeroize();
            }
            SessionState::Phase2Done {
                digest,
                nonce,
                phase1_result,
                phase2_result,
            } => {
                digest.zeroize();
                nonce.zeroize();
                phase1_result.zeroize();
                phase2_result.zeroize();
            }
            SessionState::Finalized { intermediates, .. }
            | SessionState::Aborted { intermediates, .. } => intermediates.zeroize(),
        }
    }
}

/// One run of the staged protocol.
///
/// Every stage must be entered from its exact predecessor; an
/// out-of-sequence call fails with [`Error::InvalidStateTransition`] and
/// leaves the session untouched.
#[derive(Debug, Clone)]
pub struct ProtocolSession {
    secret: u32,
    state: SessionState,
}

impl ProtocolSession {
    /// A fresh session holding a random secret in `[1, 2^32)`.
    pub fn new<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self::with_secret(rng.gen_range(1..=u32::MAX))
    }

    pub fn with_secret(secret: u32) -> Self {
        Self {
            secret,
            state: SessionState::Initialized,
        }
    }

    pub fn secret(&self) -> u32 {
        self.secret
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Everything recorded so far. Nothing is ever redacted.
    pub fn intermediates(&self) -> Intermediates {
        self.state.intermediates()
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidStateTransition {
            operation,
            state: self.stage().as_str(),
        }
    }

    pub fn start<R: RngCore + ?Sized>(&mut self, message: &str, rng: &mut R) -> Result<()> {
        let SessionState::Initialized = self.state else {
            return Err(self.invalid("start"));
        };
        let digest: [u8; 32] = Sha256::digest(message.as_bytes()).into();
        let nonce = u64::from(rng.gen_range(1..=u32::MAX));
        self.state = SessionState::Started { digest, nonce };
        Ok(())
    }

    pub fn phase1(&mut self) -> Result<()> {
        let SessionState::Started { digest, nonce } = self.state else {
            return Err(self.invalid("phase1"));
        };
        // Both factors fit in 32 bits, so the product cannot overflow.
        let phase1_result = nonce * u64::from(self.secret);
        self.state = SessionState::Phase1Done {
            digest,
            nonce,
            phase1_result,
        };
        Ok(())
    }

    pub fn phase2(&mut self) -> Result<()> {
        let SessionState::Phase1Done {
            digest,
            nonce,
            phase1_result,
        } = self.state
        else {
            return Err(self.invalid("phase2"));
        };
        let digest_prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let phase2_result = phase1_result ^ u64::from(digest_prefix);
        self.state = SessionState::Phase2Done {
            digest,
            nonce,
            phase1_result,
            phase2_result,
        };
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<u64> {
        let SessionState::Phase2Done { phase2_result, .. } = self.state else {
            return Err(self.invalid("finalize"));
        };
        let result = phase2_result % RESULT_MODULUS;
        self.state = SessionState::Finalized {
            result,
            intermediates: self.state.intermediates(),
        };
        Ok(result)
    }

    /// Aborts the run and returns every intermediate recorded so far.
    ///
    /// The session keeps its copy as well; nothing is scrubbed.
    pub fn abort(&mut self) -> Result<Intermediates> {
        self.enter_aborted()?;
        Ok(self.intermediates())
    }

    fn enter_aborted(&mut self) -> Result<Stage> {
        let from = self.stage();
        if from.is_terminal() {
            return Err(self.invalid("abort"));
        }
        self.state = SessionState::Aborted {
            from,
            intermediates: self.state.intermediates(),
        };
        Ok(from)
    }

    fn scrub(&mut self) {
        self.secret.zeroize();
        self.state.zeroize_values();
    }
}

/// What a [`HardenedSession`] abort reports instead of the values themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortReport {
    pub aborted_from: Stage,
    pub scrubbed_fields: Vec<&'static str>,
}

/// The staged protocol with erasure on every exit path.
///
/// Abort and finalize zeroize synchronously; dropping the session (including
/// through `?` or a panic) zeroizes whatever is left.
#[derive(Debug)]
pub struct HardenedSession {
    inner: ProtocolSession,
}

impl HardenedSession {
    pub fn new<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self {
            inner: ProtocolSession::new(rng),
        }
    }

    pub fn stage(&self) -> Stage {
        self.inner.stage()
    }

    /// Values still readable from the session.
    pub fn intermediates(&self) -> Intermediates {
        self.inner.intermediates()
    }

    pub fn start<R: RngCore + ?Sized>(&mut self, message: &str, rng: &mut R) -> Result<()> {
        self.inner.start(message, rng)
    }

    pub fn phase1(&mut self) -> Result<()> {
        self.inner.phase1()
    }

    pub fn phase2(&mut self) -> Result<()> {
        self.inner.phase2()
    }

    pub fn finalize(&mut self) -> Result<u64> {
        let result = self.inner.finalize()?;
        self.inner.scrub();
        Ok(result)
    }

    pub fn abort(&mut self) -> Result<AbortReport> {
        let aborted_from = self.inner.enter_aborted()?;
        let scrubbed_fields = self.inner.intermediates().leaked_fields();
        self.inner.scrub();
        Ok(AbortReport {
            aborted_from,
            scrubbed_fields,
        })
    }
}

impl Drop for HardenedSession {
    fn drop(&mut self) {
        self.inner.scrub();
    }
}
