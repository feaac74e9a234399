//! Protocol abort leakage demonstration

use super::*;
use crate::protocol::{AbortReport, HardenedSession, Intermediates, ProtocolSession, Stage};

/// Settings for one protocol-abort run.
#[derive(Debug, Clone)]
pub struct ProtocolAbortConfig {
    pub message: String,
}

impl Default for ProtocolAbortConfig {
    fn default() -> Self {
        Self {
            message: "Test message".to_string(),
        }
    }
}

/// What one aborted session gave away.
#[derive(Debug, Clone, Serialize)]
pub struct AbortLeak {
    pub aborted_from: Stage,
    pub leaked_fields: Vec<&'static str>,
    pub values: Intermediates,
    /// Set when the leaked values were enough to reconstruct the session secret.
    pub recovered_secret: Option<u32>,
    pub secret_matches: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolAbortFinding {
    pub normal_result: u64,
    pub leaks: Vec<AbortLeak>,
    pub hardened: AbortReport,
    pub hardened_leaked_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolAbortAttack {
    pub config: ProtocolAbortConfig,
}

impl ProtocolAbortAttack {
    pub fn new(config: ProtocolAbortConfig) -> Self {
        Self { config }
    }

    fn abort_after(&self, stage: Stage, rng: &mut dyn RngCore) -> Result<AbortLeak> {
        let mut session = ProtocolSession::new(rng);
        session.start(&self.config.message, rng)?;
        if stage != Stage::Started {
            session.phase1()?;
        }
        if stage == Stage::Phase2Done {
            session.phase2()?;
        }

        let values = session.abort()?;
        let recovered_secret = values.recover_secret();
        Ok(AbortLeak {
            aborted_from: stage,
            leaked_fields: values.leaked_fields(),
            values,
            recovered_secret,
            secret_matches: recovered_secret == Some(session.secret()),
        })
    }

    fn hardened_abort(&self, rng: &mut dyn RngCore) -> Result<(AbortReport, Intermediates)> {
        let mut session = HardenedSession::new(rng);
        session.start(&self.config.message, rng)?;
        session.phase1()?;
        session.phase2()?;
        let report = session.abort()?;
        Ok((report, session.intermediates()))
    }
}

impl Attack for ProtocolAbortAttack {
    fn name(&self) -> &'static str {
        "protocol-abort"
    }

    fn run(&self, rng: &mut dyn RngCore) -> Result<Finding> {
        let mut session = ProtocolSession::new(rng);
        session.start(&self.config.message, rng)?;
        session.phase1()?;
        session.phase2()?;
        let normal_result = session.finalize()?;

        let leaks = [Stage::Started, Stage::Phase1Done, Stage::Phase2Done]
            .into_iter()
            .map(|stage| self.abort_after(stage, rng))
            .collect::<Result<Vec<_>>>()?;

        let (hardened, remaining) = self.hardened_abort(rng)?;

        Ok(Finding::ProtocolAbort(ProtocolAbortFinding {
            normal_result,
            leaks,
            hardened,
            hardened_leaked_fields: remaining.leaked_fields(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RESULT_MODULUS;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn run(seed: u64) -> ProtocolAbortFinding {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        match ProtocolAbortAttack::default().run(&mut rng).unwrap() {
            Finding::ProtocolAbort(f) => f,
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn test_every_abort_point_leaks() {
        let finding = run(11);
        assert!(finding.normal_result < RESULT_MODULUS);

        let fields: Vec<_> = finding.leaks.iter().map(|l| l.leaked_fields.clone()).collect();
        assert_eq!(
            fields,
            vec![
                vec!["nonce"],
                vec!["nonce", "phase1_result"],
                vec!["nonce", "phase1_result", "phase2_result"],
            ]
        );
    }

    #[test]
    fn test_secret_recovered_once_phase1_leaks() {
        let finding = run(12);
        assert!(!finding.leaks[0].secret_matches);
        assert!(finding.leaks[1].secret_matches);
        assert!(finding.leaks[2].secret_matches);
    }

    #[test]
    fn test_hardened_session_leaks_nothing() {
        let finding = run(13);
        assert_eq!(finding.hardened.aborted_from, Stage::Phase2Done);
        assert_eq!(finding.hardened.scrubbed_fields.len(), 3);
        assert!(finding.hardened_leaked_fields.is_empty());
    }

    #[test]
    fn test_run_is_reproducible() {
        let a = run(14);
        let b = run(14);
        assert_eq!(a.normal_result, b.normal_result);
        assert_eq!(a.leaks[2].values, b.leaks[2].values);
    }
}
