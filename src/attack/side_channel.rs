//! Timing side-channel demonstration

use super::*;
use crate::timing::{analyze, Clock, SystemClock, TimingAnalyzer, Verdict, DEFAULT_UNIT_DELAY};
use std::time::Duration;

/// Settings for one timing run.
#[derive(Debug, Clone)]
pub struct SideChannelConfig {
    pub samples: usize,
    pub unit_delay: Duration,
}

impl Default for SideChannelConfig {
    fn default() -> Self {
        Self {
            samples: 50,
            unit_delay: DEFAULT_UNIT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BitCountTiming {
    pub set_bits: u32,
    pub mean_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideChannelFinding {
    pub sample_count: usize,
    pub unit_delay_seconds: f64,
    pub timings: Vec<BitCountTiming>,
    pub verdict: Verdict,
}

/// Runs the timing demonstration. Each run measures with a fresh copy of
/// `clock`.
#[derive(Debug, Clone)]
pub struct SideChannelAttack<C: Clock = SystemClock> {
    clock: C,
    config: SideChannelConfig,
}

impl SideChannelAttack<SystemClock> {
    pub fn new(config: SideChannelConfig) -> Self {
        Self::with_clock(SystemClock::new(), config)
    }
}

impl Default for SideChannelAttack<SystemClock> {
    fn default() -> Self {
        Self::new(SideChannelConfig::default())
    }
}

impl<C: Clock + Clone> SideChannelAttack<C> {
    pub fn with_clock(clock: C, config: SideChannelConfig) -> Self {
        Self {
            clock,
            config,
        }
    }
}

impl<C: Clock + Clone> Attack for SideChannelAttack<C> {
    fn name(&self) -> &'static str {
        "side-channel"
    }

    fn run(&self, rng: &mut dyn RngCore) -> Result<Finding> {
        let mut analyzer = TimingAnalyzer::new(self.clock.clone(), self.config.unit_delay);
        let samples = analyzer.collect_samples(self.config.samples, rng);
        let report = analyze(&samples);

        Ok(Finding::SideChannel(SideChannelFinding {
            sample_count: report.sample_count,
            unit_delay_seconds: self.config.unit_delay.as_secs_f64(),
            timings: report
                .histogram
                .iter()
                .map(|(&set_bits, mean)| BitCountTiming {
                    set_bits,
                    mean_seconds: mean.as_secs_f64(),
                })
                .collect(),
            verdict: report.verdict,
        }))
    }
}
