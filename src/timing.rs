//! Timing side-channel measurement and analysis
//!
//! [`TimingAnalyzer::measure`] does one unit of extra work per set bit of
//! its input, so its running time leaks the Hamming weight. [`analyze`]
//! groups samples by set-bit count and checks whether the mean time rises
//! with it.

use rand::{Rng, RngCore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Bits inspected by [`TimingAnalyzer::measure`].
pub const INPUT_BITS: u32 = 32;

/// Default cost of one unit of work.
pub const DEFAULT_UNIT_DELAY: Duration = Duration::from_millis(1);

/// Time source and work model for measurements.
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
    /// Spends `duration` doing nothing useful.
    fn delay(&mut self, duration: Duration);
}

/// Wall-clock time; delays sleep the current thread.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time that only advances through [`Clock::delay`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualClock {
    elapsed: Duration,
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.elapsed
    }

    fn delay(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}

/// One measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimingSample {
    pub input: u32,
    pub set_bits: u32,
    pub elapsed: Duration,
}

/// Runs the deliberately input-dependent operation.
#[derive(Debug, Clone)]
pub struct TimingAnalyzer<C: Clock> {
    clock: C,
    unit_delay: Duration,
}

impl TimingAnalyzer<SystemClock> {
    pub fn system(unit_delay: Duration) -> Self {
        Self::new(SystemClock::new(), unit_delay)
    }
}

impl<C: Clock> TimingAnalyzer<C> {
    pub fn new(clock: C, unit_delay: Duration) -> Self {
        Self { clock, unit_delay }
    }

    pub fn unit_delay(&self) -> Duration {
        self.unit_delay
    }

    /// Returns the set-bit count of `input` and how long the call took.
    ///
    /// Every set bit costs one `unit_delay`, so the elapsed time never
    /// decreases as the set-bit count grows.
    pub fn measure(&mut self, input: u32) -> (u32, Duration) {
        let start = self.clock.now();

        let mut count = 0;
        for bit in 0..INPUT_BITS {
            if (input >> bit) & 1 == 1 {
                self.clock.delay(self.unit_delay);
                count += 1;
            }
        }

        let elapsed = self.clock.now().saturating_sub(start);
        (count, elapsed)
    }

    /// Lazily measures `sample_count` random inputs drawn from `rng`.
    pub fn collect<'a, R: RngCore + ?Sized>(
        &'a mut self,
        sample_count: usize,
        rng: &'a mut R,
    ) -> Samples<'a, C, R> {
        Samples {
            analyzer: self,
            rng,
            remaining: sample_count,
        }
    }

    /// Measures `sample_count` random inputs and returns them all.
    pub fn collect_samples<R: RngCore + ?Sized>(
        &mut self,
        sample_count: usize,
        rng: &mut R,
    ) -> Vec<TimingSample> {
        self.collect(sample_count, rng).collect()
    }
}

/// Finite, single-pass iterator of fresh measurements.
pub struct Samples<'a, C: Clock, R: RngCore + ?Sized> {
    analyzer: &'a mut TimingAnalyzer<C>,
    rng: &'a mut R,
    remaining: usize,
}

impl<C: Clock, R: RngCore + ?Sized> Iterator for Samples<'_, C, R> {
    type Item = TimingSample;

    fn next(&mut self) -> Option<TimingSample> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let input: u32 = self.rng.gen();
        let (set_bits, elapsed) = self.analyzer.measure(input);
        Some(TimingSample {
            input,
            set_bits,
            elapsed,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<C: Clock, R: RngCore + ?Sized> ExactSizeIterator for Samples<'_, C, R> {}

/// Mean elapsed time per set-bit count, ascending by count.
pub type TimingHistogram = BTreeMap<u32, Duration>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Mean time never decreases as the set-bit count grows.
    SideChannelDetected,
    NoClearCorrelation,
    /// Fewer than two distinct set-bit counts were observed.
    InsufficientData,
}

impl Verdict {
    pub fn is_detected(&self) -> bool {
        matches!(self, Verdict::SideChannelDetected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingReport {
    pub sample_count: usize,
    pub histogram: TimingHistogram,
    pub verdict: Verdict,
}

/// Groups samples by set-bit count and decides whether time tracks it.
pub fn analyze(samples: &[TimingSample]) -> TimingReport {
    let mut groups: BTreeMap<u32, (Duration, u32)> = BTreeMap::new();
    for sample in samples {
        let (total, count) = groups.entry(sample.set_bits).or_default();
        *total += sample.elapsed;
        *count += 1;
    }

    let histogram: TimingHistogram = groups
        .into_iter()
        .map(|(bits, (total, count))| (bits, total / count))
        .collect();

    let verdict = if histogram.len() < 2 {
        Verdict::InsufficientData
    } else {
        let means: Vec<Duration> = histogram.values().copied().collect();
        if means.windows(2).all(|pair| pair[0] <= pair[1]) {
            Verdict::SideChannelDetected
        } else {
            Verdict::NoClearCorrelation
        }
    };

    TimingReport {
        sample_count: samples.len(),
        histogram,
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn sample(set_bits: u32, micros: u64) -> TimingSample {
        TimingSample {
            input: 0,
            set_bits,
            elapsed: Duration::from_micros(micros),
        }
    }

    #[test]
    fn test_measure_counts_set_bits() {
        let mut analyzer = TimingAnalyzer::new(VirtualClock::default(), DEFAULT_UNIT_DELAY);
        assert_eq!(analyzer.measure(0), (0, Duration::ZERO));
        assert_eq!(analyzer.measure(0b1011), (3, DEFAULT_UNIT_DELAY * 3));
        assert_eq!(analyzer.measure(u32::MAX), (32, DEFAULT_UNIT_DELAY * 32));
    }

    #[test]
    fn test_measure_system_clock_lower_bound() {
        let unit = Duration::from_micros(200);
        let mut analyzer = TimingAnalyzer::system(unit);
        let (bits, elapsed) = analyzer.measure(0b1111);
        assert_eq!(bits, 4);
        assert!(elapsed >= unit * 4);
    }

    #[test]
    fn test_collect_is_lazy_and_finite() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut analyzer = TimingAnalyzer::new(VirtualClock::default(), DEFAULT_UNIT_DELAY);

        let mut samples = analyzer.collect(3, &mut rng);
        assert_eq!(samples.len(), 3);
        assert!(samples.next().is_some());
        assert_eq!(samples.len(), 2);
        assert_eq!(samples.by_ref().count(), 2);
        assert!(samples.next().is_none());
    }

    #[test]
    fn test_collect_samples_reproducible() {
        let mut analyzer = TimingAnalyzer::new(VirtualClock::default(), DEFAULT_UNIT_DELAY);
        let a = analyzer.collect_samples(20, &mut ChaCha20Rng::seed_from_u64(5));
        let b = analyzer.collect_samples(20, &mut ChaCha20Rng::seed_from_u64(5));
        assert_eq!(a, b);
        assert!(a.iter().all(|s| s.set_bits == s.input.count_ones()));
    }

    #[test]
    fn test_seeded_samples_are_monotonic() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let mut analyzer = TimingAnalyzer::new(VirtualClock::default(), DEFAULT_UNIT_DELAY);
        let samples = analyzer.collect_samples(50, &mut rng);

        let report = analyze(&samples);
        assert_eq!(report.sample_count, 50);
        assert!(report.histogram.len() >= 2);
        assert_eq!(report.verdict, Verdict::SideChannelDetected);
        for (bits, mean) in &report.histogram {
            assert_eq!(*mean, DEFAULT_UNIT_DELAY * *bits);
        }
    }

    #[test]
    fn test_analyze_averages_groups() {
        let report = analyze(&[sample(1, 100), sample(1, 300), sample(2, 500)]);
        assert_eq!(report.histogram[&1], Duration::from_micros(200));
        assert_eq!(report.histogram[&2], Duration::from_micros(500));
        assert_eq!(report.verdict, Verdict::SideChannelDetected);
    }

    #[test]
    fn test_analyze_no_correlation() {
        let report = analyze(&[sample(1, 500), sample(2, 100), sample(3, 900)]);
        assert_eq!(report.verdict, Verdict::NoClearCorrelation);
    }

    #[test]
    fn test_analyze_insufficient_data() {
        assert_eq!(analyze(&[]).verdict, Verdict::InsufficientData);
        let report = analyze(&[sample(4, 100), sample(4, 120)]);
        assert_eq!(report.verdict, Verdict::InsufficientData);
        assert_eq!(report.histogram.len(), 1);
    }

    #[test]
    fn test_analyze_equal_means_count_as_monotonic() {
        let report = analyze(&[sample(1, 100), sample(2, 100)]);
        assert_eq!(report.verdict, Verdict::SideChannelDetected);
    }
}
