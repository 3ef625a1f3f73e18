//! Fundamental-frequency estimation for the input signal.
//!
//! YIN-style: difference function, cumulative mean normalisation, absolute
//! threshold, then parabolic interpolation around the chosen lag. The
//! detector reports `0.0` for silence and for frames whose best candidate
//! does not clear the confidence threshold.

use crate::{
    config::{validate_hz_range, PitchDetectionConfig},
    dsp::Sample,
    error::{check_range, ConfigError},
};

/// Below this mean-square level a frame counts as silence.
const SILENCE_POWER: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct PitchDetector {
    sample_rate: f64,
    min_hz: f32,
    max_hz: f32,
    threshold: f32,

    min_period: usize,
    max_period: usize,

    // limits fixed when the buffers were sized
    capacity_min_period: usize,
    capacity_max_period: usize,

    // d(τ), normalised in place to d'(τ)
    difference: Vec<f32>,
}

impl PitchDetector {
    pub fn new(sample_rate: f64, config: PitchDetectionConfig) -> Result<Self, ConfigError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(sample_rate));
        }
        config.validate(sample_rate)?;

        let (min_period, max_period) = periods_for(sample_rate, config.min_hz, config.max_hz);

        Ok(Self {
            sample_rate,
            min_hz: config.min_hz,
            max_hz: config.max_hz,
            threshold: config.confidence_threshold,
            min_period,
            max_period,
            capacity_min_period: min_period,
            capacity_max_period: max_period,
            difference: vec![0.0; max_period + 1],
        })
    }

    /// Narrow or move the detection range. Fails if the new range would need
    /// longer periods, or more grains per block, than were prepared.
    pub fn set_hz_range(&mut self, min_hz: f32, max_hz: f32) -> Result<(), ConfigError> {
        validate_hz_range(min_hz, max_hz, self.sample_rate)?;

        let (min_period, max_period) = periods_for(self.sample_rate, min_hz, max_hz);

        if max_period > self.capacity_max_period {
            return Err(ConfigError::ExceedsPreparedCapacity {
                what: "longest pitch period",
                required: max_period,
                prepared: self.capacity_max_period,
            });
        }
        if min_period < self.capacity_min_period {
            return Err(ConfigError::ExceedsPreparedCapacity {
                what: "shortest pitch period",
                required: min_period,
                prepared: self.capacity_min_period,
            });
        }

        self.min_hz = min_hz;
        self.max_hz = max_hz;
        self.min_period = min_period;
        self.max_period = max_period;
        Ok(())
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        check_range("confidence threshold", threshold, 0.0, 1.0)?;
        self.threshold = threshold;
        Ok(())
    }

    pub fn hz_range(&self) -> (f32, f32) {
        (self.min_hz, self.max_hz)
    }

    pub fn min_period(&self) -> usize {
        self.min_period
    }

    pub fn max_period(&self) -> usize {
        self.max_period
    }

    pub fn capacity_min_period(&self) -> usize {
        self.capacity_min_period
    }

    pub fn capacity_max_period(&self) -> usize {
        self.capacity_max_period
    }

    /// Samples needed to resolve the lowest frequency in range.
    pub fn window_len(&self) -> usize {
        self.capacity_max_period * 2
    }

    /// Estimate the fundamental of `signal` in Hz, or `0.0` if unpitched.
    pub fn detect<S: Sample>(&mut self, signal: &[S]) -> f32 {
        let max_lag = self.max_period.min(signal.len() / 2);
        if max_lag <= self.min_period {
            return 0.0;
        }

        let power = signal.iter().map(|s| s.to_f64() * s.to_f64()).sum::<f64>() / signal.len() as f64;
        if power < SILENCE_POWER {
            return 0.0;
        }

        self.compute_difference(signal, max_lag);
        self.normalise(max_lag);

        let Some(lag) = self.first_dip_below_threshold(max_lag) else {
            return 0.0;
        };

        let refined = self.parabolic_interpolation(lag, max_lag);
        if refined <= 0.0 {
            return 0.0;
        }

        let frequency = (self.sample_rate / refined) as f32;
        if frequency < self.min_hz * 0.95 || frequency > self.max_hz * 1.05 {
            return 0.0;
        }
        frequency
    }

    fn compute_difference<S: Sample>(&mut self, signal: &[S], max_lag: usize) {
        let window = signal.len() - max_lag;

        self.difference[0] = 0.0;
        for tau in 1..=max_lag {
            let mut sum = 0.0f64;
            for j in 0..window {
                let delta = signal[j].to_f64() - signal[j + tau].to_f64();
                sum += delta * delta;
            }
            self.difference[tau] = sum as f32;
        }
    }

    fn normalise(&mut self, max_lag: usize) {
        self.difference[0] = 1.0;

        let mut running_sum = 0.0f32;
        for tau in 1..=max_lag {
            running_sum += self.difference[tau];
            self.difference[tau] = if running_sum > 0.0 {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    fn first_dip_below_threshold(&self, max_lag: usize) -> Option<usize> {
        let d = &self.difference;
        let mut tau = self.min_period.max(2);

        while tau <= max_lag {
            if d[tau] < self.threshold {
                // walk down to the bottom of this dip
                while tau < max_lag && d[tau + 1] < d[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    fn parabolic_interpolation(&self, tau: usize, max_lag: usize) -> f64 {
        if tau < 1 || tau >= max_lag {
            return tau as f64;
        }

        let s0 = self.difference[tau - 1] as f64;
        let s1 = self.difference[tau] as f64;
        let s2 = self.difference[tau + 1] as f64;

        let denominator = s0 - 2.0 * s1 + s2;
        if denominator.abs() < f64::EPSILON {
            return tau as f64;
        }

        let shift = 0.5 * (s0 - s2) / denominator;
        tau as f64 + shift.clamp(-1.0, 1.0)
    }
}

fn periods_for(sample_rate: f64, min_hz: f32, max_hz: f32) -> (usize, usize) {
    let min_period = (sample_rate / max_hz as f64).floor().max(1.0) as usize;
    let max_period = (sample_rate / min_hz as f64).ceil() as usize;
    (min_period, max_period.max(min_period + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f64 = 48_000.0;

    fn sine(freq: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / SAMPLE_RATE).sin() as f32)
            .collect()
    }

    fn detector() -> PitchDetector {
        PitchDetector::new(SAMPLE_RATE, PitchDetectionConfig::default()).expect("valid config")
    }

    #[test]
    fn detects_sine_frequencies() {
        let mut detector = detector();

        for freq in [110.0, 220.0, 440.0, 880.0] {
            let signal = sine(freq, detector.window_len());
            let detected = detector.detect(&signal) as f64;
            assert!(
                (detected - freq).abs() / freq < 0.01,
                "expected {freq} Hz, got {detected} Hz"
            );
        }
    }

    #[test]
    fn silence_is_unpitched() {
        let mut detector = detector();
        let signal = vec![0.0f64; detector.window_len()];
        assert_eq!(detector.detect(&signal), 0.0);
    }

    #[test]
    fn short_frame_is_unpitched() {
        let mut detector = detector();
        let signal = sine(440.0, 16);
        assert_eq!(detector.detect(&signal), 0.0);
    }

    #[test]
    fn noise_like_signal_is_unpitched() {
        use rand::{rngs::SmallRng, Rng, SeedableRng};

        let mut detector = detector();
        let mut rng = SmallRng::seed_from_u64(3);
        let signal: Vec<f32> = (0..detector.window_len())
            .map(|_| rng.random_range(-1.0..1.0))
            .collect();

        assert_eq!(detector.detect(&signal), 0.0);
    }

    #[test]
    fn range_cannot_outgrow_prepared_buffers() {
        let mut detector = detector();

        assert!(detector.set_hz_range(100.0, 1_000.0).is_ok());
        assert_eq!(detector.hz_range(), (100.0, 1_000.0));

        assert!(matches!(
            detector.set_hz_range(30.0, 1_000.0),
            Err(ConfigError::ExceedsPreparedCapacity { .. })
        ));
        assert!(matches!(
            detector.set_hz_range(100.0, 900.0).and(detector.set_hz_range(100.0, 5_000.0)),
            Err(ConfigError::ExceedsPreparedCapacity { .. })
        ));
        assert!(detector.set_hz_range(500.0, 100.0).is_err());
    }
}
