//! Per-block analysis of the input signal.
//!
//! Every block, [`InputAnalyzer::analyze`] estimates the input pitch, picks
//! the period used to cut grains, finds the grain onsets and stores the
//! grains in a fixed pool. Voices then read the result through an
//! [`AnalysisFrame`].
//!
//! All buffers are sized in [`InputAnalyzer::new`]; `analyze` never
//! allocates.

pub mod grain;
pub mod grain_extractor;
pub mod pitch_detector;

pub use grain::{AnalysisGrain, GrainPool};
pub use grain_extractor::GrainExtractor;
pub use pitch_detector::PitchDetector;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{config::PitchDetectionConfig, dsp::Sample, error::ConfigError};

/// Read-only view of the current block's analysis.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisFrame<'a, S: Sample> {
    input_freq: f32,
    period: usize,
    pitched: bool,
    num_samples: usize,
    grains: &'a [AnalysisGrain<S>],
    window: &'a [S],
}

impl<'a, S: Sample> AnalysisFrame<'a, S> {
    /// Input frequency used for shift ratios. For unpitched frames this is
    /// the frequency of the randomly chosen period.
    pub fn input_freq(&self) -> f32 {
        self.input_freq
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn is_pitched(&self) -> bool {
        self.pitched
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn grain_len(&self) -> usize {
        self.period * 2
    }

    /// Hann window, one grain long.
    pub fn window(&self) -> &'a [S] {
        self.window
    }

    pub fn grains(&self) -> impl Iterator<Item = &'a AnalysisGrain<S>> {
        self.grains.iter().filter(|g| g.is_in_use())
    }

    /// The grain whose centre is closest to `position`.
    pub fn nearest_grain(&self, position: i64) -> Option<&'a AnalysisGrain<S>> {
        self.grains()
            .min_by_key(|g| (g.centre() as i64 - position).unsigned_abs())
    }
}

pub struct InputAnalyzer<S: Sample> {
    sample_rate: f64,
    max_block_size: usize,

    detector: PitchDetector,
    extractor: GrainExtractor,
    pool: GrainPool<S>,

    // most recent input, detector-window long
    history: Vec<S>,
    // this block's input, polarity-flipped for some unpitched frames
    block: Vec<S>,
    window: Vec<S>,
    rng: SmallRng,

    input_freq: f32,
    period: usize,
    pitched: bool,
    num_samples: usize,
}

impl<S: Sample> InputAnalyzer<S> {
    pub fn new(
        sample_rate: f64,
        max_block_size: usize,
        detection: PitchDetectionConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        if max_block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(max_block_size));
        }

        let detector = PitchDetector::new(sample_rate, detection)?;
        let max_period = detector.capacity_max_period();
        let min_period = detector.capacity_min_period();

        // one onset per period window, plus a trailing partial window
        let max_onsets = max_block_size.div_ceil(min_period) + 1;

        tracing::debug!(
            sample_rate,
            max_block_size,
            max_period,
            grains = max_onsets,
            "input analyzer sized"
        );

        Ok(Self {
            sample_rate,
            max_block_size,
            extractor: GrainExtractor::new(max_onsets),
            pool: GrainPool::new(max_onsets, 2 * max_period),
            history: vec![S::ZERO; detector.window_len()],
            block: vec![S::ZERO; max_block_size],
            window: Vec::with_capacity(2 * max_period),
            rng: SmallRng::seed_from_u64(seed),
            detector,
            input_freq: 0.0,
            period: 0,
            pitched: false,
            num_samples: 0,
        })
    }

    /// Longest grain any frame can produce.
    pub fn max_grain_len(&self) -> usize {
        2 * self.detector.capacity_max_period()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn set_hz_range(&mut self, min_hz: f32, max_hz: f32) -> Result<(), ConfigError> {
        self.detector.set_hz_range(min_hz, max_hz)
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        self.detector.set_confidence_threshold(threshold)
    }

    pub fn detector(&self) -> &PitchDetector {
        &self.detector
    }

    /// Detected input frequency of the last frame, `0.0` when unpitched.
    pub fn detected_freq(&self) -> f32 {
        if self.pitched {
            self.input_freq
        } else {
            0.0
        }
    }

    /// Analyse one block. Blocks longer than the prepared size are truncated.
    pub fn analyze(&mut self, input: &[S]) -> AnalysisFrame<'_, S> {
        debug_assert!(input.len() <= self.max_block_size);
        let input = &input[..input.len().min(self.max_block_size)];
        let num_samples = input.len();

        self.push_history(input);

        let freq = self.detector.detect(&self.history);
        self.pitched = freq > 0.0;

        let block = &mut self.block[..num_samples];
        block.copy_from_slice(input);

        if self.pitched {
            // detection tolerates a little past the range; the grain pool does not
            self.period = ((self.sample_rate / freq as f64).round() as usize).clamp(
                self.detector.capacity_min_period(),
                self.detector.capacity_max_period(),
            );
            self.input_freq = freq;
        } else {
            let low = self.detector.min_period();
            let high = self.detector.max_period().min(self.max_block_size / 2).max(low);
            self.period = self.rng.random_range(low..=high);
            self.input_freq = (self.sample_rate / self.period as f64) as f32;

            if self.rng.random_bool(0.5) {
                for sample in block.iter_mut() {
                    *sample = -*sample;
                }
            }
        }

        self.update_window();

        self.pool.begin_frame();
        let onsets = self.extractor.find_onsets(&self.block[..num_samples], self.period);
        for &onset in onsets {
            let stored = self.pool.store(&self.block[..num_samples], onset, self.period);
            debug_assert!(stored, "grain pool sized below onsets per block");
        }

        self.num_samples = num_samples;
        self.frame()
    }

    /// The most recent analysis.
    pub fn frame(&self) -> AnalysisFrame<'_, S> {
        AnalysisFrame {
            input_freq: self.input_freq,
            period: self.period,
            pitched: self.pitched,
            num_samples: self.num_samples,
            grains: self.pool.grains(),
            window: &self.window,
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(S::ZERO);
        self.block.fill(S::ZERO);
        self.pool.clear();
        self.extractor.clear();
        self.window.clear();
        self.input_freq = 0.0;
        self.period = 0;
        self.pitched = false;
        self.num_samples = 0;
    }

    fn push_history(&mut self, input: &[S]) {
        let len = self.history.len();
        if input.len() >= len {
            self.history.copy_from_slice(&input[input.len() - len..]);
        } else {
            self.history.copy_within(input.len().., 0);
            self.history[len - input.len()..].copy_from_slice(input);
        }
    }

    fn update_window(&mut self) {
        let len = 2 * self.period;
        if self.window.len() == len {
            return;
        }

        debug_assert!(len <= self.window.capacity());
        self.window.clear();
        self.window.extend((0..len).map(|k| {
            let phase = 2.0 * std::f64::consts::PI * k as f64 / len as f64;
            S::from_f64(0.5 - 0.5 * phase.cos())
        }));
    }
}
