//! Grain-based pitch shifting.

/*
Pitch-Synchronous Overlap-Add
=============================

The analysis stage cuts the input into grains: two pitch periods of signal,
starting at a zero crossing, one grain per period. Played back end-to-end at
their original spacing (one period apart, overlapping by half) and windowed,
they reconstruct the input.

To change pitch we change the spacing, not the grains:

    input     |----P----|----P----|----P----|        period P, freq f
    grains    [====g0===]
                        [====g1===]
                                  [====g2===]

    ratio 2   [==g0==]                               marks every P/2
    (octave      [==g0==]                            → output period P/2
     up)            [==g1==]                         → output freq 2f
                       [==g1==]

Each output "mark" takes whichever grain's centre sits nearest to it, so the
timbre tracks the input over time while the repetition rate follows the
target pitch.

Vocabulary
----------

  mark          A position in the output where one grain is centred. Marks
                are spaced period / ratio apart and the spacing carries over
                block boundaries, so the output pitch has no seam at the
                block edge.

  window        Hann window, 2 × period long, applied to every grain so
                overlapping grains cross-fade instead of clicking.

  weight        The sum of all window values that landed on an output sample.
                With arbitrary spacing the overlap is uneven (heavy when
                marks crowd together, thin when they spread), so every output
                sample is divided by its weight. A small floor keeps the
                division finite where nothing overlapped.

  tail          A grain centred near the end of a block extends past it. The
                overhanging part stays in the accumulator and is emitted at
                the start of the next block.

The ratio is clamped to three octaves either way. Beyond that the marks are
so sparse (or so dense) that the result is no longer a pitched signal.
*/

use crate::{analysis::AnalysisFrame, dsp::Sample};

/// Floor for the normalisation weight.
pub const WEIGHT_FLOOR: f64 = 1e-4;

pub const MIN_RATIO: f64 = 0.125;
pub const MAX_RATIO: f64 = 8.0;

/// Per-voice overlap-add resynthesiser.
///
/// Buffers are sized once for the largest block and the longest grain; the
/// render path only reads and writes within them.
#[derive(Debug, Clone)]
pub struct GrainShifter<S: Sample> {
    accum: Vec<S>,
    weights: Vec<S>,
    // position of the next synthesis mark, relative to the current block start
    next_mark: f64,
}

impl<S: Sample> GrainShifter<S> {
    pub fn new(max_block_size: usize, max_grain_len: usize) -> Self {
        let len = max_block_size + max_grain_len;
        Self {
            accum: vec![S::ZERO; len],
            weights: vec![S::ZERO; len],
            next_mark: 0.0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.accum.len()
    }

    /// Drop any carried tail and restart the mark grid.
    pub fn reset(&mut self) {
        self.accum.fill(S::ZERO);
        self.weights.fill(S::ZERO);
        self.next_mark = 0.0;
    }

    /// Render `out.len()` samples of the frame's grains, shifted by `ratio`
    /// (target frequency / input frequency). Overwrites `out`.
    pub fn process(&mut self, frame: &AnalysisFrame<'_, S>, ratio: f64, out: &mut [S]) {
        let num_samples = out.len().min(frame.num_samples());
        debug_assert!(num_samples + frame.grain_len() <= self.accum.len());

        let period = frame.period();
        if period == 0 || !ratio.is_finite() || ratio <= 0.0 {
            out.fill(S::ZERO);
            self.advance(num_samples);
            return;
        }

        let ratio = ratio.clamp(MIN_RATIO, MAX_RATIO);
        let spacing = period as f64 / ratio;
        let window = frame.window();

        while self.next_mark < num_samples as f64 {
            let mark = self.next_mark.round() as i64;

            if let Some(grain) = frame.nearest_grain(mark) {
                // centre the grain on the mark
                let start = mark - period as i64;

                for (k, (&sample, &w)) in grain.samples().iter().zip(window).enumerate() {
                    let pos = start + k as i64;
                    if pos < 0 {
                        continue;
                    }
                    let pos = pos as usize;
                    if pos >= self.accum.len() {
                        break;
                    }
                    self.accum[pos] += sample * w;
                    self.weights[pos] += w;
                }
            }

            self.next_mark += spacing;
        }

        let floor = S::from_f64(WEIGHT_FLOOR);
        for (i, o) in out[..num_samples].iter_mut().enumerate() {
            let weight = self.weights[i];
            *o = if weight > floor {
                self.accum[i] / weight
            } else {
                self.accum[i] / floor
            };
        }
        out[num_samples..].fill(S::ZERO);

        self.advance(num_samples);
    }

    fn advance(&mut self, num_samples: usize) {
        let len = self.accum.len();
        let num_samples = num_samples.min(len);

        self.accum.copy_within(num_samples.., 0);
        self.weights.copy_within(num_samples.., 0);
        self.accum[len - num_samples..].fill(S::ZERO);
        self.weights[len - num_samples..].fill(S::ZERO);

        self.next_mark = (self.next_mark - num_samples as f64).max(0.0);
    }
}
