//! Gain and stereo placement primitives.

/*
Gain Staging a Harmony Voice
============================

Each voice's pitch-shifted signal passes through a fixed chain of
multiplications before it lands in the stereo mix:

    shifted ──× pan gain (L/R)──× velocity gain──× envelope──× extra gain──► mix

Vocabulary
----------

  gain          A multiplier applied to amplitude. 1.0 is unity, 0.0 silence.

  pan           MIDI-style stereo position, 0 = hard left, 64 = centre,
                127 = hard right. Converted to a pair of linear gains:

                    right = pan / 127
                    left  = 1 - right

                so the two channel gains always sum to one. At centre both
                channels carry ~0.5.

  velocity      Note-on strength in 0.0 - 1.0. Sensitivity blends between
  sensitivity   "velocity ignored" (0.0, every note at unity) and "velocity is
                the gain" (1.0):

                    gain = (1 - velocity) × (1 - sensitivity) + velocity

  extra gain    Soft pedal and "key released but still held" attenuation.
                Both are plain multipliers stacked on top.

All of these are stateless and run once per sample, so they live here as free
functions instead of on the voice.
*/

use crate::dsp::Sample;

/// Multiply a signal by a constant gain factor (in-place).
#[inline]
pub fn apply_gain<S: Sample>(signal: &mut [S], gain: S) {
    for sample in signal.iter_mut() {
        *sample *= gain;
    }
}

/// Add `source × gain` into `dest`, sample by sample.
#[inline]
pub fn add_scaled<S: Sample>(dest: &mut [S], source: &[S], gain: S) {
    debug_assert_eq!(dest.len(), source.len());

    for (d, &s) in dest.iter_mut().zip(source.iter()) {
        *d += s * gain;
    }
}

/// Linear left/right gains for a MIDI pan value (0 - 127, 64 ≈ centre).
#[inline]
pub fn pan_gains(pan: u8) -> (f32, f32) {
    let right = f32::from(pan.min(127)) / 127.0;
    (1.0 - right, right)
}

/// Velocity to gain, blended by `sensitivity` (0.0 ignores velocity).
#[inline]
pub fn velocity_gain(velocity: f32, sensitivity: f32) -> f32 {
    let velocity = velocity.clamp(0.0, 1.0);
    let sensitivity = sensitivity.clamp(0.0, 1.0);
    (1.0 - velocity) * (1.0 - sensitivity) + velocity
}
