//! Benchmarks for the harmonizer's DSP primitives and full-engine scenarios.
//!
//! Run with: cargo bench
//!
//! Everything here runs on the audio thread, so it has to finish well inside
//! the block deadline.
//!
//! Reference timing at 48kHz sample rate:
//!   - 64 samples  = 1.33ms deadline
//!   - 128 samples = 2.67ms deadline
//!   - 256 samples = 5.33ms deadline
//!   - 512 samples = 10.67ms deadline
//!
//! Benchmark groups:
//!   - dsp/*        Gain helpers, envelopes, grain shifting, pitch analysis
//!   - scenarios/*  Whole blocks through the harmonizer with chords held

use criterion::{criterion_group, criterion_main};

mod dsp;
mod scenarios;

/// Common buffer sizes used in audio applications.
pub const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512];

/// Sample rate every benchmark renders at.
pub const SAMPLE_RATE: f64 = 48_000.0;

/// Sine input at `hz` with a touch of second harmonic.
pub fn voiced_input(len: usize, hz: f64) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let phase = std::f64::consts::TAU * hz * i as f64 / SAMPLE_RATE;
            (0.5 * phase.sin() + 0.1 * (2.0 * phase).sin()) as f32
        })
        .collect()
}

criterion_group!(
    benches,
    // Low-level DSP primitives
    dsp::bench_amplify,
    dsp::bench_envelope,
    dsp::bench_analysis,
    dsp::bench_shifter,
    // Real-world scenarios
    scenarios::bench_chords,
);
criterion_main!(benches);
