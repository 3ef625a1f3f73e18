//! Real-world scenario benchmarks.
//!
//! A voiced input with chords of increasing size held, rendered block by
//! block through the whole engine.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_harmonizer::{Harmonizer, HarmonizerConfig, MidiBuffer, NoCommands};

use crate::{voiced_input, BLOCK_SIZES, SAMPLE_RATE};

const CHORDS: &[&[u8]] = &[
    &[60],
    &[57, 60, 64],
    &[48, 55, 60, 64, 67, 71],
    &[36, 43, 48, 52, 55, 59, 60, 64, 67, 71, 74, 76],
];

pub fn bench_chords(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/chords");

    for &size in BLOCK_SIZES {
        let input = voiced_input(size, 220.0);
        let mut out_l = vec![0.0f32; size];
        let mut out_r = vec![0.0f32; size];
        let mut midi = MidiBuffer::with_capacity(256);

        for chord in CHORDS {
            let config = HarmonizerConfig::default()
                .with_sample_rate(SAMPLE_RATE)
                .with_max_block_size(size)
                .with_voices(12);
            let mut harmonizer =
                Harmonizer::<f32>::new(config).expect("default config is valid");
            harmonizer.play_chord(chord, 0.8, false);

            // Let the detector lock on before timing
            for _ in 0..8 {
                midi.clear();
                harmonizer.process(&mut NoCommands, &input, &mut out_l, &mut out_r, &mut midi);
            }

            group.bench_with_input(
                BenchmarkId::new(format!("{}_voices", chord.len()), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        midi.clear();
                        harmonizer.process(
                            &mut NoCommands,
                            black_box(&input),
                            &mut out_l,
                            &mut out_r,
                            &mut midi,
                        );
                    })
                },
            );
        }
    }

    group.finish();
}
