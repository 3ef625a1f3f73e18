//! Benchmarks for grain overlap-add resynthesis.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_harmonizer::{analysis::InputAnalyzer, dsp::GrainShifter, PitchDetectionConfig};

use crate::{voiced_input, BLOCK_SIZES, SAMPLE_RATE};

pub fn bench_shifter(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/shifter");

    for &size in BLOCK_SIZES {
        let input = voiced_input(size, 220.0);
        let mut analyzer = InputAnalyzer::<f32>::new(
            SAMPLE_RATE,
            size,
            PitchDetectionConfig::default(),
            0,
        )
        .expect("default detection range is valid");

        // Fill the detector's history so the frame is pitched
        for _ in 0..8 {
            analyzer.analyze(&input);
        }
        let frame = analyzer.frame();

        let mut shifter = GrainShifter::<f32>::new(size, analyzer.max_grain_len());
        let mut out = vec![0.0f32; size];

        for (name, ratio) in [("up_fifth", 1.5), ("down_octave", 0.5), ("unison", 1.0)] {
            group.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| shifter.process(black_box(&frame), black_box(ratio), &mut out))
            });
        }
    }

    group.finish();
}
