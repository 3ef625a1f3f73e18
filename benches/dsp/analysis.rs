//! Benchmarks for pitch detection and grain extraction.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_harmonizer::{analysis::InputAnalyzer, PitchDetectionConfig};

use crate::{voiced_input, BLOCK_SIZES, SAMPLE_RATE};

pub fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/analysis");
    let max_block = *BLOCK_SIZES.last().unwrap_or(&512);

    for &size in BLOCK_SIZES {
        let pitched = voiced_input(size, 196.0);
        let noise: Vec<f32> = (0..size)
            .map(|i| ((i * 7919 % 211) as f32 / 105.5) - 1.0)
            .collect();

        let mut analyzer = InputAnalyzer::<f32>::new(
            SAMPLE_RATE,
            max_block,
            PitchDetectionConfig::default(),
            0,
        )
        .expect("default detection range is valid");

        group.bench_with_input(BenchmarkId::new("pitched", size), &size, |b, _| {
            b.iter(|| analyzer.analyze(black_box(&pitched)).num_samples())
        });

        // Unpitched input takes the random-period path
        group.bench_with_input(BenchmarkId::new("unpitched", size), &size, |b, _| {
            b.iter(|| analyzer.analyze(black_box(&noise)).num_samples())
        });
    }

    group.finish();
}
