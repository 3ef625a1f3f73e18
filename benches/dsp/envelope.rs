//! Benchmarks for the ADSR envelope generator.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_harmonizer::dsp::{AdsrParams, Envelope};

use crate::{BLOCK_SIZES, SAMPLE_RATE};

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");
    let sample_rate = SAMPLE_RATE as f32;

    for &size in BLOCK_SIZES {
        let mut buffer = vec![1.0f32; size];

        // Attack phase (ramping up)
        let mut env = Envelope::new(sample_rate, AdsrParams::new(0.1, 0.1, 0.7, 0.3));
        env.note_on();
        group.bench_with_input(BenchmarkId::new("attack", size), &size, |b, _| {
            b.iter(|| {
                env.apply_to_buffer(black_box(&mut buffer));
            })
        });

        // Sustain phase (holding steady)
        let mut env = Envelope::new(sample_rate, AdsrParams::new(0.001, 0.001, 0.7, 0.3));
        env.note_on();
        // Advance past attack/decay
        for _ in 0..200 {
            env.next_sample();
        }
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| {
                env.apply_to_buffer(black_box(&mut buffer));
            })
        });

        // The quick fade every voice runs on top of the ADSR
        let mut fade = Envelope::new(sample_rate, AdsrParams::quick(15, 15));
        fade.note_on();
        fade.note_off();
        group.bench_with_input(BenchmarkId::new("quick_release", size), &size, |b, _| {
            b.iter(|| {
                fade.apply_to_buffer(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}
