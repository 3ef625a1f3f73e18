//! Benchmarks for low-level DSP primitives.

mod amplify;
mod analysis;
mod envelope;
mod shifter;

pub use amplify::bench_amplify;
pub use analysis::bench_analysis;
pub use envelope::bench_envelope;
pub use shifter::bench_shifter;
