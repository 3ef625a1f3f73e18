//! Low-level DSP primitives used by the voices.
//!
//! These components are allocation-free after construction and realtime-safe,
//! so they can be embedded directly inside voice structs.

/// Gain, pan and velocity helpers.
pub mod amplify;
/// Attack/decay/sustain/release envelope generator.
pub mod envelope;
/// Numeric trait the engine is generic over.
pub mod sample;
/// Pitch-synchronous overlap-add pitch shifter.
pub mod shifter;

pub use envelope::{AdsrParams, Envelope, EnvelopeState};
pub use sample::Sample;
pub use shifter::GrainShifter;
