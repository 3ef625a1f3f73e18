//! Polyphonic MIDI-driven harmonizer.
//!
//! One audio input is analysed for pitch, cut into pitch-synchronous grains
//! and resynthesised by a pool of voices, one per MIDI note, into a stereo
//! output. See [`Harmonizer`] for the per-block entry point.

pub mod analysis; // Pitch detection and grain analysis of the input
pub mod config;
pub mod dsp;
pub mod error;
pub mod io;
pub mod synth; // Voice management and polyphony

pub use config::{AutomatedVoiceConfig, HarmonizerConfig, PitchDetectionConfig};
pub use error::ConfigError;
pub use io::{MidiBuffer, MidiEvent, TimedMidiEvent};
#[cfg(feature = "rtrb")]
pub use synth::{command_channel, HarmonizerHandle};
pub use synth::{CommandReceiver, Harmonizer, HarmonizerCommand, NoCommands};

pub(crate) const MIN_TIME: f32 = 1.0 / 48_000.0;
