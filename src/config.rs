//! Engine configuration.
//!
//! Everything the engine needs to know up front lives in [`HarmonizerConfig`].
//! The struct is handed to `Harmonizer::new`; later changes travel as
//! `HarmonizerCommand`s and are applied between blocks.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    dsp::envelope::AdsrParams,
    error::{check_range, ConfigError},
};

/// Hard cap on the voice pool. Pan positions stop being distinguishable well
/// before this.
pub const MAX_VOICES: usize = 128;

/// Largest pitchbend range, in semitones, either direction.
pub const MAX_PITCHBEND_RANGE: u8 = 48;

/// Longest quick attack/release fade, in milliseconds.
pub const MAX_QUICK_FADE_MS: u32 = 1_000;

/// Settings for an automatically generated voice (pedal pitch or descant).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomatedVoiceConfig {
    pub enabled: bool,
    /// Pedal pitch: upper threshold (inclusive) for the lowest held key.
    /// Descant: lower threshold (inclusive) for the highest held key.
    pub threshold: u8,
    /// Distance in semitones from the held key.
    pub interval: u8,
}

impl AutomatedVoiceConfig {
    pub const fn pedal_default() -> Self {
        Self {
            enabled: false,
            threshold: 0,
            interval: 12,
        }
    }

    pub const fn descant_default() -> Self {
        Self {
            enabled: false,
            threshold: 127,
            interval: 12,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("automated voice threshold", f32::from(self.threshold), 0.0, 127.0)?;
        check_range("automated voice interval", f32::from(self.interval), 1.0, 127.0)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchDetectionConfig {
    pub min_hz: f32,
    pub max_hz: f32,
    /// Highest normalised difference still accepted as a pitch (0.0 - 1.0).
    /// Lower is stricter.
    pub confidence_threshold: f32,
}

impl Default for PitchDetectionConfig {
    fn default() -> Self {
        Self {
            min_hz: 60.0,
            max_hz: 2_000.0,
            confidence_threshold: 0.15,
        }
    }
}

impl PitchDetectionConfig {
    pub fn validate(&self, sample_rate: f64) -> Result<(), ConfigError> {
        validate_hz_range(self.min_hz, self.max_hz, sample_rate)?;
        check_range("confidence threshold", self.confidence_threshold, 0.0, 1.0)
    }
}

pub(crate) fn validate_hz_range(min_hz: f32, max_hz: f32, sample_rate: f64) -> Result<(), ConfigError> {
    let nyquist = (sample_rate / 2.0) as f32;
    let valid = min_hz.is_finite()
        && max_hz.is_finite()
        && min_hz > 0.0
        && max_hz > min_hz
        && max_hz < nyquist;

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidHzRange { min_hz, max_hz })
    }
}

/// Full engine configuration.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizerConfig {
    pub sample_rate: f64,
    /// Largest block rendered in one go. Longer host blocks are split.
    pub max_block_size: usize,

    /// Size of the voice pool, allocated once.
    pub max_voices: usize,
    /// Voices in service, `1..=max_voices`.
    pub num_voices: usize,

    pub concert_pitch_hz: f32,
    pub notes_per_octave: f32,

    /// 0 - 100 percent of the full stereo field.
    pub stereo_width: u8,
    /// Notes below this are pinned to centre.
    pub lowest_panned_note: u8,

    pub pitch_bend_range_up: u8,
    pub pitch_bend_range_down: u8,
    pub velocity_sensitivity: f32,

    pub adsr: AdsrParams,
    pub adsr_enabled: bool,
    pub quick_attack_ms: u32,
    pub quick_release_ms: u32,

    pub note_stealing: bool,
    pub midi_latch: bool,
    pub interval_latch: bool,
    pub pedal_pitch: AutomatedVoiceConfig,
    pub descant: AutomatedVoiceConfig,

    pub pitch_detection: PitchDetectionConfig,

    pub soft_pedal_gain: f32,
    /// Gain for voices whose key is up but which are still held (sustain,
    /// sostenuto or latch).
    pub released_voice_gain: f32,

    /// Seed for the unpitched-frame period generator.
    pub seed: u64,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000.0,
            max_block_size: 512,
            max_voices: 12,
            num_voices: 12,
            concert_pitch_hz: 440.0,
            notes_per_octave: 12.0,
            stereo_width: 100,
            lowest_panned_note: 0,
            pitch_bend_range_up: 2,
            pitch_bend_range_down: 2,
            velocity_sensitivity: 1.0,
            adsr: AdsrParams::default(),
            adsr_enabled: true,
            quick_attack_ms: 5,
            quick_release_ms: 5,
            note_stealing: true,
            midi_latch: false,
            interval_latch: false,
            pedal_pitch: AutomatedVoiceConfig::pedal_default(),
            descant: AutomatedVoiceConfig::descant_default(),
            pitch_detection: PitchDetectionConfig::default(),
            soft_pedal_gain: 0.65,
            released_voice_gain: 0.4,
            seed: 0x5eed_1a7c,
        }
    }
}

impl HarmonizerConfig {
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    /// Sets both the pool size and the number of voices in service.
    pub fn with_voices(mut self, voices: usize) -> Self {
        self.max_voices = voices;
        self.num_voices = voices;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.max_block_size == 0 {
            return Err(ConfigError::InvalidBlockSize(self.max_block_size));
        }
        if self.max_voices == 0 || self.max_voices > MAX_VOICES {
            return Err(ConfigError::InvalidVoiceCount {
                requested: self.max_voices,
                max: MAX_VOICES,
            });
        }
        validate_num_voices(self.num_voices, self.max_voices)?;
        validate_concert_pitch(self.concert_pitch_hz)?;
        check_range("notes per octave", self.notes_per_octave, 1.0, 128.0)?;
        check_range("stereo width", f32::from(self.stereo_width), 0.0, 100.0)?;
        check_range("lowest panned note", f32::from(self.lowest_panned_note), 0.0, 127.0)?;
        validate_pitch_bend_range(self.pitch_bend_range_up, self.pitch_bend_range_down)?;
        check_range("velocity sensitivity", self.velocity_sensitivity, 0.0, 1.0)?;
        validate_adsr(&self.adsr)?;
        validate_quick_fade(self.quick_attack_ms)?;
        validate_quick_fade(self.quick_release_ms)?;
        self.pedal_pitch.validate()?;
        self.descant.validate()?;
        self.pitch_detection.validate(self.sample_rate)?;
        check_range("soft pedal gain", self.soft_pedal_gain, 0.0, 1.0)?;
        check_range("released voice gain", self.released_voice_gain, 0.0, 1.0)?;
        Ok(())
    }
}

pub(crate) fn validate_num_voices(requested: usize, max: usize) -> Result<(), ConfigError> {
    if requested == 0 || requested > max {
        Err(ConfigError::InvalidVoiceCount { requested, max })
    } else {
        Ok(())
    }
}

pub(crate) fn validate_concert_pitch(hz: f32) -> Result<(), ConfigError> {
    if hz.is_finite() && hz > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidConcertPitch(hz))
    }
}

pub(crate) fn validate_pitch_bend_range(up: u8, down: u8) -> Result<(), ConfigError> {
    let max = f32::from(MAX_PITCHBEND_RANGE);
    check_range("pitchbend range up", f32::from(up), 0.0, max)?;
    check_range("pitchbend range down", f32::from(down), 0.0, max)
}

pub(crate) fn validate_adsr(adsr: &AdsrParams) -> Result<(), ConfigError> {
    check_range("attack", adsr.attack, 0.0, 60.0)?;
    check_range("decay", adsr.decay, 0.0, 60.0)?;
    check_range("sustain", adsr.sustain, 0.0, 1.0)?;
    check_range("release", adsr.release, 0.0, 60.0)
}

pub(crate) fn validate_quick_fade(ms: u32) -> Result<(), ConfigError> {
    check_range("quick fade ms", ms as f32, 1.0, MAX_QUICK_FADE_MS as f32)
}
