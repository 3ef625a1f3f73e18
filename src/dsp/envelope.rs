use crate::{dsp::Sample, MIN_TIME};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Voice Envelopes
===============

Every harmony voice carries two linear ADSR envelopes:

  main          The user-facing amplitude contour (attack, decay, sustain,
                release). Can be switched off, in which case the voice is a
                plain on/off gate.

  quick release A short fixed fade used when a voice has to stop *now*
                (voice steal, all-notes-off, pedal release). Its attack
                doubles as a short fade-in, so a voice that starts mid-signal
                does not click either.

Both run the same state machine:

    Idle --note_on--> Attack --level=1--> Decay --level=S--> Sustain
      ^                  |                  |                   |
      |                  +------ note_off --+-------------------+
      |                                     v
      +---------------- level=0 ------- Release

note_off releases from whatever level the envelope currently holds, so a note
cut short during its attack ramps down from there instead of jumping.

Times are in seconds, sustain is a ratio 0.0 - 1.0. Every time is clamped to
at least one sample at 48 kHz so the per-sample increments stay finite.
*/

/// ADSR settings. Times in seconds, sustain as a 0.0 - 1.0 level.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParams {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl AdsrParams {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Fade used for forced stops: short attack, full sustain, short release.
    pub fn quick(attack_ms: u32, release_ms: u32) -> Self {
        Self {
            attack: attack_ms as f32 / 1000.0,
            decay: 0.005,
            sustain: 1.0,
            release: release_ms as f32 / 1000.0,
        }
    }

    fn sanitized(self) -> Self {
        Self {
            attack: self.attack.max(MIN_TIME),
            decay: self.decay.max(MIN_TIME),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: self.release.max(MIN_TIME),
        }
    }
}

impl Default for AdsrParams {
    fn default() -> Self {
        Self::new(0.035, 0.06, 0.8, 0.01)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    params: AdsrParams,
    sample_rate: f32,

    stage: EnvelopeState,
    level: f32,

    decay_start_level: f32,

    // snapshotted at note_off so the ramp lands exactly on zero
    release_start_level: f32,
    release_total_samples: u32,
    release_elapsed_samples: u32,
}

impl Envelope {
    pub fn new(sample_rate: f32, params: AdsrParams) -> Self {
        Self {
            params: params.sanitized(),
            sample_rate: sample_rate.max(1.0),
            stage: EnvelopeState::Idle,
            level: 0.0,
            decay_start_level: 0.0,
            release_start_level: 0.0,
            release_total_samples: 1,
            release_elapsed_samples: 0,
        }
    }

    pub fn set_params(&mut self, params: AdsrParams) {
        self.params = params.sanitized();
    }

    pub fn params(&self) -> AdsrParams {
        self.params
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        debug_assert!(sample_rate > 0.0);
        self.sample_rate = sample_rate.max(1.0);
    }

    /// Gate high: start the attack from zero.
    pub fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeState::Attack;
        self.release_elapsed_samples = 0;
    }

    /// Gate high without dropping to zero: re-enter the attack from the
    /// current level. Used when a sounding voice changes note.
    pub fn retrigger(&mut self) {
        self.stage = EnvelopeState::Attack;
        self.release_elapsed_samples = 0;
    }

    /// Gate low: ramp down from the current level.
    pub fn note_off(&mut self) {
        if self.stage == EnvelopeState::Idle {
            return;
        }

        self.release_start_level = self.level;
        self.release_total_samples = (self.params.release * self.sample_rate).round().max(1.0) as u32;
        self.release_elapsed_samples = 0;
        self.stage = EnvelopeState::Release;
    }

    /// Advance by one sample and return the new level.
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeState::Idle => {
                self.level = 0.0;
            }

            EnvelopeState::Attack => {
                self.level += 1.0 / (self.params.attack * self.sample_rate);

                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.decay_start_level = 1.0;
                    self.stage = EnvelopeState::Decay;
                }
            }

            EnvelopeState::Decay => {
                let target = self.params.sustain;
                let total_drop = self.decay_start_level - target;
                self.level -= total_drop / (self.params.decay * self.sample_rate);

                if self.level <= target {
                    self.level = target;
                    self.stage = EnvelopeState::Sustain;
                }
            }

            EnvelopeState::Sustain => {
                self.level = self.params.sustain;
            }

            EnvelopeState::Release => {
                let progress =
                    self.release_elapsed_samples as f32 / self.release_total_samples as f32;
                self.level = (self.release_start_level * (1.0 - progress)).max(0.0);

                self.release_elapsed_samples = self.release_elapsed_samples.saturating_add(1);

                if self.release_elapsed_samples >= self.release_total_samples {
                    self.level = 0.0;
                    self.stage = EnvelopeState::Idle;
                }
            }
        }

        debug_assert!((0.0..=1.0).contains(&self.level));
        self.level
    }

    /// Multiply a buffer by the envelope, advancing it one sample per frame.
    pub fn apply_to_buffer<S: Sample>(&mut self, buffer: &mut [S]) {
        for sample in buffer.iter_mut() {
            *sample *= S::from_f32(self.next_sample());
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeState::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeState::Release
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeState::Idle;
        self.level = 0.0;
        self.decay_start_level = 0.0;
        self.release_elapsed_samples = 0;
        self.release_start_level = 0.0;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn state(&self) -> EnvelopeState {
        self.stage
    }
}
