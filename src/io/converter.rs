//! Pitch, pitchbend and velocity conversions.

use crate::{dsp::amplify::velocity_gain, io::midi::PITCH_WHEEL_CENTRE};

/// MIDI note the concert pitch refers to (A4).
pub const ROOT_NOTE: f32 = 69.0;

/// MIDI note number <-> frequency in Hz for a tuning reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchConverter {
    concert_pitch_hz: f32,
    notes_per_octave: f32,
}

impl Default for PitchConverter {
    fn default() -> Self {
        Self::new(440.0, 12.0)
    }
}

impl PitchConverter {
    pub fn new(concert_pitch_hz: f32, notes_per_octave: f32) -> Self {
        debug_assert!(concert_pitch_hz > 0.0 && notes_per_octave > 0.0);
        Self {
            concert_pitch_hz,
            notes_per_octave,
        }
    }

    pub fn concert_pitch_hz(&self) -> f32 {
        self.concert_pitch_hz
    }

    pub fn set_concert_pitch_hz(&mut self, hz: f32) {
        self.concert_pitch_hz = hz;
    }

    pub fn notes_per_octave(&self) -> f32 {
        self.notes_per_octave
    }

    /// Fractional MIDI note to Hz.
    pub fn mtof(&self, note: f32) -> f32 {
        self.concert_pitch_hz * 2.0_f32.powf((note - ROOT_NOTE) / self.notes_per_octave)
    }

    /// Hz to fractional MIDI note. Non-positive input maps to `f32::NEG_INFINITY`.
    pub fn ftom(&self, hz: f32) -> f32 {
        if hz <= 0.0 {
            return f32::NEG_INFINITY;
        }
        ROOT_NOTE + self.notes_per_octave * (hz / self.concert_pitch_hz).log2()
    }

    /// Nearest whole MIDI note for a frequency, if it lands in 0 - 127.
    pub fn nearest_note(&self, hz: f32) -> Option<i32> {
        let note = self.ftom(hz).round();
        (0.0..=127.0).contains(&note).then_some(note as i32)
    }
}

/// Maps the coarse pitch wheel to a semitone offset, linearly per side.
///
/// 64 is no bend, 127 bends up by `range_up` and 0 bends down by `range_down`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchBendTracker {
    range_up: f32,
    range_down: f32,
    last_value: u8,
}

impl Default for PitchBendTracker {
    fn default() -> Self {
        Self::new(2, 2)
    }
}

impl PitchBendTracker {
    pub fn new(range_up: u8, range_down: u8) -> Self {
        Self {
            range_up: f32::from(range_up),
            range_down: f32::from(range_down),
            last_value: PITCH_WHEEL_CENTRE,
        }
    }

    pub fn set_range(&mut self, range_up: u8, range_down: u8) {
        self.range_up = f32::from(range_up);
        self.range_down = f32::from(range_down);
    }

    /// Records a wheel value. Returns `false` if it did not change.
    pub fn wheel_moved(&mut self, value: u8) -> bool {
        let value = value.min(127);
        if value == self.last_value {
            return false;
        }
        self.last_value = value;
        true
    }

    pub fn last_value(&self) -> u8 {
        self.last_value
    }

    pub fn reset(&mut self) {
        self.last_value = PITCH_WHEEL_CENTRE;
    }

    /// Current bend in semitones.
    pub fn semitones(&self) -> f32 {
        let centre = f32::from(PITCH_WHEEL_CENTRE);
        let value = f32::from(self.last_value);

        if value > centre {
            (value - centre) / (127.0 - centre) * self.range_up
        } else {
            (value - centre) / centre * self.range_down
        }
    }

    /// Bent pitch for a MIDI note, as a fractional note number.
    pub fn apply(&self, note: u8) -> f32 {
        f32::from(note) + self.semitones()
    }
}

/// Velocity to gain with adjustable sensitivity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityCurve {
    sensitivity: f32,
}

impl Default for VelocityCurve {
    fn default() -> Self {
        Self { sensitivity: 1.0 }
    }
}

impl VelocityCurve {
    pub fn new(sensitivity: f32) -> Self {
        Self {
            sensitivity: sensitivity.clamp(0.0, 1.0),
        }
    }

    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity.clamp(0.0, 1.0);
    }

    pub fn gain(&self, velocity: f32) -> f32 {
        velocity_gain(velocity, self.sensitivity)
    }
}
