//! Notes the engine plays on its own: pedal pitch, descant, MIDI latch and
//! interval latch.

/*
Automated Harmony
=================

After every change to the set of held notes the engine re-evaluates its
automated voices (`pitch_collection_changed`):

  pedal pitch   lowest held key L, if L <= threshold:  play L - interval
  descant       highest held key H, if H >= threshold: play H + interval

Only one pedal and one descant note exist at a time. When the target moves,
the previous automated voice is retuned in place (note-off for the old pitch,
note-on for the new one on the same voice) unless a key now holds it.

  MIDI latch      keyboard note-offs are held back until the latch opens.

  interval latch  the chord is remembered as semitone offsets from the
                  detected input note. When the input moves to another note
                  the chord is replayed at the same offsets from it.
*/

use crate::{
    config::AutomatedVoiceConfig, dsp::Sample, io::midi::MidiEvent, synth::harmonizer::Harmonizer,
};

/// State of the pedal pitch or descant generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomatedVoice {
    pub config: AutomatedVoiceConfig,
    /// The note currently played for this role.
    pub last_pitch: Option<u8>,
}

impl AutomatedVoice {
    pub fn new(config: AutomatedVoiceConfig) -> Self {
        Self {
            config,
            last_pitch: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Pedal,
    Descant,
}

impl<S: Sample> Harmonizer<S> {
    /// Bring the automated voices in line with the held notes.
    pub(super) fn pitch_collection_changed(&mut self) {
        if self.pedal.config.enabled {
            self.apply_automated_voice(Role::Pedal);
        }
        if self.descant.config.enabled {
            self.apply_automated_voice(Role::Descant);
        }
        if self.interval_latch_on {
            self.capture_intervals();
            if let Some(reference) = self.interval_reference {
                self.replay_intervals(reference);
            }
        }
    }

    fn apply_automated_voice(&mut self, role: Role) {
        let state = self.automated(role);

        // lowest (pedal) or highest (descant) note with its key down
        let held = self
            .voices
            .iter()
            .filter(|v| v.is_active() && v.is_key_down())
            .filter_map(|v| v.note().map(|note| (note, v.velocity())));
        let extreme = match role {
            Role::Pedal => held.min_by_key(|&(note, _)| note),
            Role::Descant => held.max_by_key(|&(note, _)| note),
        };

        let in_range = |note: u8| match role {
            Role::Pedal => note <= state.config.threshold,
            Role::Descant => note >= state.config.threshold,
        };

        let Some((held_note, velocity)) = extreme.filter(|&(note, _)| in_range(note)) else {
            self.turn_off_automated(role);
            return;
        };

        let interval = i32::from(state.config.interval);
        let candidate = match role {
            Role::Pedal => i32::from(held_note) - interval,
            Role::Descant => i32::from(held_note) + interval,
        };

        if state.last_pitch.map(i32::from) == Some(candidate) {
            return;
        }

        let candidate = match u8::try_from(candidate) {
            Ok(note) if note <= 127 && !self.is_pitch_active(note, false) => note,
            _ => {
                self.turn_off_automated(role);
                return;
            }
        };

        let previous = self.voices.iter().position(|v| {
            v.is_holding_note()
                && !v.is_key_down()
                && match role {
                    Role::Pedal => v.is_pedal_voice(),
                    Role::Descant => v.is_descant_voice(),
                }
        });

        match previous {
            Some(idx) => {
                // retune the existing automated voice in place
                if let Some(old) = self.voices[idx].note() {
                    self.emit(MidiEvent::NoteOff {
                        channel: self.last_channel,
                        key: old,
                        velocity: 1.0,
                    });
                }
                self.automated_mut(role).last_pitch = Some(candidate);
                self.start_voice(Some(idx), candidate, velocity, false);
            }
            None => {
                self.turn_off_automated(role);
                self.automated_mut(role).last_pitch = Some(candidate);
                self.note_on(candidate, velocity, false);
            }
        }
    }

    fn turn_off_automated(&mut self, role: Role) {
        if let Some(pitch) = self.automated(role).last_pitch {
            self.note_off(pitch, 1.0, false, false);
            self.automated_mut(role).last_pitch = None;
        }
    }

    fn automated(&self, role: Role) -> AutomatedVoice {
        match role {
            Role::Pedal => self.pedal,
            Role::Descant => self.descant,
        }
    }

    fn automated_mut(&mut self, role: Role) -> &mut AutomatedVoice {
        match role {
            Role::Pedal => &mut self.pedal,
            Role::Descant => &mut self.descant,
        }
    }

    pub(super) fn set_pedal_pitch(&mut self, config: AutomatedVoiceConfig) {
        self.set_automated(Role::Pedal, config);
    }

    pub(super) fn set_descant(&mut self, config: AutomatedVoiceConfig) {
        self.set_automated(Role::Descant, config);
    }

    fn set_automated(&mut self, role: Role, config: AutomatedVoiceConfig) {
        let was_enabled = self.automated(role).config.enabled;
        self.automated_mut(role).config = config;

        if !config.enabled {
            if was_enabled {
                self.turn_off_automated(role);
            }
            return;
        }

        // a new interval or threshold moves the note; force a re-evaluation
        self.apply_automated_voice(role);
    }

    pub(super) fn set_midi_latch(&mut self, on: bool, allow_tail_off: bool) {
        if self.latch_on == on {
            return;
        }

        self.latch_on = on;
        self.config.midi_latch = on;
        if on {
            return;
        }

        // the interval latch keeps holding what it latched
        if !self.interval_latch_on {
            self.turn_off_all_keyup_notes(allow_tail_off, false);
        }
        self.pitch_collection_changed();
    }

    pub(super) fn set_interval_latch(&mut self, on: bool, allow_tail_off: bool) {
        if self.interval_latch_on == on {
            return;
        }

        self.interval_latch_on = on;
        self.config.interval_latch = on;

        if on {
            self.capture_intervals();
            return;
        }

        self.intervals.clear();
        self.interval_reference = None;
        if !self.latch_on {
            self.turn_off_all_keyup_notes(allow_tail_off, true);
        }
    }

    /// Record the held notes as offsets from the current input note.
    /// Captures nothing until a pitched block has been seen.
    fn capture_intervals(&mut self) {
        self.intervals.clear();
        self.interval_reference = None;

        let Some(reference) = self.last_input_note else {
            return;
        };

        let mut notes = std::mem::take(&mut self.notes_scratch);
        self.active_notes_into(&mut notes, false);
        self.intervals
            .extend(notes.iter().map(|&note| i32::from(note) - reference));
        self.notes_scratch = notes;

        if !self.intervals.is_empty() {
            self.interval_reference = Some(reference);
        }
    }

    fn replay_intervals(&mut self, reference: i32) {
        if self.intervals.is_empty() {
            return;
        }

        let mut chord = std::mem::take(&mut self.chord_scratch);
        chord.clear();
        chord.extend(
            self.intervals
                .iter()
                .map(|&interval| reference + interval)
                .filter_map(|note| u8::try_from(note).ok())
                .filter(|&note| note <= 127),
        );

        self.interval_reference = Some(reference);
        if !chord.is_empty() {
            self.play_chord_inner(&chord, 1.0, false, true);
        }
        self.chord_scratch = chord;
    }

    /// Follow the detected input: when it settles on a new note, replay the
    /// latched intervals from there.
    pub(super) fn track_input_pitch(&mut self) {
        let detected = self.analyzer.detected_freq();
        if detected > 0.0 {
            if let Some(note) = self.converter.nearest_note(detected) {
                self.last_input_note = Some(note);
            }
        }

        if !self.interval_latch_on {
            return;
        }

        if let (Some(now), Some(then)) = (self.last_input_note, self.interval_reference) {
            if now != then {
                self.last_timestamp = self.last_timestamp.max(self.block_offset - 1);
                self.replay_intervals(now);
            }
        }
    }

    /// Make `desired` the set of sounding notes: notes not in it are released
    /// and missing ones are started as automated notes. An empty chord stops
    /// everything.
    pub fn play_chord(&mut self, desired: &[u8], velocity: f32, allow_tail_off_of_old: bool) {
        self.play_chord_inner(desired, velocity, allow_tail_off_of_old, false);
    }

    fn play_chord_inner(
        &mut self,
        desired: &[u8],
        velocity: f32,
        allow_tail_off_of_old: bool,
        from_interval_latch: bool,
    ) {
        if desired.is_empty() {
            self.all_notes_off(allow_tail_off_of_old);
            return;
        }

        let off_velocity = if allow_tail_off_of_old { 0.0 } else { 1.0 };
        let mut current = std::mem::take(&mut self.notes_scratch);
        self.active_notes_into(&mut current, false);

        for &note in current.iter().filter(|note| !desired.contains(note)) {
            self.note_off(note, off_velocity, allow_tail_off_of_old, false);
        }
        for &note in desired.iter().filter(|note| !current.contains(note)) {
            self.note_on(note, velocity, false);
        }

        self.notes_scratch = current;

        if !from_interval_latch {
            self.pitch_collection_changed();
        }
    }
}
