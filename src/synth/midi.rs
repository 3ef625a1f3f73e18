//! MIDI handling for the voice engine: note on/off, pedals, wheel and
//! pressure. Each handled event is mirrored into the outgoing buffer.

use crate::{
    dsp::Sample,
    io::midi::{
        MidiEvent, TimedMidiEvent, CC_SOFT_PEDAL, CC_SOSTENUTO, CC_SUSTAIN,
    },
    synth::{harmonizer::Harmonizer, panning::CENTRE_PAN, voice::NoteStart},
};

/// Controller values at or above this count as "pedal down".
const PEDAL_DOWN: u8 = 64;

impl<S: Sample> Harmonizer<S> {
    pub(super) fn handle_midi_event(&mut self, timed: &TimedMidiEvent) {
        // emitted events follow on from the incoming timestamp
        self.last_timestamp = self
            .last_timestamp
            .max(self.block_offset + timed.sample_offset - 1);
        self.last_channel = timed.event.channel();

        match timed.event {
            MidiEvent::NoteOn { key, velocity, .. } => {
                self.note_on(key, velocity, true);
                self.pitch_collection_changed();
            }
            MidiEvent::NoteOff { key, velocity, .. } => {
                self.note_off(key, velocity, true, true);
                self.pitch_collection_changed();
            }
            MidiEvent::AllNotesOff { .. } | MidiEvent::AllSoundOff { .. } => {
                self.all_notes_off(false);
                self.pitch_collection_changed();
            }
            MidiEvent::PitchWheel { value, .. } => self.handle_pitch_wheel(value),
            MidiEvent::Aftertouch { key, value, .. } => self.handle_aftertouch(key, value),
            MidiEvent::ChannelPressure { value, .. } => self.handle_channel_pressure(value),
            MidiEvent::ControlChange {
                controller, value, ..
            } => self.handle_controller(controller, value),
        }
    }

    /// Start `key`, or claim it if it is already held.
    ///
    /// Only keyboard notes may steal a voice, and only with stealing enabled.
    pub(super) fn note_on(&mut self, key: u8, velocity: f32, is_keyboard: bool) {
        let key = key.min(127);

        if let Some(idx) = self.holding_voice_for(key) {
            self.clear_claims(key);
            if is_keyboard {
                let voice = &mut self.voices[idx];
                voice.set_key_down(true);
                voice.release_automation();
            }
            return;
        }

        let steal = is_keyboard && self.config.note_stealing;
        let idx = self
            .releasing_voice_for(key)
            .or_else(|| self.find_free_voice(key, steal));

        if let Some(idx) = idx {
            if self.voices[idx].is_holding_note() {
                if let Some(stolen) = self.voices[idx].note() {
                    self.emit(MidiEvent::NoteOff {
                        channel: self.last_channel,
                        key: stolen,
                        velocity: 1.0,
                    });
                    self.release_claims_of(idx);
                }
            }
        }

        self.start_voice(idx, key, velocity, is_keyboard);
    }

    /// Put a voice on `key`. `None` means no voice could be found, which
    /// only drops any pedal or descant claim on the key.
    pub(super) fn start_voice(&mut self, idx: Option<usize>, key: u8, velocity: f32, is_keyboard: bool) {
        let Some(idx) = idx else {
            self.clear_claims(key);
            return;
        };

        self.emit(MidiEvent::NoteOn {
            channel: self.last_channel,
            key,
            velocity,
        });

        if key < self.config.lowest_panned_note {
            if self.voices[idx].pan_from_pool() {
                self.panner.pan_val_turned_off(self.voices[idx].pan());
            }
            self.voices[idx].set_pan(CENTRE_PAN, false);
        } else if !self.voices[idx].pan_from_pool() {
            // stolen voices keep the slot they already hold
            self.assign_pool_pan(idx);
        }

        let is_pedal = self.pedal.config.enabled && self.pedal.last_pitch == Some(key);
        let is_descant = self.descant.config.enabled && self.descant.last_pitch == Some(key);

        self.note_on_counter += 1;
        let start = NoteStart {
            note: key,
            velocity,
            velocity_gain: self.velocity.gain(velocity),
            note_on_time: self.note_on_counter,
            output_freq: self.output_freq(key),
            is_keyboard,
            is_pedal,
            is_descant,
        };
        self.voices[idx].start_note(start);
    }

    /// Release `key`.
    ///
    /// A keyboard release is held back while a latch is on, and while a
    /// sustain or sostenuto pedal holds the voice. An automated release
    /// leaves the note sounding if its key is down, dropping only the
    /// automated role.
    pub(super) fn note_off(&mut self, key: u8, velocity: f32, allow_tail_off: bool, is_keyboard: bool) {
        let Some(idx) = self.holding_voice_for(key) else {
            self.clear_claims(key);
            return;
        };

        if is_keyboard {
            let voice = &mut self.voices[idx];
            if voice.is_automated() {
                // the engine owns this note, not the key
                return;
            }
            voice.set_key_down(false);

            if self.latch_on || self.interval_latch_on {
                voice.set_latched(true);
                return;
            }
            if !voice.is_pedal_held() {
                self.stop_voice(idx, velocity, allow_tail_off);
            }
        } else if !self.voices[idx].is_key_down() {
            self.stop_voice(idx, velocity, allow_tail_off);
        } else {
            self.voices[idx].release_automation();
            self.clear_claims(key);
        }
    }

    pub(super) fn stop_voice(&mut self, idx: usize, velocity: f32, allow_tail_off: bool) {
        let Some(note) = self.voices[idx].note() else {
            return;
        };

        self.emit(MidiEvent::NoteOff {
            channel: self.last_channel,
            key: note,
            velocity,
        });
        self.release_claims_of(idx);
        self.voices[idx].stop_note(allow_tail_off);

        // the tail keeps its position but the slot is free for the next note
        if self.voices[idx].pan_from_pool() {
            let pan = self.voices[idx].pan();
            self.panner.pan_val_turned_off(pan);
            self.voices[idx].set_pan(pan, false);
        }
    }

    /// Stop voices that are still holding a note nothing holds any more,
    /// such as a key released under the sustain pedal when the pedal comes
    /// up with the latch on.
    pub(super) fn stop_unheld_voices(&mut self) {
        let mut stopped = false;
        for idx in 0..self.voices.len() {
            if self.voices[idx].is_unheld() {
                self.stop_voice(idx, 1.0, false);
                stopped = true;
            }
        }

        if stopped {
            self.pitch_collection_changed();
        }
    }

    pub(super) fn all_notes_off(&mut self, allow_tail_off: bool) {
        let velocity = if allow_tail_off { 0.0 } else { 1.0 };

        for idx in 0..self.voices.len() {
            self.voices[idx].set_key_down(false);
            if self.voices[idx].is_holding_note() {
                self.stop_voice(idx, velocity, allow_tail_off);
            }
        }
    }

    /// Stop every note whose key is up and that nothing else holds.
    /// Pedal and descant voices are left alone; other automated notes only
    /// when `include_automated` is set.
    pub(super) fn turn_off_all_keyup_notes(&mut self, allow_tail_off: bool, include_automated: bool) {
        let velocity = if allow_tail_off { 0.0 } else { 1.0 };

        for idx in 0..self.voices.len() {
            let voice = &self.voices[idx];
            let stop = voice.is_holding_note()
                && !voice.is_key_down()
                && !voice.is_pedal_held()
                && !voice.is_pedal_voice()
                && !voice.is_descant_voice()
                && (include_automated || !voice.is_automated());

            if stop {
                self.stop_voice(idx, velocity, allow_tail_off);
            }
        }
    }

    fn handle_pitch_wheel(&mut self, value: u8) {
        if !self.bend.wheel_moved(value) {
            return;
        }

        self.emit(MidiEvent::PitchWheel {
            channel: self.last_channel,
            value,
        });
        self.refresh_output_freqs();
    }

    fn handle_aftertouch(&mut self, key: u8, value: u8) {
        self.emit(MidiEvent::Aftertouch {
            channel: self.last_channel,
            key,
            value,
        });

        for voice in self.voices.iter_mut().filter(|v| v.note() == Some(key)) {
            voice.set_aftertouch(value);
        }
    }

    fn handle_channel_pressure(&mut self, value: u8) {
        self.emit(MidiEvent::ChannelPressure {
            channel: self.last_channel,
            value,
        });

        for voice in &mut self.voices {
            voice.set_aftertouch(value);
        }
    }

    fn handle_controller(&mut self, controller: u8, value: u8) {
        match controller {
            CC_SUSTAIN => self.handle_sustain_pedal(value),
            CC_SOSTENUTO => self.handle_sostenuto_pedal(value),
            CC_SOFT_PEDAL => self.handle_soft_pedal(value),
            // legato, mod wheel and the rest are not used
            _ => {}
        }
    }

    fn handle_sustain_pedal(&mut self, value: u8) {
        let down = value >= PEDAL_DOWN;
        if self.sustain_down == down {
            return;
        }

        self.sustain_down = down;
        for voice in &mut self.voices {
            voice.set_sustain_pedal(down);
        }
        self.emit_controller(CC_SUSTAIN, value);

        if !down && !self.latch_on && !self.interval_latch_on {
            self.turn_off_all_keyup_notes(false, false);
            self.pitch_collection_changed();
        }
    }

    fn handle_sostenuto_pedal(&mut self, value: u8) {
        let down = value >= PEDAL_DOWN;
        if self.sostenuto_down == down {
            return;
        }

        self.sostenuto_down = down;
        // sostenuto only catches the notes held at the moment it goes down
        for voice in &mut self.voices {
            let held = down && voice.is_holding_note() && voice.is_key_down();
            voice.set_sostenuto_pedal(held);
        }
        self.emit_controller(CC_SOSTENUTO, value);

        if !down && !self.latch_on && !self.interval_latch_on {
            self.turn_off_all_keyup_notes(false, false);
            self.pitch_collection_changed();
        }
    }

    fn handle_soft_pedal(&mut self, value: u8) {
        let down = value >= PEDAL_DOWN;
        if self.soft_down == down {
            return;
        }

        self.soft_down = down;
        self.emit_controller(CC_SOFT_PEDAL, value);
    }

    fn emit_controller(&mut self, controller: u8, value: u8) {
        self.emit(MidiEvent::ControlChange {
            channel: self.last_channel,
            controller,
            value,
        });
    }

    /// The voice holding `key` (not releasing), if any.
    pub(super) fn holding_voice_for(&self, key: u8) -> Option<usize> {
        self.voices[..self.num_voices]
            .iter()
            .position(|v| v.is_holding_note() && v.note() == Some(key))
    }

    /// Slots out of service are left to finish their fade, never reused.
    fn releasing_voice_for(&self, key: u8) -> Option<usize> {
        self.voices[..self.num_voices]
            .iter()
            .position(|v| v.is_releasing() && v.note() == Some(key))
    }

    /// Forget pedal and descant claims on `key`.
    pub(super) fn clear_claims(&mut self, key: u8) {
        if self.pedal.last_pitch == Some(key) {
            self.pedal.last_pitch = None;
        }
        if self.descant.last_pitch == Some(key) {
            self.descant.last_pitch = None;
        }
    }

    /// Forget the claims held by the voice at `idx`.
    fn release_claims_of(&mut self, idx: usize) {
        if self.voices[idx].is_pedal_voice() {
            self.pedal.last_pitch = None;
        }
        if self.voices[idx].is_descant_voice() {
            self.descant.last_pitch = None;
        }
    }
}
