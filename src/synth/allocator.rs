//! Voice allocation and stealing.

use crate::{dsp::Sample, synth::harmonizer::Harmonizer};

impl<S: Sample> Harmonizer<S> {
    /// First idle voice in service, else a voice to steal when `steal` is
    /// set. `None` when nothing can be had.
    pub(super) fn find_free_voice(&self, note: u8, steal: bool) -> Option<usize> {
        let in_service = &self.voices[..self.num_voices];

        if let Some(idx) = in_service.iter().position(|v| !v.is_active()) {
            return Some(idx);
        }
        if !steal {
            return None;
        }

        let idx = self.find_voice_to_steal(note);
        if let Some(idx) = idx {
            tracing::debug!(
                voice = idx,
                stolen = ?self.voices[idx].note(),
                note,
                "stealing voice"
            );
        }
        idx
    }

    /// Pick the voice to steal for `note`, oldest first:
    ///
    ///   1. a voice already playing `note`
    ///   2. a releasing voice
    ///   3. a voice whose key is up
    ///   4. any voice
    ///
    /// The lowest and highest held notes are protected from steps 2 - 4 and
    /// only given up last, the highest before the lowest.
    pub(super) fn find_voice_to_steal(&self, note: u8) -> Option<usize> {
        let in_service = &self.voices[..self.num_voices];

        let holding = || {
            in_service
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_holding_note())
                .filter_map(|(idx, v)| v.note().map(|n| (idx, n)))
        };
        let low = holding().min_by_key(|&(_, n)| n).map(|(idx, _)| idx);
        // a single held note is only protected once
        let top = holding()
            .max_by_key(|&(_, n)| n)
            .map(|(idx, _)| idx)
            .filter(|&idx| Some(idx) != low);

        let oldest = |accept: &dyn Fn(usize) -> bool| {
            in_service
                .iter()
                .enumerate()
                .filter(|(idx, v)| v.is_active() && accept(*idx))
                .min_by_key(|(_, v)| v.note_on_time())
                .map(|(idx, _)| idx)
        };
        let unprotected = |idx: usize| Some(idx) != low && Some(idx) != top;

        oldest(&|idx| in_service[idx].note() == Some(note))
            .or_else(|| oldest(&|idx| unprotected(idx) && in_service[idx].is_releasing()))
            .or_else(|| oldest(&|idx| unprotected(idx) && !in_service[idx].is_key_down()))
            .or_else(|| oldest(&unprotected))
            .or(top)
            .or(low)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::HarmonizerConfig,
        io::midi::{MidiBuffer, MidiEvent},
        synth::{harmonizer::Harmonizer, message::NoCommands},
    };

    const BLOCK: usize = 64;

    fn harmonizer(voices: usize) -> Harmonizer<f32> {
        let config = HarmonizerConfig::default()
            .with_max_block_size(BLOCK)
            .with_voices(voices);
        Harmonizer::new(config).expect("valid config")
    }

    fn send(h: &mut Harmonizer<f32>, events: &[MidiEvent]) -> MidiBuffer {
        let input = [0.0f32; BLOCK];
        let mut l = [0.0f32; BLOCK];
        let mut r = [0.0f32; BLOCK];
        let mut midi = MidiBuffer::with_capacity(32);
        for (i, &event) in events.iter().enumerate() {
            midi.push(i as i64, event);
        }
        h.process(&mut NoCommands, &input, &mut l, &mut r, &mut midi);
        midi
    }

    fn on(key: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            key,
            velocity: 1.0,
        }
    }

    fn off(key: u8) -> MidiEvent {
        MidiEvent::NoteOff {
            channel: 0,
            key,
            velocity: 0.0,
        }
    }

    #[test]
    fn idle_voice_is_preferred() {
        let mut h = harmonizer(3);
        send(&mut h, &[on(60)]);
        assert!(h.find_free_voice(62, true).is_some_and(|idx| !h.voices()[idx].is_active()));
    }

    #[test]
    fn no_steal_without_permission() {
        let mut h = harmonizer(2);
        send(&mut h, &[on(60), on(62)]);
        assert_eq!(h.find_free_voice(64, false), None);
    }

    #[test]
    fn released_voice_goes_before_held_ones() {
        let mut h = harmonizer(4);
        send(&mut h, &[on(40), on(50), on(60), on(70), off(60)]);

        // 60 is tailing off; it is taken before the older held 50
        let idx = h.find_voice_to_steal(80).expect("a voice to steal");
        assert_eq!(h.voices()[idx].note(), Some(60));
    }

    #[test]
    fn lone_note_can_still_be_stolen() {
        let mut h = harmonizer(1);
        send(&mut h, &[on(60)]);
        assert_eq!(h.find_voice_to_steal(72), Some(0));
    }

    #[test]
    fn steal_emits_note_off_for_the_old_note() {
        let mut h = harmonizer(3);
        let out = send(&mut h, &[on(40), on(50), on(60), on(70)]);

        let events: Vec<MidiEvent> = out.iter().map(|e| e.event).collect();
        assert!(events.contains(&MidiEvent::NoteOff {
            channel: 0,
            key: 50,
            velocity: 1.0
        }));
        assert_eq!(h.active_notes(false), vec![40, 60, 70]);
    }
}
