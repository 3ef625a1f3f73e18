//! Script - sample-accurate chord playback
//!
//! Runs in the audio thread and turns a looping list of chords into timed
//! note events for the harmonizer's MIDI buffer.

use saavy_harmonizer::{MidiBuffer, MidiEvent};

pub struct ChordScript {
    chords: Vec<Vec<u8>>,
    /// Length of one chord in samples
    samples_per_chord: u64,
    /// Samples rendered so far
    position: u64,
    /// Index of the chord that starts next
    next_chord: usize,
    sounding: Vec<u8>,
}

impl ChordScript {
    pub fn new(chords: Vec<Vec<u8>>, seconds_per_chord: f32, sample_rate: f32) -> Self {
        let samples_per_chord = ((seconds_per_chord * sample_rate) as u64).max(1);
        let max_chord = chords.iter().map(Vec::len).max().unwrap_or(0);

        Self {
            chords,
            samples_per_chord,
            position: 0,
            next_chord: 0,
            sounding: Vec::with_capacity(max_chord),
        }
    }

    /// Write the note events falling inside the next `frames` samples.
    pub fn fill_block(&mut self, frames: usize, midi: &mut MidiBuffer) {
        if self.chords.is_empty() {
            return;
        }

        let block_end = self.position + frames as u64;
        // chord changes are on multiples of samples_per_chord
        let mut boundary = self.position.div_ceil(self.samples_per_chord) * self.samples_per_chord;

        while boundary < block_end {
            let offset = (boundary - self.position) as i64;

            for &key in &self.sounding {
                midi.push(offset, MidiEvent::NoteOff { channel: 0, key, velocity: 0.0 });
            }
            self.sounding.clear();

            let chord = &self.chords[self.next_chord];
            for &key in chord {
                midi.push(offset, MidiEvent::NoteOn { channel: 0, key, velocity: 0.8 });
            }
            self.sounding.extend_from_slice(chord);

            tracing::debug!(chord = ?chord, "chord change");

            self.next_chord = (self.next_chord + 1) % self.chords.len();
            boundary += self.samples_per_chord;
        }

        self.position = block_end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chord_changes_land_on_exact_samples() {
        let mut script = ChordScript::new(vec![vec![60, 64], vec![62]], 0.01, 1_000.0);
        let mut midi = MidiBuffer::with_capacity(16);

        // boundaries every 10 samples: 0, 10, 20
        script.fill_block(25, &mut midi);
        let offsets: Vec<i64> = midi.iter().map(|e| e.sample_offset).collect();
        assert_eq!(offsets, vec![0, 0, 10, 10, 10, 20, 20, 20]);
    }
}
