//! MIDI events as the engine sees them.
//!
//! Velocities are normalised to 0.0 - 1.0. Raw short messages convert in and
//! out through [`MidiEvent::from_bytes`] and [`MidiEvent::to_bytes`].

pub const CC_SUSTAIN: u8 = 0x40;
pub const CC_SOSTENUTO: u8 = 0x42;
pub const CC_SOFT_PEDAL: u8 = 0x43;
pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Pitch wheel centre on the 0 - 127 scale used by the engine.
pub const PITCH_WHEEL_CENTRE: u8 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEvent {
    NoteOn { channel: u8, key: u8, velocity: f32 },
    NoteOff { channel: u8, key: u8, velocity: f32 },
    /// Coarse pitch wheel, 0 - 127 with 64 as centre.
    PitchWheel { channel: u8, value: u8 },
    Aftertouch { channel: u8, key: u8, value: u8 },
    ChannelPressure { channel: u8, value: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    AllNotesOff { channel: u8 },
    AllSoundOff { channel: u8 },
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::PitchWheel { channel, .. }
            | MidiEvent::Aftertouch { channel, .. }
            | MidiEvent::ChannelPressure { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::AllNotesOff { channel }
            | MidiEvent::AllSoundOff { channel } => channel,
        }
    }

    /// Decode a short channel-voice message. Channels are 0-based.
    ///
    /// A note-on with velocity 0 decodes as a note-off. CC 120 and CC 123
    /// decode as [`MidiEvent::AllSoundOff`] and [`MidiEvent::AllNotesOff`].
    /// Anything else (system messages, program change, truncated data)
    /// returns `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0F;
        let data1 = bytes.get(1).map(|b| b & 0x7F);
        let data2 = bytes.get(2).map(|b| b & 0x7F);

        let event = match status & 0xF0 {
            0x80 => MidiEvent::NoteOff {
                channel,
                key: data1?,
                velocity: velocity_from_u7(data2?),
            },
            0x90 => {
                let key = data1?;
                let velocity = data2?;
                if velocity == 0 {
                    MidiEvent::NoteOff {
                        channel,
                        key,
                        velocity: 0.0,
                    }
                } else {
                    MidiEvent::NoteOn {
                        channel,
                        key,
                        velocity: velocity_from_u7(velocity),
                    }
                }
            }
            0xA0 => MidiEvent::Aftertouch {
                channel,
                key: data1?,
                value: data2?,
            },
            0xB0 => match (data1?, data2?) {
                (CC_ALL_SOUND_OFF, _) => MidiEvent::AllSoundOff { channel },
                (CC_ALL_NOTES_OFF, _) => MidiEvent::AllNotesOff { channel },
                (controller, value) => MidiEvent::ControlChange {
                    channel,
                    controller,
                    value,
                },
            },
            0xD0 => MidiEvent::ChannelPressure {
                channel,
                value: data1?,
            },
            0xE0 => {
                // keep the 7 most significant bits of the 14-bit value
                let lsb = u16::from(data1?);
                let msb = u16::from(data2?);
                let value14 = (msb << 7) | lsb;
                MidiEvent::PitchWheel {
                    channel,
                    value: (value14 >> 7) as u8,
                }
            }
            _ => return None,
        };

        Some(event)
    }

    /// Encode as a short message. Returns the bytes and how many are used.
    pub fn to_bytes(&self) -> ([u8; 3], usize) {
        let ch = self.channel() & 0x0F;
        match *self {
            MidiEvent::NoteOn { key, velocity, .. } => {
                // velocity 0 would read back as a note-off
                ([0x90 | ch, key & 0x7F, velocity_to_u7(velocity).max(1)], 3)
            }
            MidiEvent::NoteOff { key, velocity, .. } => {
                ([0x80 | ch, key & 0x7F, velocity_to_u7(velocity)], 3)
            }
            MidiEvent::PitchWheel { value, .. } => {
                let value14 = u16::from(value & 0x7F) << 7;
                ([0xE0 | ch, (value14 & 0x7F) as u8, (value14 >> 7) as u8], 3)
            }
            MidiEvent::Aftertouch { key, value, .. } => ([0xA0 | ch, key & 0x7F, value & 0x7F], 3),
            MidiEvent::ChannelPressure { value, .. } => ([0xD0 | ch, value & 0x7F, 0], 2),
            MidiEvent::ControlChange {
                controller, value, ..
            } => ([0xB0 | ch, controller & 0x7F, value & 0x7F], 3),
            MidiEvent::AllNotesOff { .. } => ([0xB0 | ch, CC_ALL_NOTES_OFF, 0], 3),
            MidiEvent::AllSoundOff { .. } => ([0xB0 | ch, CC_ALL_SOUND_OFF, 0], 3),
        }
    }
}

fn velocity_from_u7(value: u8) -> f32 {
    f32::from(value.min(127)) / 127.0
}

fn velocity_to_u7(velocity: f32) -> u8 {
    (velocity.clamp(0.0, 1.0) * 127.0).round() as u8
}

/// An event positioned within a block, in samples from the block start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMidiEvent {
    pub sample_offset: i64,
    pub event: MidiEvent,
}

impl TimedMidiEvent {
    pub fn new(sample_offset: i64, event: MidiEvent) -> Self {
        Self {
            sample_offset,
            event,
        }
    }
}

/// Block-scoped list of timed events with capacity reserved up front.
///
/// `push` past the reserved capacity drops the event instead of growing, so
/// the buffer never allocates on the render thread.
#[derive(Debug, Clone, Default)]
pub struct MidiBuffer {
    events: Vec<TimedMidiEvent>,
}

impl MidiBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Returns `false` if the buffer is full and the event was dropped.
    pub fn push(&mut self, sample_offset: i64, event: MidiEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            return false;
        }
        self.events.push(TimedMidiEvent::new(sample_offset, event));
        true
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Stable in-place sort by offset; events at the same offset keep their
    /// order. Hosts usually deliver events in order, so this is a single
    /// pass in the common case.
    pub fn sort(&mut self) {
        for i in 1..self.events.len() {
            let mut j = i;
            while j > 0 && self.events[j - 1].sample_offset > self.events[j].sample_offset {
                self.events.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimedMidiEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[TimedMidiEvent] {
        &self.events
    }

    /// Append every event of `other` whose offset is in `range`, re-based to
    /// the start of the range. Used when a host block is split into chunks.
    pub fn extend_from_range(&mut self, other: &MidiBuffer, range: std::ops::Range<i64>) {
        let start = range.start;
        for e in other.iter().filter(|e| range.contains(&e.sample_offset)) {
            self.push(e.sample_offset - start, e.event);
        }
    }
}

impl<'a> IntoIterator for &'a MidiBuffer {
    type Item = &'a TimedMidiEvent;
    type IntoIter = std::slice::Iter<'a, TimedMidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
