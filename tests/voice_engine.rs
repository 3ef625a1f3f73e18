use proptest::prelude::*;
use saavy_harmonizer::{
    io::PitchConverter, AutomatedVoiceConfig, Harmonizer, HarmonizerCommand, HarmonizerConfig,
    MidiBuffer, MidiEvent, NoCommands,
};

const BLOCK: usize = 128;
const SUSTAIN: u8 = 64;

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
    let mut midi = MidiBuffer::with_capacity(64);
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
        velocity: 0.8,
    }
}

fn off(key: u8) -> MidiEvent {
    MidiEvent::NoteOff {
        channel: 0,
        key,
        velocity: 0.0,
    }
}

fn sustain(down: bool) -> MidiEvent {
    MidiEvent::ControlChange {
        channel: 0,
        controller: SUSTAIN,
        value: if down { 127 } else { 0 },
    }
}

fn pedal_pitch(threshold: u8, interval: u8) -> HarmonizerCommand {
    HarmonizerCommand::SetPedalPitch(AutomatedVoiceConfig {
        enabled: true,
        threshold,
        interval,
    })
}

fn voices_playing(h: &Harmonizer<f32>, note: u8) -> usize {
    h.voices()
        .iter()
        .filter(|v| v.is_holding_note() && v.note() == Some(note))
        .count()
}

#[test]
fn full_pool_steals_the_oldest_inner_note() {
    let mut h = harmonizer(4);
    send(&mut h, &[on(40), on(50), on(60), on(70)]);
    let out = send(&mut h, &[on(80)]);

    assert_eq!(h.active_notes(false), vec![40, 60, 70, 80]);
    let events: Vec<MidiEvent> = out.iter().map(|e| e.event).collect();
    assert_eq!(
        events[0],
        MidiEvent::NoteOff {
            channel: 0,
            key: 50,
            velocity: 1.0
        }
    );
}

#[test]
fn full_pool_without_stealing_drops_the_note() {
    let mut h = harmonizer(2);
    h.apply(HarmonizerCommand::SetNoteStealing(false))
        .expect("valid command");
    send(&mut h, &[on(60), on(64)]);
    let out = send(&mut h, &[on(67)]);

    assert_eq!(h.active_notes(false), vec![60, 64]);
    assert!(out.is_empty());
}

#[test]
fn pedal_pitch_follows_low_keys_under_the_threshold() {
    let mut h = harmonizer(6);
    h.apply(pedal_pitch(48, 12)).expect("valid pedal pitch");

    send(&mut h, &[on(47)]);
    assert_eq!(h.active_notes(false), vec![35, 47]);
    assert_eq!(h.pedal_pitch(), Some(35));

    let mut h = harmonizer(6);
    h.apply(pedal_pitch(48, 12)).expect("valid pedal pitch");

    send(&mut h, &[on(49)]);
    assert_eq!(h.active_notes(false), vec![49]);
    assert_eq!(h.pedal_pitch(), None);
}

#[test]
fn pedal_pitch_stops_when_the_key_is_released() {
    let mut h = harmonizer(6);
    h.apply(pedal_pitch(48, 12)).expect("valid pedal pitch");

    send(&mut h, &[on(45)]);
    assert_eq!(h.active_notes(false), vec![33, 45]);

    send(&mut h, &[off(45)]);
    assert!(h.active_notes(false).is_empty());
    assert_eq!(h.pedal_pitch(), None);
}

#[test]
fn midi_latch_holds_released_keys() {
    let mut h = harmonizer(6);
    let latch = |on| HarmonizerCommand::SetMidiLatch {
        on,
        allow_tail_off: false,
    };

    h.apply(latch(true)).expect("valid command");
    send(&mut h, &[on(60), on(64), off(60), off(64), on(67)]);
    assert_eq!(h.active_notes(false), vec![60, 64, 67]);

    // switching it on again changes nothing
    h.apply(latch(true)).expect("valid command");
    assert!(h.is_midi_latch_on());
    assert_eq!(h.active_notes(false), vec![60, 64, 67]);

    // only the released keys stop
    h.apply(latch(false)).expect("valid command");
    assert_eq!(h.active_notes(false), vec![67]);
}

#[test]
fn repeated_note_on_keeps_a_single_voice() {
    let mut h = harmonizer(6);
    send(&mut h, &[on(60)]);
    send(&mut h, &[on(60)]);

    assert_eq!(voices_playing(&h, 60), 1);
    assert_eq!(h.active_notes(true), vec![60]);
}

#[test]
fn sustain_release_turns_off_key_up_notes() {
    let mut h = harmonizer(6);
    send(&mut h, &[sustain(true), on(60), on(67), off(60)]);
    assert_eq!(h.active_notes(false), vec![60, 67]);

    send(&mut h, &[sustain(false)]);
    assert_eq!(h.active_notes(false), vec![67]);
}

#[test]
fn freed_pan_is_handed_out_again() {
    let mut h = harmonizer(4);
    let order = h.panner().assigning_order().to_vec();

    send(&mut h, &[on(60), on(62)]);
    let pan_of = |h: &Harmonizer<f32>, note: u8| {
        h.voices()
            .iter()
            .find(|v| v.is_active() && v.note() == Some(note))
            .map(|v| v.pan())
    };
    assert_eq!(pan_of(&h, 60), Some(order[0]));
    assert_eq!(pan_of(&h, 62), Some(order[1]));

    // the stopped note gives its pan back while it is still tailing off
    send(&mut h, &[off(60)]);
    assert_eq!(h.active_notes(false), vec![62]);

    send(&mut h, &[on(64)]);
    assert_eq!(pan_of(&h, 64), Some(order[0]));
}

#[test]
fn shrinking_then_replaying_a_removed_note_stays_in_service() {
    let mut h = harmonizer(4);
    send(&mut h, &[on(60), on(62), on(64), on(66)]);

    h.apply(HarmonizerCommand::SetNumVoices(3))
        .expect("valid command");
    send(&mut h, &[on(66)]);

    assert!(h.voices()[3..].iter().all(|v| !v.is_holding_note()));
    assert_eq!(h.active_notes(false).len(), 3);

    // 66 is held once; the slot out of service only plays out its fade
    assert_eq!(voices_playing(&h, 66), 1);
}

#[test]
fn notes_survive_a_frequency_round_trip() {
    let converter = PitchConverter::default();
    for note in 0..=127 {
        let hz = converter.mtof(note as f32);
        assert_eq!(converter.nearest_note(hz), Some(note));
    }
}

#[derive(Debug, Clone)]
enum Step {
    On(u8),
    Off(u8),
    Sustain(bool),
    SetVoices(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (48u8..72).prop_map(Step::On),
        3 => (48u8..72).prop_map(Step::Off),
        1 => any::<bool>().prop_map(Step::Sustain),
        1 => (1usize..=MAX_VOICES).prop_map(Step::SetVoices),
    ]
}

const MAX_VOICES: usize = 6;

impl Step {
    fn event(&self) -> Option<MidiEvent> {
        match *self {
            Step::On(key) => Some(on(key)),
            Step::Off(key) => Some(off(key)),
            Step::Sustain(down) => Some(sustain(down)),
            Step::SetVoices(_) => None,
        }
    }
}

proptest! {
    #[test]
    fn held_pitches_and_pool_pans_stay_unique_as_the_pool_resizes(
        blocks in prop::collection::vec(prop::collection::vec(step(), 0..6), 1..20)
    ) {
        let mut h = harmonizer(MAX_VOICES);

        for block in &blocks {
            for step in block {
                if let Step::SetVoices(n) = *step {
                    h.apply(HarmonizerCommand::SetNumVoices(n)).expect("in range");
                }
            }
            let events: Vec<MidiEvent> = block.iter().filter_map(Step::event).collect();
            send(&mut h, &events);

            let in_service = h.num_voices();
            prop_assert!(
                h.voices()[in_service..].iter().all(|v| !v.is_holding_note()),
                "a voice out of service holds a note"
            );

            let mut held: Vec<u8> = h
                .voices()
                .iter()
                .filter(|v| v.is_holding_note())
                .filter_map(|v| v.note())
                .collect();
            prop_assert!(held.len() <= in_service);
            let count = held.len();
            held.sort_unstable();
            held.dedup();
            prop_assert_eq!(held.len(), count, "a pitch is held by two voices");

            let mut pans: Vec<u8> = h
                .voices()
                .iter()
                .filter(|v| v.is_active() && v.pan_from_pool())
                .map(|v| v.pan())
                .collect();
            let count = pans.len();
            pans.sort_unstable();
            pans.dedup();
            prop_assert_eq!(pans.len(), count, "two voices share a pool pan");
        }
    }

    #[test]
    fn active_voices_never_exceed_the_pool(
        keys in prop::collection::vec(0u8..128, 1..40),
        voices in 1usize..8,
    ) {
        let mut h = harmonizer(voices);
        let events: Vec<MidiEvent> = keys.iter().map(|&k| on(k)).collect();
        for chunk in events.chunks(8) {
            send(&mut h, chunk);
        }
        prop_assert!(h.voices().iter().filter(|v| v.is_active()).count() <= voices);
    }
}
