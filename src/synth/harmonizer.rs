//! The voice engine.
//!
//! A [`Harmonizer`] owns a fixed pool of [`Voice`]s, the input analysis and
//! all MIDI-derived state. A block is processed as:
//!
//!   1. drain queued [`HarmonizerCommand`]s
//!   2. apply the block's MIDI in timestamp order (`midi.rs`), which may
//!      start automated pedal, descant and interval-latch notes
//!      (`automation.rs`) and steal voices (`allocator.rs`)
//!   3. analyse the input and render every voice into the stereo output
//!
//! Every note the engine starts or stops is mirrored into an outgoing MIDI
//! buffer, which replaces the host's incoming events when the block returns.
//!
//! Nothing here allocates after [`Harmonizer::new`] / [`Harmonizer::prepare`].

use crate::{
    analysis::InputAnalyzer,
    config::HarmonizerConfig,
    dsp::{envelope::AdsrParams, Sample},
    error::ConfigError,
    io::{
        midi::{MidiBuffer, MidiEvent},
        PitchBendTracker, PitchConverter, VelocityCurve,
    },
    synth::{
        automation::AutomatedVoice,
        message::{CommandLimits, CommandReceiver, HarmonizerCommand},
        panning::{PanningManager, CENTRE_PAN},
        voice::{Voice, VoiceRender},
    },
};

/// Incoming events kept per host block. Extra events are dropped.
pub const MIDI_EVENT_CAPACITY: usize = 512;

pub struct Harmonizer<S: Sample> {
    pub(super) config: HarmonizerConfig,

    pub(super) voices: Vec<Voice<S>>,
    // only voices[..num_voices] are handed out; the rest finish their tails
    pub(super) num_voices: usize,

    pub(super) analyzer: InputAnalyzer<S>,
    pub(super) panner: PanningManager,
    pub(super) converter: PitchConverter,
    pub(super) bend: PitchBendTracker,
    pub(super) velocity: VelocityCurve,

    pub(super) pedal: AutomatedVoice,
    pub(super) descant: AutomatedVoice,

    pub(super) latch_on: bool,
    pub(super) interval_latch_on: bool,
    pub(super) intervals: Vec<i32>,
    // input note the intervals were last played against
    pub(super) interval_reference: Option<i32>,
    pub(super) last_input_note: Option<i32>,

    pub(super) sustain_down: bool,
    pub(super) sostenuto_down: bool,
    pub(super) soft_down: bool,

    pub(super) note_on_counter: u64,
    pub(super) last_channel: u8,
    // timestamp of the last emitted event, in host block samples
    pub(super) last_timestamp: i64,
    pub(super) block_offset: i64,

    pub(super) aggregate: MidiBuffer,
    incoming: MidiBuffer,
    chunk_midi: MidiBuffer,
    pub(super) chord_scratch: Vec<u8>,
    pub(super) notes_scratch: Vec<u8>,
}

impl<S: Sample> Harmonizer<S> {
    pub fn new(config: HarmonizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let analyzer = InputAnalyzer::new(
            config.sample_rate,
            config.max_block_size,
            config.pitch_detection,
            config.seed,
        )?;

        let quick = AdsrParams::quick(config.quick_attack_ms, config.quick_release_ms);
        let voices = (0..config.max_voices)
            .map(|index| {
                let mut voice = Voice::new(
                    index,
                    config.sample_rate as f32,
                    config.max_block_size,
                    analyzer.max_grain_len(),
                    config.adsr,
                    quick,
                );
                voice.set_adsr_enabled(config.adsr_enabled);
                voice
            })
            .collect();

        tracing::debug!(
            sample_rate = config.sample_rate,
            max_block_size = config.max_block_size,
            max_voices = config.max_voices,
            num_voices = config.num_voices,
            "harmonizer prepared"
        );

        // every voice can emit an off and an on per event, plus pedal traffic
        let aggregate_capacity = MIDI_EVENT_CAPACITY + 4 * config.max_voices;

        Ok(Self {
            voices,
            num_voices: config.num_voices,
            analyzer,
            panner: PanningManager::new(config.max_voices, config.num_voices, config.stereo_width),
            converter: PitchConverter::new(config.concert_pitch_hz, config.notes_per_octave),
            bend: PitchBendTracker::new(config.pitch_bend_range_up, config.pitch_bend_range_down),
            velocity: VelocityCurve::new(config.velocity_sensitivity),
            pedal: AutomatedVoice::new(config.pedal_pitch),
            descant: AutomatedVoice::new(config.descant),
            latch_on: config.midi_latch,
            interval_latch_on: config.interval_latch,
            intervals: Vec::with_capacity(config.max_voices),
            interval_reference: None,
            last_input_note: None,
            sustain_down: false,
            sostenuto_down: false,
            soft_down: false,
            note_on_counter: 0,
            last_channel: 0,
            last_timestamp: -1,
            block_offset: 0,
            aggregate: MidiBuffer::with_capacity(aggregate_capacity),
            incoming: MidiBuffer::with_capacity(MIDI_EVENT_CAPACITY),
            chunk_midi: MidiBuffer::with_capacity(MIDI_EVENT_CAPACITY),
            chord_scratch: Vec::with_capacity(config.max_voices),
            notes_scratch: Vec::with_capacity(config.max_voices),
            config,
        })
    }

    /// Re-size everything for a new sample rate or block size. Sounding
    /// notes are dropped; all other settings are kept.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), ConfigError> {
        let config = HarmonizerConfig {
            sample_rate,
            max_block_size,
            ..self.config.clone()
        };
        *self = Self::new(config)?;
        Ok(())
    }

    /// Silence everything and forget all note and pedal state.
    pub fn release_resources(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.analyzer.reset();
        self.panner.reset();
        self.bend.reset();
        self.pedal.last_pitch = None;
        self.descant.last_pitch = None;
        self.intervals.clear();
        self.interval_reference = None;
        self.last_input_note = None;
        self.sustain_down = false;
        self.sostenuto_down = false;
        self.soft_down = false;
        self.last_timestamp = -1;
        self.aggregate.clear();
        self.incoming.clear();
        self.chunk_midi.clear();

        tracing::debug!("harmonizer resources released");
    }

    /// Render one host block.
    ///
    /// `midi` holds the block's incoming events (offsets in samples from the
    /// block start). On return it holds the events the engine produced:
    /// every note it started or stopped, forwarded pedals, wheel and
    /// pressure. Events past `midi`'s capacity are dropped.
    ///
    /// Blocks longer than the prepared size are rendered in prepared-size
    /// chunks, each chunk after the MIDI that falls inside it.
    pub fn process<C: CommandReceiver + ?Sized>(
        &mut self,
        commands: &mut C,
        input: &[S],
        out_l: &mut [S],
        out_r: &mut [S],
        midi: &mut MidiBuffer,
    ) {
        debug_assert_eq!(input.len(), out_l.len());
        debug_assert_eq!(input.len(), out_r.len());
        let num_samples = input.len().min(out_l.len()).min(out_r.len());

        while let Some(command) = commands.pop() {
            if let Err(err) = self.apply(command) {
                tracing::warn!(?command, %err, "command rejected");
            }
        }

        // out-of-block timestamps land on the first or last sample
        let last_sample = num_samples.saturating_sub(1) as i64;
        self.incoming.clear();
        for event in midi.iter() {
            self.incoming
                .push(event.sample_offset.clamp(0, last_sample), event.event);
        }
        self.incoming.sort();
        midi.clear();

        let max_block = self.config.max_block_size;
        let mut start = 0;
        loop {
            let end = (start + max_block).min(num_samples);
            let range_end = if end == num_samples { i64::MAX } else { end as i64 };

            self.chunk_midi.clear();
            self.chunk_midi
                .extend_from_range(&self.incoming, start as i64..range_end);
            self.block_offset = start as i64;

            self.process_block(
                &input[start..end],
                &mut out_l[start..end],
                &mut out_r[start..end],
            );

            if end == num_samples {
                break;
            }
            start = end;
        }

        for event in self.aggregate.iter() {
            midi.push(event.sample_offset, event.event);
        }
        self.aggregate.clear();
        self.last_timestamp = -1;
        self.block_offset = 0;
    }

    fn process_block(&mut self, input: &[S], out_l: &mut [S], out_r: &mut [S]) {
        let events = std::mem::take(&mut self.chunk_midi);
        for event in &events {
            self.handle_midi_event(event);
        }
        self.chunk_midi = events;
        self.stop_unheld_voices();

        out_l.fill(S::ZERO);
        out_r.fill(S::ZERO);
        if input.is_empty() {
            return;
        }

        self.analyzer.analyze(input);
        self.track_input_pitch();
        self.render_voices(out_l, out_r);
    }

    fn render_voices(&mut self, out_l: &mut [S], out_r: &mut [S]) {
        let frame = self.analyzer.frame();
        let soft = if self.soft_down {
            self.config.soft_pedal_gain
        } else {
            1.0
        };

        for voice in self.voices.iter_mut() {
            let mut gain = soft;
            if voice.is_held_after_key_up() {
                gain *= self.config.released_voice_gain;
            }

            if let VoiceRender::Finished {
                freed_pan: Some(pan),
            } = voice.render(&frame, out_l, out_r, gain)
            {
                self.panner.pan_val_turned_off(pan);
            }
        }
    }

    /// Apply a configuration change now.
    pub fn apply(&mut self, command: HarmonizerCommand) -> Result<(), ConfigError> {
        command.validate(&CommandLimits::from(&self.config))?;

        match command {
            HarmonizerCommand::SetNumVoices(n) => self.set_num_voices(n),
            HarmonizerCommand::SetStereoWidth(width) => {
                self.config.stereo_width = width;
                self.panner.update_stereo_width(width);
                self.remap_pans();
            }
            HarmonizerCommand::SetLowestPannedNote(note) => self.set_lowest_panned_note(note),
            HarmonizerCommand::SetConcertPitch(hz) => {
                self.config.concert_pitch_hz = hz;
                self.converter.set_concert_pitch_hz(hz);
                self.refresh_output_freqs();
            }
            HarmonizerCommand::SetPitchBendRange { up, down } => {
                self.config.pitch_bend_range_up = up;
                self.config.pitch_bend_range_down = down;
                self.bend.set_range(up, down);
                self.refresh_output_freqs();
            }
            HarmonizerCommand::SetVelocitySensitivity(sensitivity) => {
                self.config.velocity_sensitivity = sensitivity;
                self.velocity.set_sensitivity(sensitivity);
                for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
                    voice.set_velocity_gain(self.velocity.gain(voice.velocity()));
                }
            }
            HarmonizerCommand::SetAdsr(params) => {
                self.config.adsr = params;
                for voice in &mut self.voices {
                    voice.set_adsr(params);
                }
            }
            HarmonizerCommand::SetAdsrEnabled(enabled) => {
                self.config.adsr_enabled = enabled;
                for voice in &mut self.voices {
                    voice.set_adsr_enabled(enabled);
                }
            }
            HarmonizerCommand::SetQuickAttackMs(ms) => {
                self.config.quick_attack_ms = ms;
                self.update_quick_fade();
            }
            HarmonizerCommand::SetQuickReleaseMs(ms) => {
                self.config.quick_release_ms = ms;
                self.update_quick_fade();
            }
            HarmonizerCommand::SetNoteStealing(on) => self.config.note_stealing = on,
            HarmonizerCommand::SetMidiLatch { on, allow_tail_off } => {
                self.set_midi_latch(on, allow_tail_off)
            }
            HarmonizerCommand::SetIntervalLatch { on, allow_tail_off } => {
                self.set_interval_latch(on, allow_tail_off)
            }
            HarmonizerCommand::SetPedalPitch(settings) => {
                self.config.pedal_pitch = settings;
                self.set_pedal_pitch(settings);
            }
            HarmonizerCommand::SetDescant(settings) => {
                self.config.descant = settings;
                self.set_descant(settings);
            }
            HarmonizerCommand::SetPitchDetectionRange { min_hz, max_hz } => {
                self.analyzer.set_hz_range(min_hz, max_hz)?;
                self.config.pitch_detection.min_hz = min_hz;
                self.config.pitch_detection.max_hz = max_hz;
            }
            HarmonizerCommand::SetConfidenceThreshold(threshold) => {
                self.analyzer.set_confidence_threshold(threshold)?;
                self.config.pitch_detection.confidence_threshold = threshold;
            }
            HarmonizerCommand::SetSoftPedalGain(gain) => self.config.soft_pedal_gain = gain,
            HarmonizerCommand::SetReleasedVoiceGain(gain) => self.config.released_voice_gain = gain,
            HarmonizerCommand::AllNotesOff { allow_tail_off } => self.all_notes_off(allow_tail_off),
        }

        tracing::debug!(?command, "command applied");
        Ok(())
    }

    fn set_num_voices(&mut self, num_voices: usize) {
        if num_voices == self.num_voices {
            return;
        }

        // slots taken out of service finish with a quick fade
        for idx in num_voices..self.num_voices {
            if self.voices[idx].is_holding_note() {
                self.stop_voice(idx, 1.0, false);
            }
        }

        tracing::debug!(from = self.num_voices, to = num_voices, "voice count changed");

        self.num_voices = num_voices;
        self.config.num_voices = num_voices;
        self.panner.set_num_voices(num_voices);
        self.remap_pans();
    }

    /// After the pan value set was rebuilt, move every pooled voice to the
    /// closest value still free.
    fn remap_pans(&mut self) {
        for voice in self.voices[..self.num_voices]
            .iter_mut()
            .filter(|v| v.is_active() && v.pan_from_pool())
        {
            let pan = self.panner.closest_new_pan_val_from_old(voice.pan());
            voice.set_pan(pan, true);
        }
    }

    fn set_lowest_panned_note(&mut self, lowest: u8) {
        self.config.lowest_panned_note = lowest;

        for idx in 0..self.num_voices {
            // releasing voices hold no pool pan
            let voice = &self.voices[idx];
            let Some(note) = voice.note().filter(|_| voice.is_holding_note()) else {
                continue;
            };

            if note < lowest {
                if self.voices[idx].pan_from_pool() {
                    self.panner.pan_val_turned_off(self.voices[idx].pan());
                }
                self.voices[idx].set_pan(CENTRE_PAN, false);
            } else if !self.voices[idx].pan_from_pool() {
                self.assign_pool_pan(idx);
            }
        }
    }

    pub(super) fn assign_pool_pan(&mut self, idx: usize) {
        if self.panner.num_available() > 0 {
            let pan = self.panner.next_pan_val();
            self.voices[idx].set_pan(pan, true);
        } else {
            self.voices[idx].set_pan(CENTRE_PAN, false);
        }
    }

    fn update_quick_fade(&mut self) {
        let quick = AdsrParams::quick(self.config.quick_attack_ms, self.config.quick_release_ms);
        for voice in &mut self.voices {
            voice.set_quick_fade(quick);
        }
    }

    /// Output frequency for a note under the current tuning and bend.
    pub(super) fn output_freq(&self, note: u8) -> f32 {
        self.converter.mtof(self.bend.apply(note))
    }

    pub(super) fn refresh_output_freqs(&mut self) {
        for idx in 0..self.voices.len() {
            if let Some(note) = self.voices[idx].note() {
                let hz = self.output_freq(note);
                self.voices[idx].set_output_freq(hz);
            }
        }
    }

    /// Queue an event for the outgoing buffer one tick after the last one.
    pub(super) fn emit(&mut self, event: MidiEvent) {
        self.last_timestamp += 1;
        if !self.aggregate.push(self.last_timestamp, event) {
            tracing::debug!(?event, "outgoing midi buffer full, event dropped");
        }
    }

    // Queries -------------------------------------------------------------

    pub fn config(&self) -> &HarmonizerConfig {
        &self.config
    }

    pub fn voices(&self) -> &[Voice<S>] {
        &self.voices
    }

    pub fn num_voices(&self) -> usize {
        self.num_voices
    }

    pub fn panner(&self) -> &PanningManager {
        &self.panner
    }

    /// Whether some voice plays `note`. Releasing voices count only when
    /// `include_releasing` is set.
    pub fn is_pitch_active(&self, note: u8, include_releasing: bool) -> bool {
        self.voices.iter().any(|v| {
            v.note() == Some(note) && (include_releasing || v.is_holding_note())
        })
    }

    /// Sorted notes currently sounding.
    pub fn active_notes(&self, include_releasing: bool) -> Vec<u8> {
        let mut notes = Vec::with_capacity(self.voices.len());
        self.active_notes_into(&mut notes, include_releasing);
        notes
    }

    /// Like [`active_notes`](Self::active_notes), into a caller-owned buffer.
    pub fn active_notes_into(&self, notes: &mut Vec<u8>, include_releasing: bool) {
        notes.clear();
        notes.extend(
            self.voices
                .iter()
                .filter(|v| include_releasing || v.is_holding_note())
                .filter_map(|v| v.note()),
        );
        notes.sort_unstable();
        notes.dedup();
    }

    /// Detected input frequency of the last block, `0.0` when unpitched.
    pub fn input_freq(&self) -> f32 {
        self.analyzer.detected_freq()
    }

    pub fn pedal_pitch(&self) -> Option<u8> {
        self.pedal.last_pitch
    }

    pub fn descant_pitch(&self) -> Option<u8> {
        self.descant.last_pitch
    }

    pub fn is_midi_latch_on(&self) -> bool {
        self.latch_on
    }

    pub fn is_interval_latch_on(&self) -> bool {
        self.interval_latch_on
    }

    /// Semitone offsets from the input pitch held by the interval latch.
    pub fn latched_intervals(&self) -> &[i32] {
        &self.intervals
    }

    pub fn is_sustain_pedal_down(&self) -> bool {
        self.sustain_down
    }

    pub fn is_soft_pedal_down(&self) -> bool {
        self.soft_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::message::NoCommands;

    const BLOCK: usize = 256;

    fn harmonizer(voices: usize) -> Harmonizer<f32> {
        let config = HarmonizerConfig::default()
            .with_max_block_size(BLOCK)
            .with_voices(voices);
        Harmonizer::new(config).expect("valid config")
    }

    fn note_on(key: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            key,
            velocity: 1.0,
        }
    }

    fn run(h: &mut Harmonizer<f32>, len: usize, events: &[(i64, MidiEvent)]) -> MidiBuffer {
        let input = vec![0.0; len];
        let mut l = vec![0.0; len];
        let mut r = vec![0.0; len];
        let mut midi = MidiBuffer::with_capacity(64);
        for &(offset, event) in events {
            midi.push(offset, event);
        }
        h.process(&mut NoCommands, &input, &mut l, &mut r, &mut midi);
        midi
    }

    #[test]
    fn rejects_invalid_config() {
        let config = HarmonizerConfig::default().with_voices(0);
        assert!(Harmonizer::<f32>::new(config).is_err());
    }

    #[test]
    fn emitted_timestamps_strictly_increase() {
        let mut h = harmonizer(4);
        let out = run(&mut h, BLOCK, &[(10, note_on(60)), (10, note_on(64)), (3, note_on(67))]);

        let offsets: Vec<i64> = out.iter().map(|e| e.sample_offset).collect();
        assert_eq!(offsets.len(), 3);
        assert!(offsets.windows(2).all(|w| w[0] < w[1]), "{offsets:?}");
        // the first event lands on its own timestamp
        assert_eq!(offsets, vec![3, 10, 11]);
    }

    #[test]
    fn long_blocks_are_chunked_with_their_midi() {
        let mut h = harmonizer(4);
        let out = run(&mut h, BLOCK * 3 + 17, &[(BLOCK as i64 * 2 + 5, note_on(60))]);

        assert_eq!(h.active_notes(false), vec![60]);
        assert_eq!(out.as_slice()[0].sample_offset, BLOCK as i64 * 2 + 5);
    }

    #[test]
    fn out_of_range_timestamps_are_clamped() {
        let mut h = harmonizer(4);
        let out = run(&mut h, BLOCK, &[(-50, note_on(60)), (9_000, note_on(62))]);

        assert_eq!(h.active_notes(false), vec![60, 62]);
        let offsets: Vec<i64> = out.iter().map(|e| e.sample_offset).collect();
        assert_eq!(offsets, vec![0, BLOCK as i64 - 1]);
    }

    #[test]
    fn shrinking_the_pool_stops_removed_voices() {
        let mut h = harmonizer(4);
        run(&mut h, BLOCK, &[(0, note_on(60)), (1, note_on(64)), (2, note_on(67))]);
        assert_eq!(h.active_notes(false).len(), 3);

        h.apply(HarmonizerCommand::SetNumVoices(2)).expect("in range");
        assert_eq!(h.num_voices(), 2);
        assert_eq!(h.active_notes(false), vec![60, 64]);
        assert_eq!(h.panner().num_voices(), 2);

        // the pan pool now matches the two voices still in service
        let pans: Vec<u8> = h.voices()[..2].iter().map(|v| v.pan()).collect();
        assert_ne!(pans[0], pans[1]);
    }

    #[test]
    fn removed_slot_is_not_revived_by_its_pitch() {
        let mut h = harmonizer(4);
        let chord: Vec<(i64, MidiEvent)> = [60, 62, 64, 66]
            .into_iter()
            .enumerate()
            .map(|(i, key)| (i as i64, note_on(key)))
            .collect();
        run(&mut h, BLOCK, &chord);

        h.apply(HarmonizerCommand::SetNumVoices(3)).expect("in range");
        // slot 3 is still fading out with 66 when the key comes again
        assert!(h.voices()[3].is_releasing());
        run(&mut h, BLOCK, &[(0, note_on(66))]);

        let holding = h.voices().iter().filter(|v| v.is_holding_note()).count();
        assert_eq!(holding, 3);
        assert!(h.voices()[3..].iter().all(|v| !v.is_holding_note()));
        assert!(h.active_notes(false).contains(&66));
    }

    #[test]
    fn apply_rejects_out_of_range_values() {
        let mut h = harmonizer(4);
        assert!(h.apply(HarmonizerCommand::SetNumVoices(5)).is_err());
        assert!(h.apply(HarmonizerCommand::SetSoftPedalGain(2.0)).is_err());
        assert_eq!(h.config().soft_pedal_gain, 0.65);
    }

    #[test]
    fn concert_pitch_retunes_sounding_voices() {
        let mut h = harmonizer(4);
        run(&mut h, BLOCK, &[(0, note_on(69))]);
        h.apply(HarmonizerCommand::SetConcertPitch(432.0)).expect("valid pitch");

        let voice = h.voices().iter().find(|v| v.note() == Some(69)).expect("voice for 69");
        assert!((voice.output_freq() - 432.0).abs() < 1e-3);
    }

    #[test]
    fn release_resources_silences_everything() {
        let mut h = harmonizer(4);
        run(&mut h, BLOCK, &[(0, note_on(60)), (0, note_on(72))]);
        h.release_resources();

        assert!(h.active_notes(true).is_empty());
        assert_eq!(h.panner().num_available(), 4);
    }

    #[test]
    fn prepare_keeps_settings() {
        let mut h = harmonizer(4);
        h.apply(HarmonizerCommand::SetStereoWidth(30)).expect("valid width");
        h.prepare(44_100.0, 128).expect("valid sizes");

        assert_eq!(h.config().stereo_width, 30);
        assert_eq!(h.config().max_block_size, 128);
        assert_eq!(h.config().sample_rate, 44_100.0);
    }
}
