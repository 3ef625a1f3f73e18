use crate::{
    analysis::AnalysisFrame,
    dsp::{
        amplify::{add_scaled, apply_gain, pan_gains},
        envelope::{AdsrParams, Envelope},
        GrainShifter, Sample,
    },
    synth::panning::CENTRE_PAN,
};

/// What happened to a voice during one render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRender {
    /// Nothing to render.
    Silent,
    /// Still sounding after this block.
    Sounding,
    /// Went idle during this block. Carries the pan value to hand back to
    /// the panning pool, if it came from there.
    Finished { freed_pan: Option<u8> },
}

/// Arguments for [`Voice::start_note`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteStart {
    pub note: u8,
    pub velocity: f32,
    pub velocity_gain: f32,
    pub note_on_time: u64,
    pub output_freq: f32,
    pub is_keyboard: bool,
    pub is_pedal: bool,
    pub is_descant: bool,
}

/// One pitch-shifting voice.
///
/// Voices live in a fixed pool and are addressed by slot index. A voice is
/// active while it has a note, including its release tail. It is *releasing*
/// once it has been stopped: from then on it only plays out its tail and is
/// no longer counted as holding its note.
#[derive(Debug, Clone)]
pub struct Voice<S: Sample> {
    index: usize,
    note: Option<u8>,

    key_down: bool,
    sustain_pedal_down: bool,
    sostenuto_pedal_down: bool,
    // key released while MIDI latch or interval latch was on
    latched: bool,
    // started by the engine rather than a key
    automated: bool,
    pedal_voice: bool,
    descant_voice: bool,

    note_turned_off: bool,
    fading: bool,

    envelope: Envelope,
    adsr_enabled: bool,
    // quick attack on start, quick release on forced stops
    quick_fade: Envelope,

    output_freq: f32,
    pan: u8,
    pan_from_pool: bool,
    pan_left: f32,
    pan_right: f32,

    velocity: f32,
    velocity_gain: f32,
    aftertouch: u8,
    note_on_time: u64,

    shifter: GrainShifter<S>,
    scratch: Vec<S>,
}

impl<S: Sample> Voice<S> {
    pub fn new(
        index: usize,
        sample_rate: f32,
        max_block_size: usize,
        max_grain_len: usize,
        adsr: AdsrParams,
        quick_fade: AdsrParams,
    ) -> Self {
        let (pan_left, pan_right) = pan_gains(CENTRE_PAN);
        Self {
            index,
            note: None,
            key_down: false,
            sustain_pedal_down: false,
            sostenuto_pedal_down: false,
            latched: false,
            automated: false,
            pedal_voice: false,
            descant_voice: false,
            note_turned_off: true,
            fading: false,
            envelope: Envelope::new(sample_rate, adsr),
            adsr_enabled: true,
            quick_fade: Envelope::new(sample_rate, quick_fade),
            output_freq: 0.0,
            pan: CENTRE_PAN,
            pan_from_pool: false,
            pan_left,
            pan_right,
            velocity: 0.0,
            velocity_gain: 1.0,
            aftertouch: 0,
            note_on_time: 0,
            shifter: GrainShifter::new(max_block_size, max_grain_len),
            scratch: vec![S::ZERO; max_block_size],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn is_active(&self) -> bool {
        self.note.is_some()
    }

    /// Stopped and playing out its tail.
    pub fn is_releasing(&self) -> bool {
        self.is_active() && self.note_turned_off
    }

    /// Active and not yet stopped.
    pub fn is_holding_note(&self) -> bool {
        self.is_active() && !self.note_turned_off
    }

    pub fn is_key_down(&self) -> bool {
        self.key_down
    }

    pub fn set_key_down(&mut self, down: bool) {
        self.key_down = down;
    }

    pub fn set_sustain_pedal(&mut self, down: bool) {
        self.sustain_pedal_down = down;
    }

    pub fn set_sostenuto_pedal(&mut self, down: bool) {
        self.sostenuto_pedal_down = down;
    }

    /// Held up by a sustain or sostenuto pedal.
    pub fn is_pedal_held(&self) -> bool {
        self.sustain_pedal_down || self.sostenuto_pedal_down
    }

    pub fn set_latched(&mut self, latched: bool) {
        self.latched = latched;
    }

    pub fn is_automated(&self) -> bool {
        self.automated
    }

    pub fn is_pedal_voice(&self) -> bool {
        self.pedal_voice
    }

    pub fn is_descant_voice(&self) -> bool {
        self.descant_voice
    }

    /// Drop automated ownership: the note now belongs to whoever holds the key.
    pub fn release_automation(&mut self) {
        self.automated = false;
        self.pedal_voice = false;
        self.descant_voice = false;
    }

    /// Sounding with the key up only because a pedal or the latch holds it.
    pub fn is_held_after_key_up(&self) -> bool {
        self.is_holding_note()
            && !self.key_down
            && !self.automated
            && (self.latched || self.is_pedal_held())
    }

    /// Still holding its note with the key up and no pedal, latch or
    /// automation behind it. The engine stops these before rendering.
    pub fn is_unheld(&self) -> bool {
        self.is_holding_note()
            && !self.key_down
            && !self.automated
            && !self.latched
            && !self.is_pedal_held()
    }

    pub fn note_on_time(&self) -> u64 {
        self.note_on_time
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn set_velocity_gain(&mut self, gain: f32) {
        self.velocity_gain = gain;
    }

    pub fn aftertouch(&self) -> u8 {
        self.aftertouch
    }

    pub fn set_aftertouch(&mut self, value: u8) {
        self.aftertouch = value.min(127);
    }

    pub fn output_freq(&self) -> f32 {
        self.output_freq
    }

    pub fn set_output_freq(&mut self, hz: f32) {
        self.output_freq = hz;
    }

    pub fn pan(&self) -> u8 {
        self.pan
    }

    /// Whether the current pan value was taken from the panning pool.
    pub fn pan_from_pool(&self) -> bool {
        self.pan_from_pool
    }

    pub fn set_pan(&mut self, pan: u8, from_pool: bool) {
        let pan = pan.min(127);
        self.pan = pan;
        self.pan_from_pool = from_pool;
        (self.pan_left, self.pan_right) = pan_gains(pan);
    }

    pub fn set_adsr(&mut self, params: AdsrParams) {
        self.envelope.set_params(params);
    }

    pub fn set_adsr_enabled(&mut self, enabled: bool) {
        self.adsr_enabled = enabled;
    }

    pub fn set_quick_fade(&mut self, params: AdsrParams) {
        self.quick_fade.set_params(params);
    }

    /// Begin a note. A voice that is still active changes note without
    /// passing through idle, so its envelope continues from where it is.
    pub fn start_note(&mut self, start: NoteStart) {
        if self.is_active() {
            self.change_note(start);
            return;
        }

        self.envelope.note_on();
        self.quick_fade.note_on();
        self.shifter.reset();
        self.fading = false;
        self.assign(start);
    }

    fn change_note(&mut self, start: NoteStart) {
        let stolen = !self.note_turned_off;

        if self.note_turned_off || !self.envelope.is_active() {
            self.envelope.retrigger();
        }
        if stolen {
            // the old pitch is cut, the new one enters from silence
            self.quick_fade.note_on();
            self.shifter.reset();
        } else if self.fading || !self.quick_fade.is_active() {
            self.quick_fade.retrigger();
        }
        self.fading = false;
        self.assign(start);
    }

    fn assign(&mut self, start: NoteStart) {
        self.note = Some(start.note.min(127));
        self.velocity = start.velocity;
        self.velocity_gain = start.velocity_gain;
        self.note_on_time = start.note_on_time;
        self.output_freq = start.output_freq;
        self.key_down = start.is_keyboard;
        self.automated = !start.is_keyboard;
        self.latched = false;
        self.sostenuto_pedal_down = false;
        self.pedal_voice = start.is_pedal;
        self.descant_voice = start.is_descant;
        self.note_turned_off = false;
    }

    /// Stop the note: tail off through the envelope release, or fade out
    /// quickly when `allow_tail_off` is false (or the envelope is disabled).
    pub fn stop_note(&mut self, allow_tail_off: bool) {
        if !self.is_active() {
            return;
        }

        self.note_turned_off = true;
        self.latched = false;
        self.automated = false;
        self.pedal_voice = false;
        self.descant_voice = false;

        if allow_tail_off && self.adsr_enabled {
            self.envelope.note_off();
        } else if !self.fading {
            self.fading = true;
            self.quick_fade.note_off();
        }
    }

    /// Render this voice's contribution and add it to `out_l` / `out_r`.
    ///
    /// `gain` stacks on top of velocity and envelopes (soft pedal, released
    /// voices).
    pub fn render(
        &mut self,
        frame: &AnalysisFrame<'_, S>,
        out_l: &mut [S],
        out_r: &mut [S],
        gain: f32,
    ) -> VoiceRender {
        if !self.is_active() {
            return VoiceRender::Silent;
        }

        let on_now = if self.fading {
            self.quick_fade.is_active()
        } else if self.adsr_enabled {
            self.envelope.is_active()
        } else {
            !self.note_turned_off
        };

        if !on_now {
            return self.finish();
        }

        let num_samples = out_l.len().min(out_r.len()).min(self.scratch.len());
        let ratio = if frame.input_freq() > 0.0 {
            f64::from(self.output_freq) / f64::from(frame.input_freq())
        } else {
            1.0
        };

        let scratch = &mut self.scratch[..num_samples];
        self.shifter.process(frame, ratio, scratch);

        self.quick_fade.apply_to_buffer(scratch);
        if self.adsr_enabled {
            self.envelope.apply_to_buffer(scratch);
        }
        apply_gain(scratch, S::from_f32(self.velocity_gain * gain));

        add_scaled(&mut out_l[..num_samples], scratch, S::from_f32(self.pan_left));
        add_scaled(&mut out_r[..num_samples], scratch, S::from_f32(self.pan_right));

        let finished = if self.fading {
            !self.quick_fade.is_active()
        } else {
            self.adsr_enabled && !self.envelope.is_active()
        };

        if finished {
            self.finish()
        } else {
            VoiceRender::Sounding
        }
    }

    /// Drop the note and return to idle.
    pub fn reset(&mut self) -> Option<u8> {
        let freed = self.pan_from_pool.then_some(self.pan);

        self.note = None;
        self.key_down = false;
        self.latched = false;
        self.automated = false;
        self.pedal_voice = false;
        self.descant_voice = false;
        self.sostenuto_pedal_down = false;
        self.note_turned_off = true;
        self.fading = false;
        self.envelope.reset();
        self.quick_fade.reset();
        self.shifter.reset();
        self.set_pan(CENTRE_PAN, false);
        self.velocity = 0.0;
        self.aftertouch = 0;

        freed
    }

    fn finish(&mut self) -> VoiceRender {
        VoiceRender::Finished {
            freed_pan: self.reset(),
        }
    }
}
