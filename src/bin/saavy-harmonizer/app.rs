//! Demo - builds the harmonizer and plays it through the default device

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use std::f32::consts::TAU;
use std::time::Duration;

use super::script::ChordScript;

use saavy_harmonizer::{
    command_channel,
    io::{downmix, InputSource},
    Harmonizer, HarmonizerCommand, HarmonizerConfig, MidiBuffer,
};

/// Largest block handed to the engine in one go
const BLOCK_SIZE: usize = 512;

/// Main application builder
pub struct Demo {
    input_hz: f32,
    chord_seconds: f32,
    chords: Vec<Vec<u8>>,
}

impl Demo {
    pub fn new() -> Self {
        Self {
            input_hz: 220.0,
            chord_seconds: 2.0,
            chords: Vec::new(),
        }
    }

    /// Frequency of the synthetic input voice
    pub fn input_hz(mut self, hz: f32) -> Self {
        self.input_hz = hz;
        self
    }

    pub fn chord_seconds(mut self, seconds: f32) -> Self {
        self.chord_seconds = seconds;
        self
    }

    /// Append a chord to the looping progression
    pub fn chord(mut self, notes: &[u8]) -> Self {
        self.chords.push(notes.to_vec());
        self
    }

    /// Run the demo (takes over, plays audio)
    pub fn run(self) -> EyreResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let stream_config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = stream_config.sample_rate().0 as f32;
        let channels = stream_config.channels() as usize;

        let config = HarmonizerConfig::default()
            .with_sample_rate(f64::from(sample_rate))
            .with_max_block_size(BLOCK_SIZE)
            .with_voices(8);

        let mut harmonizer = Harmonizer::<f32>::new(config.clone())
            .wrap_err("failed to build the harmonizer")?;
        let (mut handle, mut commands) = command_channel(64, &config);

        tracing::info!(sample_rate, channels, input_hz = self.input_hz, "starting");
        println!("=== saavy-harmonizer ===");
        println!("Sample rate: {} Hz", sample_rate);
        println!("Chords: {}", self.chords.len());
        println!("Playing... Press Ctrl+C to stop");
        println!();

        let mut script = ChordScript::new(self.chords, self.chord_seconds, sample_rate);
        let phase_inc = self.input_hz / sample_rate;
        let mut phase = 0.0f32;

        let mut in_l = vec![0.0f32; BLOCK_SIZE];
        let mut in_r = vec![0.0f32; BLOCK_SIZE];
        let mut input = vec![0.0f32; BLOCK_SIZE];
        let mut out_l = vec![0.0f32; BLOCK_SIZE];
        let mut out_r = vec![0.0f32; BLOCK_SIZE];
        let mut midi = MidiBuffer::with_capacity(256);

        let stream = device.build_output_stream(
            &stream_config.into(),
            move |data: &mut [f32], _| {
                let total_frames = data.len() / channels;
                let mut frames_written = 0;

                while frames_written < total_frames {
                    let frames = (total_frames - frames_written).min(BLOCK_SIZE);

                    // a sine with a little second harmonic stands in for a voice,
                    // the harmonic only on the right
                    for (l, r) in in_l[..frames].iter_mut().zip(&mut in_r[..frames]) {
                        *l = 0.4 * (TAU * phase).sin();
                        *r = *l + 0.2 * (2.0 * TAU * phase).sin();
                        phase = (phase + phase_inc).fract();
                    }
                    downmix(
                        &in_l[..frames],
                        &in_r[..frames],
                        InputSource::MixToMono,
                        &mut input[..frames],
                    );

                    midi.clear();
                    script.fill_block(frames, &mut midi);

                    harmonizer.process(
                        &mut commands,
                        &input[..frames],
                        &mut out_l[..frames],
                        &mut out_r[..frames],
                        &mut midi,
                    );

                    let out_off = frames_written * channels;
                    for i in 0..frames {
                        let frame = &mut data[out_off + i * channels..out_off + (i + 1) * channels];
                        match frame {
                            [mono] => *mono = 0.5 * (out_l[i] + out_r[i]),
                            [left, right, rest @ ..] => {
                                *left = out_l[i];
                                *right = out_r[i];
                                rest.fill(0.0);
                            }
                            [] => {}
                        }
                    }

                    frames_written += frames;
                }
            },
            |err| tracing::error!(%err, "audio stream error"),
            None,
        )?;

        stream.play()?;

        // Sweep the stereo width from the control thread
        let widths = [100u8, 60, 20, 60];
        let mut step = 0;
        loop {
            std::thread::sleep(Duration::from_secs(4));
            step = (step + 1) % widths.len();
            if let Err(err) = handle.send(HarmonizerCommand::SetStereoWidth(widths[step])) {
                tracing::warn!(%err, "could not queue command");
            }
        }
    }
}

impl Default for Demo {
    fn default() -> Self {
        Self::new()
    }
}
