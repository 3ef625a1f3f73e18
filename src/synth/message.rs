//! Control messages for the engine.
//!
//! Configuration changes are sent as [`HarmonizerCommand`]s from a control
//! thread through a lock-free ring buffer and applied by the render thread at
//! the start of the next block. Commands are validated on the sending side,
//! so a bad value is reported to the caller and never reaches the queue.

#[cfg(feature = "rtrb")]
use rtrb::{Consumer, Producer, RingBuffer};

use std::collections::VecDeque;

use crate::{
    config::{
        validate_adsr, validate_concert_pitch, validate_hz_range, validate_num_voices,
        validate_pitch_bend_range, validate_quick_fade, AutomatedVoiceConfig, HarmonizerConfig,
    },
    dsp::envelope::AdsrParams,
    error::{check_range, ConfigError},
};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum HarmonizerCommand {
    SetNumVoices(usize),
    SetStereoWidth(u8),
    SetLowestPannedNote(u8),
    SetConcertPitch(f32),
    SetPitchBendRange { up: u8, down: u8 },
    SetVelocitySensitivity(f32),
    SetAdsr(AdsrParams),
    SetAdsrEnabled(bool),
    SetQuickAttackMs(u32),
    SetQuickReleaseMs(u32),
    SetNoteStealing(bool),
    SetMidiLatch { on: bool, allow_tail_off: bool },
    SetIntervalLatch { on: bool, allow_tail_off: bool },
    SetPedalPitch(AutomatedVoiceConfig),
    SetDescant(AutomatedVoiceConfig),
    SetPitchDetectionRange { min_hz: f32, max_hz: f32 },
    SetConfidenceThreshold(f32),
    SetSoftPedalGain(f32),
    SetReleasedVoiceGain(f32),
    AllNotesOff { allow_tail_off: bool },
}

/// Bounds a command is checked against before it is queued.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandLimits {
    pub sample_rate: f64,
    pub max_voices: usize,
}

impl From<&HarmonizerConfig> for CommandLimits {
    fn from(config: &HarmonizerConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            max_voices: config.max_voices,
        }
    }
}

impl HarmonizerCommand {
    /// Check the command's values. Limits that depend on prepared buffer
    /// sizes are checked again when the command is applied.
    pub fn validate(&self, limits: &CommandLimits) -> Result<(), ConfigError> {
        match *self {
            HarmonizerCommand::SetNumVoices(n) => validate_num_voices(n, limits.max_voices),
            HarmonizerCommand::SetStereoWidth(width) => {
                check_range("stereo width", f32::from(width), 0.0, 100.0)
            }
            HarmonizerCommand::SetLowestPannedNote(note) => {
                check_range("lowest panned note", f32::from(note), 0.0, 127.0)
            }
            HarmonizerCommand::SetConcertPitch(hz) => validate_concert_pitch(hz),
            HarmonizerCommand::SetPitchBendRange { up, down } => validate_pitch_bend_range(up, down),
            HarmonizerCommand::SetVelocitySensitivity(s) => {
                check_range("velocity sensitivity", s, 0.0, 1.0)
            }
            HarmonizerCommand::SetAdsr(ref params) => validate_adsr(params),
            HarmonizerCommand::SetQuickAttackMs(ms) | HarmonizerCommand::SetQuickReleaseMs(ms) => {
                validate_quick_fade(ms)
            }
            HarmonizerCommand::SetPedalPitch(ref config) | HarmonizerCommand::SetDescant(ref config) => {
                config.validate()
            }
            HarmonizerCommand::SetPitchDetectionRange { min_hz, max_hz } => {
                validate_hz_range(min_hz, max_hz, limits.sample_rate)
            }
            HarmonizerCommand::SetConfidenceThreshold(t) => {
                check_range("confidence threshold", t, 0.0, 1.0)
            }
            HarmonizerCommand::SetSoftPedalGain(g) => check_range("soft pedal gain", g, 0.0, 1.0),
            HarmonizerCommand::SetReleasedVoiceGain(g) => {
                check_range("released voice gain", g, 0.0, 1.0)
            }
            HarmonizerCommand::SetAdsrEnabled(_)
            | HarmonizerCommand::SetNoteStealing(_)
            | HarmonizerCommand::SetMidiLatch { .. }
            | HarmonizerCommand::SetIntervalLatch { .. }
            | HarmonizerCommand::AllNotesOff { .. } => Ok(()),
        }
    }
}

/// Source of commands drained at the start of every block.
pub trait CommandReceiver {
    fn pop(&mut self) -> Option<HarmonizerCommand>;
}

/// A receiver that never has anything to say.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommands;

impl CommandReceiver for NoCommands {
    fn pop(&mut self) -> Option<HarmonizerCommand> {
        None
    }
}

impl CommandReceiver for VecDeque<HarmonizerCommand> {
    fn pop(&mut self) -> Option<HarmonizerCommand> {
        self.pop_front()
    }
}

#[cfg(feature = "rtrb")]
impl CommandReceiver for Consumer<HarmonizerCommand> {
    fn pop(&mut self) -> Option<HarmonizerCommand> {
        Consumer::pop(self).ok()
    }
}

/// Sending half of the command queue. Validates before pushing.
#[cfg(feature = "rtrb")]
pub struct HarmonizerHandle {
    tx: Producer<HarmonizerCommand>,
    limits: CommandLimits,
}

#[cfg(feature = "rtrb")]
impl HarmonizerHandle {
    pub fn send(&mut self, command: HarmonizerCommand) -> Result<(), ConfigError> {
        if let Err(err) = command.validate(&self.limits) {
            tracing::debug!(?command, %err, "command rejected");
            return Err(err);
        }
        self.tx.push(command).map_err(|_| ConfigError::QueueFull)
    }

    pub fn slots(&self) -> usize {
        self.tx.slots()
    }
}

/// Create a command queue for an engine built from `config`.
#[cfg(feature = "rtrb")]
pub fn command_channel(
    capacity: usize,
    config: &HarmonizerConfig,
) -> (HarmonizerHandle, Consumer<HarmonizerCommand>) {
    let (tx, rx) = RingBuffer::<HarmonizerCommand>::new(capacity);
    let handle = HarmonizerHandle {
        tx,
        limits: CommandLimits::from(config),
    };
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> CommandLimits {
        CommandLimits::from(&HarmonizerConfig::default())
    }

    #[test]
    fn bad_values_are_rejected() {
        let limits = limits();
        assert!(HarmonizerCommand::SetStereoWidth(101).validate(&limits).is_err());
        assert!(HarmonizerCommand::SetNumVoices(0).validate(&limits).is_err());
        assert!(HarmonizerCommand::SetConcertPitch(-1.0).validate(&limits).is_err());
        assert!(HarmonizerCommand::SetPitchDetectionRange {
            min_hz: 900.0,
            max_hz: 100.0
        }
        .validate(&limits)
        .is_err());
        assert!(HarmonizerCommand::SetStereoWidth(40).validate(&limits).is_ok());
    }

    #[test]
    fn deque_receiver_is_fifo() {
        let mut queue = VecDeque::from(vec![
            HarmonizerCommand::SetNoteStealing(false),
            HarmonizerCommand::SetStereoWidth(10),
        ]);
        assert_eq!(queue.pop(), Some(HarmonizerCommand::SetNoteStealing(false)));
        assert_eq!(queue.pop(), Some(HarmonizerCommand::SetStereoWidth(10)));
        assert_eq!(CommandReceiver::pop(&mut queue), None);
    }

    #[cfg(feature = "rtrb")]
    #[test]
    fn handle_validates_and_reports_full_queue() {
        let (mut handle, mut rx) = command_channel(1, &HarmonizerConfig::default());

        assert!(handle.send(HarmonizerCommand::SetStereoWidth(200)).is_err());
        assert_eq!(handle.send(HarmonizerCommand::SetStereoWidth(50)), Ok(()));
        assert_eq!(
            handle.send(HarmonizerCommand::SetStereoWidth(60)),
            Err(ConfigError::QueueFull)
        );

        assert_eq!(
            CommandReceiver::pop(&mut rx),
            Some(HarmonizerCommand::SetStereoWidth(50))
        );
        assert_eq!(CommandReceiver::pop(&mut rx), None);
    }
}
