// Purpose - external interfaces, format conversions

pub mod converter;
pub mod midi;

pub use converter::{PitchBendTracker, PitchConverter, VelocityCurve};
pub use midi::{MidiBuffer, MidiEvent, TimedMidiEvent};

use crate::dsp::Sample;

/// Which part of a stereo input feeds the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSource {
    Left,
    Right,
    #[default]
    MixToMono,
}

/// Reduce a stereo input to the mono signal the engine analyses.
///
/// Writes `min(left.len(), right.len(), out.len())` samples.
pub fn downmix<S: Sample>(left: &[S], right: &[S], source: InputSource, out: &mut [S]) {
    debug_assert_eq!(left.len(), right.len());
    let half = S::from_f32(0.5);

    match source {
        InputSource::Left => {
            for (o, &l) in out.iter_mut().zip(left) {
                *o = l;
            }
        }
        InputSource::Right => {
            for (o, &r) in out.iter_mut().zip(right) {
                *o = r;
            }
        }
        InputSource::MixToMono => {
            for ((o, &l), &r) in out.iter_mut().zip(left).zip(right) {
                *o = (l + r) * half;
            }
        }
    }
}
