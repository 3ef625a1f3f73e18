// Purpose: voice management, polyphony, MIDI handling
// The engine sits above the analysis and dsp layers and owns every voice

pub mod allocator;
pub mod automation;
pub mod harmonizer;
pub mod message;
pub mod midi;
pub mod panning;
pub mod voice;

pub use automation::AutomatedVoice;
pub use harmonizer::{Harmonizer, MIDI_EVENT_CAPACITY};
#[cfg(feature = "rtrb")]
pub use message::{command_channel, HarmonizerHandle};
pub use message::{CommandLimits, CommandReceiver, HarmonizerCommand, NoCommands};
pub use panning::{PanningManager, CENTRE_PAN};
pub use voice::{NoteStart, Voice, VoiceRender};
