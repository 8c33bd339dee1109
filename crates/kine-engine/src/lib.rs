//! kine-engine: the orchestrator (§9) that wires kine-core's shared
//! state to kine-audio's callback engine, kine-vision's contour
//! scanner, kine-video's frame sources, and kine-viz's GPU compositor
//! into a single `start`/`stop`/`set_target` API.

pub mod config;
pub mod frame_pump;
pub mod midi;
pub mod orchestrator;
pub mod video_thread;

pub use config::{AudioConfig, CoreConfig, FrameSourceKind, VideoConfig, VisionConfig};
pub use midi::{midi_event_channel, MidiEvent};
pub use orchestrator::{start, CoreHandle, FrameProducer};
