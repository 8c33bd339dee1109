//! kine-audio: cpal device enumeration/stream plumbing (C2's I/O shell)
//! and the real-time callback engine that implements §4.2 — demuxing
//! four mono inputs to a stereo mix, driving the effect chain, emitting
//! five sample-accurate CVs, and feeding the cross-thread display ring.

mod device;
mod engine;
mod error;
mod stream;

pub use device::*;
pub use engine::*;
pub use error::*;
pub use stream::*;

use kine_core::{BufferSize, SampleRate};

/// Number of mono input channels and total output channels (stereo +
/// 5 CV) fixed by §3's audio buffer model.
pub const INPUT_CHANNELS: u16 = 4;
pub const OUTPUT_CHANNELS: u16 = 7;

/// Audio stream configuration. Buffer size and sample rate are fixed
/// at stream start (§3); changing either restarts the stream.
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub buffer_size: BufferSize,
    pub input_channels: u16,
    pub output_channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            buffer_size: BufferSize::Samples128,
            input_channels: INPUT_CHANNELS,
            output_channels: OUTPUT_CHANNELS,
        }
    }
}
