//! kine-core: shared sample/time types, the process-wide Parameter Store
//! (C1), the cross-process Display Buffer (C6), the error taxonomy, and
//! the MIDI-learn mapping table + persistence documents.
//!
//! Everything in this crate is either a plain value type or built for
//! lock-free sharing across the audio, vision, and GL threads — nothing
//! here allocates or blocks on the real-time path.

mod display_ring;
mod error;
mod midi_learn;
mod params;
mod persistence;
mod sample;
mod time;
mod vision_bridge;

pub use display_ring::*;
pub use error::*;
pub use midi_learn::*;
pub use params::*;
pub use persistence::*;
pub use sample::*;
pub use time::*;
pub use vision_bridge::*;

/// Supported audio sample rates (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44_100,
    Hz48000 = 48_000,
    Hz96000 = 96_000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            44_100 => Some(Self::Hz44100),
            48_000 => Some(Self::Hz48000),
            96_000 => Some(Self::Hz96000),
            _ => None,
        }
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Supported audio buffer sizes (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BufferSize {
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
}

impl BufferSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    #[inline]
    pub fn latency_ms(self, sample_rate: SampleRate) -> f64 {
        (self.as_usize() as f64 / sample_rate.as_f64()) * 1000.0
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            64 => Some(Self::Samples64),
            128 => Some(Self::Samples128),
            256 => Some(Self::Samples256),
            _ => None,
        }
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Samples128
    }
}
