//! Engine-level configuration (§6, ambient stack A4): the arguments to
//! [`crate::start`] and the persistence document path. Every type here
//! is `Serialize`/`Deserialize` so a caller can load a saved session
//! before calling `start`, matching this workspace's own config
//! structs (`rf-engine`'s per-feature config types are all plain
//! serde structs with a matching `Default`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use kine_core::{BufferSize, SampleRate};

/// Audio stream configuration: sample rate, buffer size, and channel
/// counts (§6). Fixed at stream start; changing either restarts the
/// stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub buffer_size: BufferSize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            buffer_size: BufferSize::Samples128,
        }
    }
}

impl From<AudioConfig> for kine_audio::AudioConfig {
    fn from(cfg: AudioConfig) -> Self {
        kine_audio::AudioConfig {
            sample_rate: cfg.sample_rate,
            buffer_size: cfg.buffer_size,
            input_channels: kine_audio::INPUT_CHANNELS,
            output_channels: kine_audio::OUTPUT_CHANNELS,
        }
    }
}

/// Which [`kine_video::FrameSource`] variant to build at `start()`. The
/// actual producer (camera capture thread, external generator process)
/// is supplied to `start` separately — it is opaque to this crate per
/// §1's scope note, so only the discriminant is serialized here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameSourceKind {
    Camera,
    FileLoop,
    ExternalGenerator,
}

impl Default for FrameSourceKind {
    fn default() -> Self {
        Self::Camera
    }
}

/// Video/compositor configuration (§6, §4.7): output resolution, the
/// target refresh rate, and which frame-source variant to wire up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub target_fps: f64,
    pub frame_source: FrameSourceKind,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            target_fps: 30.0,
            frame_source: FrameSourceKind::Camera,
        }
    }
}

/// The contour scanner (C5) runs at its own, typically lower, frame
/// rate than the compositor (§4.5: "at <=30 fps").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisionConfig {
    pub target_fps: f64,
    /// Working resolution contours are detected at (§4.5 step 1),
    /// independent of the camera's native resolution.
    pub detect_width: u32,
    pub detect_height: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            detect_width: 480,
            detect_height: 270,
        }
    }
}

/// The complete set of arguments to `start()`, plus where to find a
/// persisted session document (§6, §A5). `persistence_path` is
/// consulted only by the UI-thread load/save calls the caller makes
/// explicitly — `start()` itself never touches disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub vision: VisionConfig,
    pub persistence_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            vision: VisionConfig::default(),
            persistence_path: None,
        }
    }
}
