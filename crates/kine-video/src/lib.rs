//! kine-video: the Frame Source abstraction (C8, §4.8) — a single
//! tagged enum dispatched over camera capture, file-loop playback, and
//! an external generator's shared slot.
//!
//! Dispatch is a plain `match` rather than a trait object: there are
//! exactly three variants, the set is closed, and the compositor calls
//! `fetch`/`dimensions` in its own per-frame hot path where a vtable
//! indirection buys nothing.

pub mod camera;
pub mod decoder;
pub mod error;
pub mod external_generator;

pub use camera::CameraSource;
pub use decoder::FileLoopSource;
pub use error::{VideoError, VideoResult};
pub use external_generator::{ExternalGeneratorSlot, ExternalGeneratorSource};

/// One decoded RGB8 frame, tightly packed (`width * height * 3` bytes,
/// no padding). Shared by all three frame source variants and by the
/// compositor's upload path.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self { width, height, data }
    }

    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 3],
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Unified frame source (§4.8): `fetch()` returns the next available
/// frame, or `None` if nothing new has arrived yet — never an error,
/// per §5's "Frame-source `fetch()` returning `None` is not an error."
pub enum FrameSource {
    Camera(CameraSource),
    FileLoop(FileLoopSource),
    ExternalGenerator(ExternalGeneratorSource),
}

impl FrameSource {
    /// Fetch the next frame, reusing the previous one if nothing new
    /// has arrived since the last call (§4.8: "the compositor always
    /// asks the frame source at its own frame boundary; if no new
    /// frame is available, the previous frame is reused").
    pub fn fetch(&mut self) -> Option<RgbFrame> {
        match self {
            FrameSource::Camera(source) => source.fetch(),
            FrameSource::FileLoop(source) => source.fetch(),
            FrameSource::ExternalGenerator(source) => source.fetch(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            FrameSource::Camera(source) => source.dimensions(),
            FrameSource::FileLoop(source) => source.dimensions(),
            FrameSource::ExternalGenerator(source) => source.dimensions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_frame_black_is_zeroed_and_sized() {
        let frame = RgbFrame::black(4, 3);
        assert_eq!(frame.data.len(), 4 * 3 * 3);
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
