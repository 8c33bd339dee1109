//! File-loop frame source (§4.8): decodes an animated image file once
//! at load time and loops through its frames, advancing one frame per
//! `fetch()` call. Animated GIF is the one container `image` decodes
//! without an external codec library, which keeps this crate free of
//! a heavyweight multimedia dependency.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;

use crate::error::{VideoError, VideoResult};
use crate::RgbFrame;

pub struct FileLoopSource {
    frames: Vec<RgbFrame>,
    index: usize,
}

impl FileLoopSource {
    /// Decode every frame of an animated GIF up front. Fine for the
    /// short (seconds-long) loops this source is meant for; a
    /// multi-minute file would want streaming decode instead.
    pub fn open(path: &Path) -> VideoResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let gif_decoder = GifDecoder::new(reader)
            .map_err(|e| VideoError::OpenFailed(e.to_string()))?;

        let mut frames = Vec::new();
        for frame in gif_decoder.into_frames() {
            let frame = frame.map_err(|e| VideoError::DecodeFailed(e.to_string()))?;
            let buffer = frame.into_buffer();
            let (width, height) = buffer.dimensions();
            let mut rgb = Vec::with_capacity((width * height * 3) as usize);
            for pixel in buffer.pixels() {
                rgb.extend_from_slice(&pixel.0[..3]);
            }
            frames.push(RgbFrame::new(width, height, rgb));
        }

        if frames.is_empty() {
            return Err(VideoError::EmptyLoop);
        }

        Ok(Self { frames, index: 0 })
    }

    #[inline]
    pub fn fetch(&mut self) -> Option<RgbFrame> {
        let frame = self.frames[self.index].clone();
        self.index = (self.index + 1) % self.frames.len();
        Some(frame)
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.frames[0].dimensions()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_frame_source(width: u32, height: u32) -> FileLoopSource {
        FileLoopSource {
            frames: vec![RgbFrame::black(width, height)],
            index: 0,
        }
    }

    #[test]
    fn fetch_wraps_around_frame_count() {
        let mut source = FileLoopSource {
            frames: vec![RgbFrame::black(2, 2), RgbFrame::black(2, 2)],
            index: 0,
        };
        assert_eq!(source.index, 0);
        source.fetch();
        assert_eq!(source.index, 1);
        source.fetch();
        assert_eq!(source.index, 0);
    }

    #[test]
    fn dimensions_come_from_first_frame() {
        let source = single_frame_source(8, 6);
        assert_eq!(source.dimensions(), (8, 6));
    }
}
