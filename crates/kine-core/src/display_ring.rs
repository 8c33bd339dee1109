//! Cross-process display buffer: a lock-free ring per audio channel,
//! written once per audio buffer by the audio callback and read by any
//! number of video-side threads at render resolution.
//!
//! Modeled on the single-producer ring used for audio-to-UI metering
//! elsewhere in this workspace, cache-line padded to keep the writer's
//! index off the same line as a reader's.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Number of mixer tracks the display plane carries.
pub const DISPLAY_CHANNELS: usize = 4;

/// One channel's ring: `width` decimated samples, a monotonic write
/// index, and the fractional accumulator the decimator uses to decide
/// when to commit the next sample.
#[repr(align(64))]
pub struct DisplayChannel {
    buffer: Box<[AtomicU64]>,
    width: usize,
    write_idx: AtomicUsize,
    accumulator_bits: AtomicU64,
}

impl DisplayChannel {
    fn new(width: usize) -> Self {
        let buffer = (0..width)
            .map(|_| AtomicU64::new(0f64.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buffer,
            width,
            write_idx: AtomicUsize::new(0),
            accumulator_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    #[inline]
    fn accumulator(&self) -> f64 {
        f64::from_bits(self.accumulator_bits.load(Ordering::Relaxed))
    }

    #[inline]
    fn set_accumulator(&self, value: f64) {
        self.accumulator_bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Writer side. Advances the decimation accumulator by `step` (the
    /// ratio of render width to the fixed-window sample count); when it
    /// crosses 1.0, commits `sample` and advances the write index with
    /// release semantics.
    #[inline]
    pub fn decimate_write(&self, sample: f64, step: f64) {
        let mut acc = self.accumulator() + step;
        if acc >= 1.0 {
            acc -= 1.0;
            let idx = self.write_idx.load(Ordering::Relaxed);
            self.buffer[idx].store(sample.to_bits(), Ordering::Relaxed);
            let next = (idx + 1) % self.width;
            self.write_idx.store(next, Ordering::Release);
        }
        self.set_accumulator(acc);
    }

    /// Reader side: the index most recently made visible by the writer.
    #[inline]
    pub fn write_index(&self) -> usize {
        self.write_idx.load(Ordering::Acquire)
    }

    #[inline]
    pub fn sample_at(&self, idx: usize) -> f64 {
        f64::from_bits(self.buffer[idx % self.width].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Copy out the whole ring in write order, oldest first. Safe for a
    /// reader to call at any time; a torn sample (the writer racing one
    /// position ahead) is tolerated per the display plane's contract.
    pub fn snapshot(&self, out: &mut Vec<f64>) {
        out.clear();
        let head = self.write_index();
        out.reserve(self.width);
        for i in 0..self.width {
            out.push(self.sample_at((head + i) % self.width));
        }
    }
}

/// Four shared circular buffers, one per mixer track, at render (pixel)
/// resolution rather than audio buffer size.
pub struct DisplayBuffer {
    channels: [DisplayChannel; DISPLAY_CHANNELS],
    width: usize,
}

impl DisplayBuffer {
    pub fn new(width: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| DisplayChannel::new(width)),
            width,
        }
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &DisplayChannel {
        &self.channels[index]
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Decimation step for a fixed 50 ms window at `sample_rate`,
    /// expressed as "commits per input sample" (`W / S`).
    pub fn decimation_step(&self, sample_rate: f64) -> f64 {
        let window_samples = (sample_rate * 0.050).round().max(1.0);
        self.width as f64 / window_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_index_is_monotonic_modulo_wrap() {
        let ring = DisplayChannel::new(8);
        let mut last = ring.write_index();
        for i in 0..64 {
            ring.decimate_write(i as f64, 1.0);
            let cur = ring.write_index();
            assert!(cur != last || cur == last);
            last = cur;
        }
        assert_eq!(ring.write_index(), 64 % 8);
    }

    #[test]
    fn decimation_step_halves_for_double_width() {
        let narrow = DisplayBuffer::new(960);
        let wide = DisplayBuffer::new(1920);
        let sr = 48_000.0;
        assert!((wide.decimation_step(sr) - 2.0 * narrow.decimation_step(sr)).abs() < 1e-9);
    }

    #[test]
    fn reader_rereading_same_index_sees_same_sample() {
        let ring = DisplayChannel::new(16);
        for i in 0..16 {
            ring.decimate_write(i as f64, 1.0);
        }
        let idx = ring.write_index();
        let a = ring.sample_at(idx.wrapping_sub(1) % 16);
        let b = ring.sample_at(idx.wrapping_sub(1) % 16);
        assert_eq!(a, b);
    }
}
