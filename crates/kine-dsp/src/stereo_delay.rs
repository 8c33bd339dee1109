//! Stereo delay stage (§4.3.3): two independent delay lines, each with
//! a ring buffer of up to 2 s. Times for L/R are independently
//! controlled; feedback is shared and additionally scaled by 0.8 at
//! the summation point for safety.

use kine_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

const MAX_DELAY_SECONDS: f64 = 2.0;
const FEEDBACK_SAFETY_SCALE: f64 = 0.8;
const MAX_FEEDBACK: f64 = 0.95;

/// A single delay line with an internal ring buffer sized for the
/// maximum delay time at the configured sample rate.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
    delay_samples: usize,
    sample_rate: f64,
}

impl DelayLine {
    pub fn new(sample_rate: f64) -> Self {
        let capacity = (sample_rate * MAX_DELAY_SECONDS).ceil() as usize + 1;
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            delay_samples: 0,
            sample_rate,
        }
    }

    /// Set the delay time in seconds; `delay_samples = round(t * Sr)`,
    /// clamped to the buffer's capacity.
    pub fn set_time_seconds(&mut self, seconds: f64) {
        let max_samples = self.buffer.len().saturating_sub(1);
        let samples = (seconds.max(0.0) * self.sample_rate).round() as usize;
        self.delay_samples = samples.min(max_samples);
    }

    #[inline]
    fn read_pos(&self) -> usize {
        let n = self.buffer.len();
        (self.write_pos + n - self.delay_samples) % n
    }

    /// Process one sample: reads the delayed value, writes
    /// `input + delayed * feedback`, advances the write cursor.
    #[inline]
    pub fn process(&mut self, input: Sample, feedback: f64) -> Sample {
        let n = self.buffer.len();
        let delayed = self.buffer[self.read_pos()];
        let feedback = feedback.clamp(0.0, MAX_FEEDBACK) * FEEDBACK_SAFETY_SCALE;
        self.buffer[self.write_pos] = input + delayed * feedback;
        self.write_pos = (self.write_pos + 1) % n;
        delayed
    }
}

impl Processor for DelayLine {
    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}

impl ProcessorConfig for DelayLine {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let capacity = (sample_rate * MAX_DELAY_SECONDS).ceil() as usize + 1;
        self.buffer = vec![0.0; capacity.max(1)];
        self.write_pos = 0;
        self.delay_samples = 0;
    }
}

/// Two independent delay lines, one per channel, sharing a feedback
/// amount but not a delay time.
#[derive(Debug, Clone)]
pub struct StereoDelay {
    pub left: DelayLine,
    pub right: DelayLine,
}

impl StereoDelay {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            left: DelayLine::new(sample_rate),
            right: DelayLine::new(sample_rate),
        }
    }

    pub fn set_times_seconds(&mut self, left_seconds: f64, right_seconds: f64) {
        self.left.set_time_seconds(left_seconds);
        self.right.set_time_seconds(right_seconds);
    }

    #[inline]
    pub fn process(&mut self, left: Sample, right: Sample, feedback: f64) -> (Sample, Sample) {
        (
            self.left.process(left, feedback),
            self.right.process(right, feedback),
        )
    }
}

impl Processor for StereoDelay {
    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

impl ProcessorConfig for StereoDelay {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.left.set_sample_rate(sample_rate);
        self.right.set_sample_rate(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_reappears_after_delay_samples() {
        let mut line = DelayLine::new(48_000.0);
        line.set_time_seconds(10.0 / 48_000.0);
        line.process(1.0, 0.0);
        for _ in 0..9 {
            let out = line.process(0.0, 0.0);
            assert_eq!(out, 0.0);
        }
        let out = line.process(0.0, 0.0);
        assert!((out - 1.0).abs() < 1e-12);
    }

    #[test]
    fn feedback_is_clamped_and_scaled() {
        let mut line = DelayLine::new(48_000.0);
        line.set_time_seconds(1.0 / 48_000.0);
        line.process(1.0, 10.0);
        let fed_back = line.process(0.0, 0.0);
        assert!((fed_back - (1.0 * MAX_FEEDBACK * FEEDBACK_SAFETY_SCALE)).abs() < 1e-12);
    }

    #[test]
    fn delay_time_clamped_to_capacity() {
        let mut line = DelayLine::new(48_000.0);
        line.set_time_seconds(10.0);
        assert!(line.delay_samples <= line.buffer.len() - 1);
    }
}
