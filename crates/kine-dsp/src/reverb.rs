//! Stereo reverb stage (§4.3.5): two Schroeder-style units, one per
//! channel, with differing buffer sizes for stereo spread (the right
//! channel adds 23 samples to each comb/allpass delay). Each unit is
//! 4 parallel damped combs, 4 serial allpasses, and a DC-blocking
//! highpass at 100 Hz.

use kine_core::Sample;

use crate::{Processor, ProcessorConfig};

/// Base comb delay lengths in milliseconds, tuned for mutual
/// primeness (avoids resonant reinforcement between combs).
const COMB_BASE_MS: [f64; 4] = [29.7, 37.1, 41.1, 43.7];
/// Serial allpass delay lengths in milliseconds.
const ALLPASS_BASE_MS: [f64; 4] = [5.0, 1.7, 0.9, 0.6];
const ALLPASS_GAIN: f64 = 0.5;
const HIGHPASS_CUTOFF_HZ: f64 = 100.0;
const RIGHT_CHANNEL_OFFSET_SAMPLES: usize = 23;

/// One damped feedback comb filter, per §4.3.5's recurrence.
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<Sample>,
    write_pos: usize,
    lowpass_state: f64,
    feedback: f64,
    damping_coeff: f64,
    room_scale: f64,
}

impl Comb {
    fn new(length_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; length_samples.max(1)],
            write_pos: 0,
            lowpass_state: 0.0,
            feedback: 0.5,
            damping_coeff: 0.5,
            room_scale: 0.3,
        }
    }

    fn set_params(&mut self, decay: f64, damping: f64, room: f64) {
        self.feedback = (0.5 + decay.clamp(0.0, 1.0) * 0.485).clamp(0.5, 0.985);
        self.damping_coeff = 0.05 + damping.clamp(0.0, 1.0) * 0.9;
        self.room_scale = 0.3 + room.clamp(0.0, 1.0) * 1.4;
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let out = self.buffer[self.write_pos];
        self.lowpass_state += (out - self.lowpass_state) * self.damping_coeff;
        self.buffer[self.write_pos] = input * self.room_scale + self.lowpass_state * self.feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.lowpass_state = 0.0;
    }
}

/// Fixed-coefficient allpass diffuser.
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<Sample>,
    write_pos: usize,
}

impl Allpass {
    fn new(length_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; length_samples.max(1)],
            write_pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let buffered = self.buffer[self.write_pos];
        let out = -input + buffered;
        self.buffer[self.write_pos] = input + buffered * ALLPASS_GAIN;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        out
    }

    fn reset(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}

/// One-pole DC blocker: a highpass at a low cutoff that removes the
/// slow drift otherwise accumulated by the comb/allpass chain.
#[derive(Debug, Clone)]
struct DcBlocker {
    coeff: f64,
    prev_in: f64,
    prev_out: f64,
}

impl DcBlocker {
    fn new(cutoff_hz: f64, sample_rate: f64) -> Self {
        let coeff = (-2.0 * std::f64::consts::PI * cutoff_hz / sample_rate).exp();
        Self {
            coeff,
            prev_in: 0.0,
            prev_out: 0.0,
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.coeff = (-2.0 * std::f64::consts::PI * HIGHPASS_CUTOFF_HZ / sample_rate).exp();
    }

    #[inline]
    fn process(&mut self, input: Sample) -> Sample {
        let out = input - self.prev_in + self.coeff * self.prev_out;
        self.prev_in = input;
        self.prev_out = out;
        out
    }

    fn reset(&mut self) {
        self.prev_in = 0.0;
        self.prev_out = 0.0;
    }
}

/// One full Schroeder unit: 4 parallel combs summed, through 4 serial
/// allpasses, through a DC-blocking highpass.
#[derive(Debug, Clone)]
pub struct ReverbUnit {
    combs: [Comb; 4],
    allpasses: [Allpass; 4],
    dc_blocker: DcBlocker,
}

impl ReverbUnit {
    fn new(sample_rate: f64, sample_offset: usize) -> Self {
        let comb_samples = |ms: f64| ((ms / 1000.0) * sample_rate).round() as usize + sample_offset;
        let allpass_samples =
            |ms: f64| ((ms / 1000.0) * sample_rate).round() as usize + sample_offset;

        Self {
            combs: COMB_BASE_MS.map(|ms| Comb::new(comb_samples(ms))),
            allpasses: ALLPASS_BASE_MS.map(|ms| Allpass::new(allpass_samples(ms))),
            dc_blocker: DcBlocker::new(HIGHPASS_CUTOFF_HZ, sample_rate),
        }
    }

    pub fn set_params(&mut self, room: f64, damping: f64, decay: f64) {
        for comb in self.combs.iter_mut() {
            comb.set_params(decay, damping, room);
        }
    }

    #[inline]
    pub fn process(&mut self, input: Sample) -> Sample {
        let mut sum = 0.0;
        for comb in self.combs.iter_mut() {
            sum += comb.process(input);
        }
        sum *= 0.25;

        for allpass in self.allpasses.iter_mut() {
            sum = allpass.process(sum);
        }

        self.dc_blocker.process(sum)
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::reset);
        self.allpasses.iter_mut().for_each(Allpass::reset);
        self.dc_blocker.reset();
    }
}

/// Stereo reverb: two independently-sized [`ReverbUnit`]s.
#[derive(Debug, Clone)]
pub struct StereoReverb {
    left: ReverbUnit,
    right: ReverbUnit,
    sample_rate: f64,
}

impl StereoReverb {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            left: ReverbUnit::new(sample_rate, 0),
            right: ReverbUnit::new(sample_rate, RIGHT_CHANNEL_OFFSET_SAMPLES),
            sample_rate,
        }
    }

    pub fn set_params(&mut self, room: f64, damping: f64, decay: f64) {
        self.left.set_params(room, damping, decay);
        self.right.set_params(room, damping, decay);
    }

    #[inline]
    pub fn process(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        (self.left.process(left), self.right.process(right))
    }
}

impl Processor for StereoReverb {
    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

impl ProcessorConfig for StereoReverb {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        *self = Self::new(sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_produces_decaying_tail() {
        let mut reverb = StereoReverb::new(48_000.0);
        reverb.set_params(0.5, 0.5, 0.5);
        let (mut first_tail, mut later_tail) = (0.0, 0.0);
        for i in 0..20_000 {
            let input = if i == 0 { 1.0 } else { 0.0 };
            let (l, _) = reverb.process(input, 0.0);
            if i == 200 {
                first_tail = l.abs();
            }
            if i == 19_000 {
                later_tail = l.abs();
            }
        }
        assert!(later_tail <= first_tail + 1e-6);
    }

    #[test]
    fn silence_in_yields_silence_out() {
        let mut reverb = StereoReverb::new(48_000.0);
        reverb.set_params(0.5, 0.5, 0.9);
        let mut last = (1.0, 1.0);
        for _ in 0..10_000 {
            last = reverb.process(0.0, 0.0);
        }
        assert!(last.0.abs() < 1e-9);
        assert!(last.1.abs() < 1e-9);
    }

    #[test]
    fn right_channel_uses_offset_buffers() {
        let reverb = StereoReverb::new(48_000.0);
        assert_ne!(
            reverb.left.combs[0].buffer.len(),
            reverb.right.combs[0].buffer.len()
        );
    }

    #[test]
    fn decay_parameter_maps_into_feedback_range() {
        let mut comb = Comb::new(100);
        comb.set_params(0.0, 0.5, 0.5);
        assert!((comb.feedback - 0.5).abs() < 1e-9);
        comb.set_params(1.0, 0.5, 0.5);
        assert!((comb.feedback - 0.985).abs() < 1e-9);
    }
}
