//! Grain processor (§4.3.4): a pool of up to 16 grain voices per
//! channel, reading from a short rolling history of the incoming
//! signal and scattering overlapping windowed copies back out.
//!
//! Chaos modulation comes from a shared [`LorenzGenerator`]; the right
//! channel consumes the same trajectory with inverted sign so the two
//! channels decorrelate instead of flipping in lockstep.

use kine_core::Sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::lorenz::LorenzGenerator;
use crate::{Processor, ProcessorConfig, StereoProcessor};

const MAX_GRAINS: usize = 16;
const MIN_GRAIN_MS: f64 = 20.0;
const MAX_GRAIN_MS: f64 = 100.0;
const HISTORY_SECONDS: f64 = 1.5;
const PITCH_CHOICES: [f64; 3] = [0.5, 1.0, 2.0];
const DIRECTION_FLIP_PROB: f64 = 0.3;
const PITCH_SHIFT_PROB: f64 = 0.2;
const PITCH_SHIFT_DENSITY_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy)]
struct Grain {
    active: bool,
    size: usize,
    env_pos: usize,
    direction: f64,
    pitch: f64,
    source_position: f64,
}

impl Grain {
    const fn silent() -> Self {
        Self {
            active: false,
            size: 0,
            env_pos: 0,
            direction: 1.0,
            pitch: 1.0,
            source_position: 0.0,
        }
    }

    #[inline]
    fn envelope(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        let t = self.env_pos as f64 / self.size as f64;
        0.5 - 0.5 * (2.0 * std::f64::consts::PI * t).cos()
    }
}

/// One channel's worth of grain voices plus the rolling history
/// buffer they read from.
#[derive(Debug, Clone)]
pub struct GrainChannel {
    history: Vec<Sample>,
    write_pos: usize,
    phase: f64,
    grains: Vec<Grain>,
    sample_rate: f64,
    rng: ChaCha8Rng,
}

impl GrainChannel {
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        let capacity = (sample_rate * HISTORY_SECONDS).ceil() as usize + 1;
        Self {
            history: vec![0.0; capacity.max(1)],
            write_pos: 0,
            phase: 0.0,
            grains: vec![Grain::silent(); MAX_GRAINS],
            sample_rate,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn write_history(&mut self, input: Sample) {
        let n = self.history.len();
        self.history[self.write_pos] = input;
        self.write_pos = (self.write_pos + 1) % n;
    }

    #[inline]
    fn read_history(&self, position: f64) -> Sample {
        let n = self.history.len() as f64;
        let wrapped = position.rem_euclid(n);
        let idx0 = wrapped as usize;
        let frac = wrapped - idx0 as f64;
        let idx1 = (idx0 + 1) % self.history.len();
        self.history[idx0] * (1.0 - frac) + self.history[idx1] * frac
    }

    fn spawn_grain(&mut self, density: f64, chaos: f64) {
        let slot = match self.grains.iter().position(|g| !g.active) {
            Some(slot) => slot,
            None => return,
        };

        let size_ms = self.rng.gen_range(MIN_GRAIN_MS..=MAX_GRAIN_MS);
        let size = ((size_ms / 1000.0) * self.sample_rate).round().max(1.0) as usize;

        let mut direction = if chaos >= 0.0 { 1.0 } else { -1.0 };
        if self.rng.gen_bool(DIRECTION_FLIP_PROB) {
            direction = -direction;
        }

        let mut pitch = PITCH_CHOICES[1];
        if density > PITCH_SHIFT_DENSITY_THRESHOLD && self.rng.gen_bool(PITCH_SHIFT_PROB) {
            pitch = PITCH_CHOICES[self.rng.gen_range(0..PITCH_CHOICES.len())];
        }

        let lookback = self.rng.gen_range(0.0..(self.history.len() as f64 * 0.9));
        let source_position =
            (self.write_pos as f64 - lookback).rem_euclid(self.history.len() as f64);

        self.grains[slot] = Grain {
            active: true,
            size,
            env_pos: 0,
            direction,
            pitch,
            source_position,
        };
    }

    /// Process one input sample: writes it into the rolling history,
    /// advances the birth phase accumulator (spawning a grain when it
    /// wraps), advances all active grains, and returns their summed,
    /// envelope-weighted output.
    #[inline]
    pub fn process(&mut self, input: Sample, density: f64, chaos: f64) -> Sample {
        self.write_history(input);

        self.phase += (density * 50.0 + 1.0) / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.spawn_grain(density, chaos);
        }

        let mut out = 0.0;
        let mut active_count = 0usize;
        for grain in self.grains.iter_mut() {
            if !grain.active {
                continue;
            }
            active_count += 1;
            let sample = self.history_sample(grain.source_position);
            out += sample * grain.envelope();

            grain.source_position =
                (grain.source_position + grain.direction * grain.pitch)
                    .rem_euclid(self.history.len() as f64);
            grain.env_pos += 1;
            if grain.env_pos >= grain.size {
                grain.active = false;
            }
        }

        if active_count > 1 {
            out / (active_count as f64).sqrt()
        } else {
            out
        }
    }

    #[inline]
    fn history_sample(&self, position: f64) -> Sample {
        self.read_history(position)
    }
}

impl Processor for GrainChannel {
    fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.phase = 0.0;
        self.grains.iter_mut().for_each(|g| *g = Grain::silent());
    }
}

impl ProcessorConfig for GrainChannel {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        let capacity = (sample_rate * HISTORY_SECONDS).ceil() as usize + 1;
        self.sample_rate = sample_rate;
        self.history = vec![0.0; capacity.max(1)];
        self.write_pos = 0;
    }
}

/// The stereo grain stage: two [`GrainChannel`]s sharing one
/// [`LorenzGenerator`], with the right channel reading the inverted
/// chaos trajectory.
#[derive(Debug, Clone)]
pub struct StereoGrain {
    left: GrainChannel,
    right: GrainChannel,
    lorenz: LorenzGenerator,
}

impl StereoGrain {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            left: GrainChannel::new(sample_rate, 0xC0FFEE),
            right: GrainChannel::new(sample_rate, 0xDECADE),
            lorenz: LorenzGenerator::new(),
        }
    }

    #[inline]
    pub fn process(&mut self, left: Sample, right: Sample, density: f64) -> (Sample, Sample) {
        let chaos = self.lorenz.step();
        let wet_l = self.left.process(left, density, chaos);
        let wet_r = self.right.process(right, density, -chaos);
        (wet_l, wet_r)
    }
}

impl Processor for StereoGrain {
    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.lorenz.reset();
    }
}

impl ProcessorConfig for StereoGrain {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.left.set_sample_rate(sample_rate);
        self.right.set_sample_rate(sample_rate);
    }
}

impl StereoProcessor for StereoGrain {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        self.process(left, right, 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_eventually_yields_silence_out() {
        let mut grain = StereoGrain::new(48_000.0);
        for _ in 0..96_000 {
            grain.process(0.0, 0.0, 0.5);
        }
        let (l, r) = grain.process(0.0, 0.0, 0.5);
        assert_eq!(l, 0.0);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn zero_density_keeps_output_finite() {
        let mut grain = StereoGrain::new(48_000.0);
        grain.process(1.0, 1.0, 0.0);
        let mut last = (0.0, 0.0);
        for _ in 0..1_000 {
            last = grain.process(0.0, 0.0, 0.0);
        }
        assert!(last.0.is_finite() && last.1.is_finite());
    }

    #[test]
    fn output_stays_finite_under_full_density() {
        let mut grain = StereoGrain::new(48_000.0);
        for i in 0..10_000 {
            let input = ((i as f64) * 0.01).sin();
            let (l, r) = grain.process(input, input, 1.0);
            assert!(l.is_finite());
            assert!(r.is_finite());
        }
    }
}
