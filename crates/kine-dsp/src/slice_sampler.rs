//! Slice-loop sampler (§4.3.1): a loop buffer of up to 60 s, partitioned
//! into fixed-length slices, played back by 1-8 polyphonic voices.
//!
//! The sampler lives entirely on the audio callback thread — recording,
//! partitioning, and playback are all driven by the same `process`
//! call, so the "atomic pointer swap at recording-stop" and "partition
//! recomputed atomically at buffer boundary" guarantees in §4.3.1 and
//! §5 fall out for free: there is no second thread to race.

use kine_core::Sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{Processor, ProcessorConfig};

const MAX_LOOP_SECONDS: f64 = 60.0;
const MAX_VOICES: usize = 8;
const MIN_SLICE_SECONDS: f64 = 0.001;
const MAX_SLICE_SECONDS: f64 = 5.0;

/// Fixed per-voice-index stereo pan weights (§4.3.1). Voice 7 repeats
/// voice 3's full-left assignment verbatim, per the source table.
const PAN_TABLE: [(f64, f64); MAX_VOICES] = [
    (0.5, 0.5),     // 0: center
    (0.75, 0.25),   // 1
    (0.25, 0.75),   // 2
    (1.0, 0.0),     // 3: full L
    (0.0, 1.0),     // 4: full R
    (0.875, 0.125), // 5
    (0.125, 0.875), // 6
    (1.0, 0.0),     // 7: full L
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Recording,
    Playing,
}

/// One partition of the loop buffer. Coverage is total: every sample in
/// `[0, recorded_length)` belongs to exactly one slice (invariant 1,
/// §8), modulo rotation at the one-sample boundary introduced by a
/// non-zero scan origin.
#[derive(Debug, Clone, Copy)]
pub struct Slice {
    pub start: usize,
    pub end: usize,
    pub peak: f64,
    pub active: bool,
}

impl Slice {
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    slice_index: usize,
    position: f64,
    speed_multiplier: f64,
}

impl Voice {
    fn silent() -> Self {
        Self {
            slice_index: 0,
            position: 0.0,
            speed_multiplier: 1.0,
        }
    }
}

/// The slice-loop sampler: shadow recording buffer, committed main
/// buffer, its slice partition, and 1-8 playback voices.
pub struct SliceSampler {
    sample_rate: f64,
    state: SamplerState,
    shadow: Vec<Sample>,
    shadow_len: usize,
    main: Vec<Sample>,
    recorded_length: usize,
    slices: Vec<Slice>,
    voices: [Voice; MAX_VOICES],
    active_voice_count: usize,
    last_slice_seconds: f64,
    last_scan: f64,
    rng: ChaCha8Rng,
}

impl SliceSampler {
    pub fn new(sample_rate: f64) -> Self {
        let capacity = (sample_rate * MAX_LOOP_SECONDS).ceil() as usize;
        Self {
            sample_rate,
            state: SamplerState::Idle,
            shadow: vec![0.0; capacity],
            shadow_len: 0,
            main: Vec::new(),
            recorded_length: 0,
            slices: vec![Slice {
                start: 0,
                end: 0,
                peak: 0.0,
                active: false,
            }],
            voices: [Voice::silent(); MAX_VOICES],
            active_voice_count: 1,
            last_slice_seconds: -1.0,
            last_scan: -1.0,
            rng: ChaCha8Rng::seed_from_u64(0xBADC0FFE),
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn recorded_length(&self) -> usize {
        self.recorded_length
    }

    /// External `set_recording(bool)` transition (§4.3.1).
    pub fn set_recording(&mut self, recording: bool) {
        match (self.state, recording) {
            (SamplerState::Recording, false) => self.commit_recording(),
            (_, true) => {
                self.state = SamplerState::Recording;
                self.shadow_len = 0;
            }
            _ => {}
        }
    }

    fn commit_recording(&mut self) {
        self.main = self.shadow[..self.shadow_len].to_vec();
        self.recorded_length = self.shadow_len;
        self.state = if self.recorded_length > 0 {
            SamplerState::Playing
        } else {
            SamplerState::Idle
        };
        self.last_slice_seconds = -1.0;
        self.last_scan = -1.0;
    }

    /// Called once per buffer boundary (never mid-sample) to re-derive
    /// the slice partition from the smoothed `length`/`scan` parameters
    /// and, if voice count or scan changed, redistribute voices.
    pub fn update_buffer_params(&mut self, length_knob: f64, scan: f64, voice_count: u32) {
        let slice_seconds = Self::exp_slice_seconds(length_knob);
        let voice_count = (voice_count as usize).clamp(1, MAX_VOICES);

        let repartition = (slice_seconds - self.last_slice_seconds).abs() > 1e-9
            || (scan - self.last_scan).abs() > 1e-9;

        if repartition && self.recorded_length > 0 {
            self.partition(slice_seconds, scan);
            self.last_slice_seconds = slice_seconds;
            self.last_scan = scan;
        }

        if self.active_voice_count != voice_count || repartition {
            self.active_voice_count = voice_count;
            self.redistribute_voices(scan);
        }
    }

    /// Exponential knob mapping: length_knob in [0,1] -> seconds in
    /// `[0.001, 5]`.
    fn exp_slice_seconds(length_knob: f64) -> f64 {
        let t = length_knob.clamp(0.0, 1.0);
        let log_min = MIN_SLICE_SECONDS.ln();
        let log_max = MAX_SLICE_SECONDS.ln();
        (log_min + t * (log_max - log_min)).exp()
    }

    fn partition(&mut self, slice_seconds: f64, scan: f64) {
        let slice_samples = ((slice_seconds * self.sample_rate).round() as usize).max(1);
        let recorded = self.recorded_length;

        let mut slices = Vec::new();
        if slice_samples >= recorded {
            slices.push(self.make_slice(0, recorded));
        } else {
            let origin = (scan.rem_euclid(1.0) * slice_samples as f64).round() as usize
                % slice_samples;
            let mut start = 0usize;
            if origin > 0 {
                let first_len = (slice_samples - origin).min(recorded);
                slices.push(self.make_slice(0, first_len));
                start = first_len;
            }
            while start < recorded {
                let end = (start + slice_samples).min(recorded);
                slices.push(self.make_slice(start, end));
                start = end;
            }
        }
        self.slices = slices;
    }

    fn make_slice(&self, start: usize, end: usize) -> Slice {
        let mut peak = 0.0f64;
        for &s in &self.main[start..end] {
            peak = peak.max(s.abs());
        }
        Slice {
            start,
            end,
            peak,
            active: end > start,
        }
    }

    fn redistribute_voices(&mut self, scan: f64) {
        if self.slices.is_empty() {
            return;
        }
        let n = self.slices.len();

        // Voice 0 tracks the scan selection directly.
        let scan_index = ((scan.rem_euclid(1.0) * n as f64) as usize).min(n - 1);
        self.voices[0] = Voice {
            slice_index: scan_index,
            position: self.slices[scan_index].start as f64,
            speed_multiplier: 1.0,
        };

        for voice in self.voices.iter_mut().take(self.active_voice_count).skip(1) {
            let idx = self.rng.gen_range(0..n);
            let speed = self.rng.gen_range(-4.0..=4.0);
            voice.slice_index = idx;
            voice.position = self.slices[idx].start as f64;
            voice.speed_multiplier = speed;
        }

        for voice in self.voices.iter_mut() {
            voice.slice_index = voice.slice_index.min(n - 1);
        }
    }

    /// Render one stereo sample from the active voices. A no-op (silent
    /// output) when idle or recording.
    #[inline]
    pub fn process_sample(&mut self) -> (Sample, Sample) {
        if self.state == SamplerState::Recording {
            return (0.0, 0.0);
        }
        if self.state != SamplerState::Playing || self.main.is_empty() {
            return (0.0, 0.0);
        }

        let mut sum_l = 0.0;
        let mut sum_r = 0.0;
        let mut pan_sq_l = 0.0;
        let mut pan_sq_r = 0.0;

        for (i, voice) in self.voices.iter_mut().take(self.active_voice_count).enumerate() {
            let slice = self.slices[voice.slice_index.min(self.slices.len() - 1)];
            if !slice.active || slice.len() == 0 {
                continue;
            }

            let len = slice.len() as f64;
            let rel = (voice.position - slice.start as f64).rem_euclid(len);
            voice.position = slice.start as f64 + rel;

            let idx0 = voice.position as usize;
            let idx1 = if idx0 + 1 < slice.end {
                idx0 + 1
            } else {
                slice.start
            };
            let frac = voice.position - idx0 as f64;
            let sample = self.main[idx0] * (1.0 - frac) + self.main[idx1] * frac;

            let (pan_l, pan_r) = PAN_TABLE[i.min(MAX_VOICES - 1)];
            sum_l += sample * pan_l;
            sum_r += sample * pan_r;
            pan_sq_l += pan_l * pan_l;
            pan_sq_r += pan_r * pan_r;

            voice.position += voice.speed_multiplier;
        }

        let norm_l = if pan_sq_l > 0.0 { pan_sq_l.sqrt() } else { 1.0 };
        let norm_r = if pan_sq_r > 0.0 { pan_sq_r.sqrt() } else { 1.0 };
        (sum_l / norm_l, sum_r / norm_r)
    }

    /// Append one mono sample to the shadow buffer while recording.
    /// Silently truncates once the shadow buffer is full (§4.3.7).
    #[inline]
    pub fn record_sample(&mut self, mono_input: Sample) {
        if self.state != SamplerState::Recording {
            return;
        }
        if self.shadow_len < self.shadow.len() {
            self.shadow[self.shadow_len] = mono_input;
            self.shadow_len += 1;
        }
    }
}

impl Processor for SliceSampler {
    fn reset(&mut self) {
        self.state = SamplerState::Idle;
        self.shadow_len = 0;
        self.main.clear();
        self.recorded_length = 0;
        self.slices = vec![Slice {
            start: 0,
            end: 0,
            peak: 0.0,
            active: false,
        }];
        self.voices = [Voice::silent(); MAX_VOICES];
    }
}

impl ProcessorConfig for SliceSampler {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let capacity = (sample_rate * MAX_LOOP_SECONDS).ceil() as usize;
        self.shadow = vec![0.0; capacity];
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_silence(sampler: &mut SliceSampler, seconds: f64, sample_rate: f64) {
        sampler.set_recording(true);
        let n = (seconds * sample_rate) as usize;
        for _ in 0..n {
            sampler.record_sample(0.0);
        }
        sampler.set_recording(false);
    }

    #[test]
    fn s3_slice_partition_matches_spec_scenario() {
        let sr = 48_000.0;
        let mut sampler = SliceSampler::new(sr);
        record_silence(&mut sampler, 2.0, sr);
        sampler.update_buffer_params(slice_seconds_to_knob(0.5), 0.0, 1);

        let bounds: Vec<usize> = sampler
            .slices()
            .iter()
            .flat_map(|s| [s.start, s.end])
            .collect();
        assert_eq!(sampler.slices().len(), 4);
        assert_eq!(sampler.slices()[0].start, 0);
        assert_eq!(sampler.slices()[0].end, 24_000);
        assert_eq!(sampler.slices()[3].end, 96_000);
        assert!(bounds.contains(&48_000));
        assert!(bounds.contains(&72_000));
    }

    #[test]
    fn partition_is_a_total_cover_with_no_gaps() {
        let sr = 48_000.0;
        let mut sampler = SliceSampler::new(sr);
        record_silence(&mut sampler, 1.7, sr);
        sampler.update_buffer_params(slice_seconds_to_knob(0.2), 0.37, 3);

        let slices = sampler.slices();
        assert_eq!(slices[0].start, 0);
        assert_eq!(slices.last().unwrap().end, sampler.recorded_length());
        for pair in slices.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn voice_slice_index_always_valid_after_redistribution() {
        let sr = 48_000.0;
        let mut sampler = SliceSampler::new(sr);
        record_silence(&mut sampler, 0.5, sr);
        sampler.update_buffer_params(slice_seconds_to_knob(0.05), 0.2, 8);

        for _ in 0..1000 {
            sampler.process_sample();
        }

        for voice in sampler.voices.iter().take(sampler.active_voice_count) {
            assert!(voice.slice_index < sampler.slices.len());
            let slice = sampler.slices[voice.slice_index];
            assert!(slice.active);
            assert!(voice.position >= slice.start as f64 - 1.0);
            assert!(voice.position <= slice.end as f64 + 1.0);
        }
    }

    #[test]
    fn idle_sampler_is_silent() {
        let mut sampler = SliceSampler::new(48_000.0);
        assert_eq!(sampler.process_sample(), (0.0, 0.0));
    }

    /// Inverse of `exp_slice_seconds`, used only by tests to target an
    /// exact slice duration.
    fn slice_seconds_to_knob(seconds: f64) -> f64 {
        let log_min = MIN_SLICE_SECONDS.ln();
        let log_max = MAX_SLICE_SECONDS.ln();
        (seconds.ln() - log_min) / (log_max - log_min)
    }
}
