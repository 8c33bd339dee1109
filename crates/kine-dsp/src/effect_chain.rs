//! The full effect chain (§4.3): wires the slice-loop sampler, the
//! feedback sum, 3-band EQ, stereo delay, grain processor, and stereo
//! reverb into one signal graph.
//!
//! ```text
//! input --> [+ slice-loop mix] --> [+ feedback] --> EQ --> delay (wet-mix)
//!        --> grain (wet-mix) --> reverb (wet-mix) --> output
//!                                                        |
//!                                        tanh-sanitize, scale, feed back
//!                                        into the pre-EQ summing node
//! ```
//!
//! The feedback path closes at the pre-EQ node using the *previous*
//! sample's output (§4.3.6), so across a full buffer the loop behaves
//! as a one-sample-delayed recirculation rather than an instantaneous
//! (and unstable) one.

use kine_core::Sample;

use crate::envelope::EnvelopeBank;
use crate::eq3band::StereoEq3Band;
use crate::grain::StereoGrain;
use crate::reverb::StereoReverb;
use crate::slice_sampler::SliceSampler;
use crate::stereo_delay::StereoDelay;
use crate::{Processor, ProcessorConfig};

const FEEDBACK_TANH_DRIVE: f64 = 0.3;
const FEEDBACK_OUTPUT_SCALE: f64 = 0.8;

/// Per-buffer parameter snapshot consumed by [`EffectChain::apply_buffer_params`].
/// Every field is already smoothed by the caller's [`kine_core::ParameterStore`]
/// tick — the chain itself holds no smoothing state.
#[derive(Debug, Clone, Copy)]
pub struct EffectChainParams {
    pub eq_low_db: f64,
    pub eq_mid_db: f64,
    pub eq_high_db: f64,
    pub delay_time_l: f64,
    pub delay_time_r: f64,
    pub delay_feedback: f64,
    pub delay_wet: f64,
    pub grain_density: f64,
    pub grain_wet: f64,
    pub reverb_room: f64,
    pub reverb_damping: f64,
    pub reverb_decay: f64,
    pub reverb_wet: f64,
    pub feedback_amount: f64,
    pub slice_length_knob: f64,
    pub slice_scan: f64,
    pub voice_count: u32,
}

#[inline]
fn sanitize(x: Sample) -> Sample {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

#[inline]
fn wet_mix(dry: Sample, wet: Sample, amount: f64) -> Sample {
    let amount = amount.clamp(0.0, 1.0);
    dry * (1.0 - amount) + wet * amount
}

/// Owns every stage of §4.3's signal graph and the cross-buffer
/// feedback state that closes the loop.
pub struct EffectChain {
    pub sampler: SliceSampler,
    eq: StereoEq3Band,
    delay: StereoDelay,
    grain: StereoGrain,
    reverb: StereoReverb,
    feedback: (Sample, Sample),
    grain_density: f64,
    delay_feedback: f64,
    delay_wet: f64,
    grain_wet: f64,
    reverb_wet: f64,
    feedback_amount: f64,
}

impl EffectChain {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sampler: SliceSampler::new(sample_rate),
            eq: StereoEq3Band::new(sample_rate),
            delay: StereoDelay::new(sample_rate),
            grain: StereoGrain::new(sample_rate),
            reverb: StereoReverb::new(sample_rate),
            feedback: (0.0, 0.0),
            grain_density: 0.0,
            delay_feedback: 0.0,
            delay_wet: 0.0,
            grain_wet: 0.0,
            reverb_wet: 0.0,
            feedback_amount: 0.0,
        }
    }

    /// Recompute every stage's per-buffer coefficients/partition. Must
    /// be called once at the start of each audio callback, before any
    /// `process_sample` calls for that buffer.
    pub fn apply_buffer_params(&mut self, params: &EffectChainParams) {
        self.eq
            .set_gains(params.eq_low_db, params.eq_mid_db, params.eq_high_db);
        self.delay
            .set_times_seconds(params.delay_time_l, params.delay_time_r);
        self.reverb
            .set_params(params.reverb_room, params.reverb_damping, params.reverb_decay);
        self.sampler.update_buffer_params(
            params.slice_length_knob,
            params.slice_scan,
            params.voice_count,
        );

        self.grain_density = params.grain_density;
        self.delay_feedback = params.delay_feedback;
        self.delay_wet = params.delay_wet;
        self.grain_wet = params.grain_wet;
        self.reverb_wet = params.reverb_wet;
        self.feedback_amount = params.feedback_amount;
    }

    /// Set the slice sampler's recording state (external trigger).
    pub fn set_recording(&mut self, recording: bool) {
        self.sampler.set_recording(recording);
    }

    /// Run one stereo sample through the full chain, emitting five
    /// trigger-bank CVs into `envelopes` along the way is the caller's
    /// job (the chain itself only carries audio); this just returns
    /// the processed stereo pair.
    #[inline]
    pub fn process_sample(&mut self, in_l: Sample, in_r: Sample) -> (Sample, Sample) {
        self.sampler.record_sample((in_l + in_r) * 0.5);
        let (slice_l, slice_r) = self.sampler.process_sample();

        let mixed_l = sanitize(in_l + slice_l + self.feedback.0);
        let mixed_r = sanitize(in_r + slice_r + self.feedback.1);

        let (eq_l, eq_r) = self.eq.process(mixed_l, mixed_r);
        let eq_l = sanitize(eq_l);
        let eq_r = sanitize(eq_r);

        let (delay_wet_l, delay_wet_r) = self.delay.process(eq_l, eq_r, self.delay_feedback);
        let post_delay_l = wet_mix(eq_l, sanitize(delay_wet_l), self.delay_wet);
        let post_delay_r = wet_mix(eq_r, sanitize(delay_wet_r), self.delay_wet);

        let (grain_wet_l, grain_wet_r) =
            self.grain
                .process(post_delay_l, post_delay_r, self.grain_density);
        let post_grain_l = wet_mix(post_delay_l, sanitize(grain_wet_l), self.grain_wet);
        let post_grain_r = wet_mix(post_delay_r, sanitize(grain_wet_r), self.grain_wet);

        let (reverb_wet_l, reverb_wet_r) = self.reverb.process(post_grain_l, post_grain_r);
        let out_l = sanitize(wet_mix(post_grain_l, sanitize(reverb_wet_l), self.reverb_wet));
        let out_r = sanitize(wet_mix(post_grain_r, sanitize(reverb_wet_r), self.reverb_wet));

        self.feedback = (
            sanitize((out_l * FEEDBACK_TANH_DRIVE).tanh() / FEEDBACK_TANH_DRIVE)
                * self.feedback_amount
                * FEEDBACK_OUTPUT_SCALE,
            sanitize((out_r * FEEDBACK_TANH_DRIVE).tanh() / FEEDBACK_TANH_DRIVE)
                * self.feedback_amount
                * FEEDBACK_OUTPUT_SCALE,
        );

        (out_l, out_r)
    }

    /// Drive an envelope bank's sample-rate tick from this chain's
    /// instantaneous state. The contour scanner (C5) supplies `dx`/`dy`
    /// at frame rate via shared atomics; this just forwards them into
    /// the bank every sample, as §4.4 requires.
    #[inline]
    pub fn tick_envelopes(
        &self,
        envelopes: &mut EnvelopeBank,
        dt: f64,
        tau1: f64,
        tau2: f64,
        tau3: f64,
        dx: f64,
        dy: f64,
        range1: f64,
        range2: f64,
    ) -> [Sample; 5] {
        envelopes.tick_audio(dt, tau1, tau2, tau3, dx, dy, range1, range2)
    }
}

impl Processor for EffectChain {
    fn reset(&mut self) {
        self.sampler.reset();
        self.eq.reset();
        self.delay.reset();
        self.grain.reset();
        self.reverb.reset();
        self.feedback = (0.0, 0.0);
    }
}

impl ProcessorConfig for EffectChain {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sampler.set_sample_rate(sample_rate);
        self.eq.set_sample_rate(sample_rate);
        self.delay.set_sample_rate(sample_rate);
        self.grain.set_sample_rate(sample_rate);
        self.reverb.set_sample_rate(sample_rate);
    }
}

impl Default for EffectChainParams {
    fn default() -> Self {
        Self {
            eq_low_db: 0.0,
            eq_mid_db: 0.0,
            eq_high_db: 0.0,
            delay_time_l: 0.25,
            delay_time_r: 0.375,
            delay_feedback: 0.3,
            delay_wet: 0.0,
            grain_density: 0.0,
            grain_wet: 0.0,
            reverb_room: 0.5,
            reverb_damping: 0.5,
            reverb_decay: 0.5,
            reverb_wet: 0.0,
            feedback_amount: 0.0,
            slice_length_knob: 0.5,
            slice_scan: 0.0,
            voice_count: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_silence_in_yields_silence_out() {
        let mut chain = EffectChain::new(48_000.0);
        chain.apply_buffer_params(&EffectChainParams::default());
        let mut last = (1.0, 1.0);
        for _ in 0..20_000 {
            last = chain.process_sample(0.0, 0.0);
        }
        assert!(last.0.abs() < 1e-6);
        assert!(last.1.abs() < 1e-6);
    }

    #[test]
    fn s1_impulse_reappears_through_delay() {
        let mut chain = EffectChain::new(48_000.0);
        let mut params = EffectChainParams::default();
        params.delay_wet = 1.0;
        params.delay_time_l = 100.0 / 48_000.0;
        params.delay_time_r = 100.0 / 48_000.0;
        params.delay_feedback = 0.0;
        chain.apply_buffer_params(&params);

        chain.process_sample(1.0, 1.0);
        let mut saw_energy = false;
        for _ in 0..200 {
            let (l, r) = chain.process_sample(0.0, 0.0);
            if l.abs() > 1e-6 || r.abs() > 1e-6 {
                saw_energy = true;
            }
        }
        assert!(saw_energy);
    }

    #[test]
    fn output_stays_finite_with_feedback_and_all_wets_hot() {
        let mut chain = EffectChain::new(48_000.0);
        let mut params = EffectChainParams::default();
        params.delay_wet = 1.0;
        params.grain_wet = 1.0;
        params.reverb_wet = 1.0;
        params.feedback_amount = 1.0;
        params.grain_density = 1.0;
        chain.apply_buffer_params(&params);

        for i in 0..50_000 {
            let input = ((i as f64) * 0.05).sin();
            let (l, r) = chain.process_sample(input, input);
            assert!(l.is_finite());
            assert!(r.is_finite());
        }
    }

    #[test]
    fn nan_input_is_sanitized_away() {
        let mut chain = EffectChain::new(48_000.0);
        chain.apply_buffer_params(&EffectChainParams::default());
        let (l, r) = chain.process_sample(f64::NAN, f64::INFINITY);
        assert!(l.is_finite());
        assert!(r.is_finite());
    }

    #[test]
    fn recording_then_playback_produces_slice_output() {
        let mut chain = EffectChain::new(48_000.0);
        chain.set_recording(true);
        for i in 0..48_000 {
            chain.process_sample((i as f64 * 0.01).sin(), (i as f64 * 0.01).sin());
        }
        chain.set_recording(false);

        let mut params = EffectChainParams::default();
        params.slice_length_knob = 0.3;
        chain.apply_buffer_params(&params);

        assert_eq!(chain.sampler.state(), crate::slice_sampler::SamplerState::Playing);
    }
}
