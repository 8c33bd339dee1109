//! The real-time audio callback engine (C2, §4.2): per-buffer mixer,
//! effect chain, sample-accurate CV emission, and the C6 display feed.
//!
//! Everything in [`CallbackEngine::process`] runs on the audio thread.
//! It allocates nothing, takes no locks (`ParameterStore` and
//! `ContourCursorState` are plain atomics), and does no I/O, per §5's
//! real-time contract.

use std::sync::Arc;

use kine_core::{
    ContourCursorState, DisplayBuffer, ParamTag, ParameterStore, VisionTrigger, DISPLAY_CHANNELS,
};
use kine_dsp::effect_chain::{EffectChain, EffectChainParams};
use kine_dsp::envelope::EnvelopeBank;

/// Track count fixed by §3's voice/mixer model.
pub const TRACK_COUNT: usize = 4;

#[inline]
fn constant_power_pan(gain: f64, pan: f64) -> (f64, f64) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f64::consts::FRAC_PI_4;
    (gain * angle.cos(), gain * angle.sin())
}

/// Owns the effect chain, the envelope/sequencer bank, and the
/// cross-thread handles (parameter store, vision cursor/trigger queue,
/// display ring) the callback reads and writes every buffer.
pub struct CallbackEngine {
    params: Arc<ParameterStore>,
    cursor: Arc<ContourCursorState>,
    trigger_rx: rtrb::Consumer<VisionTrigger>,
    display: Arc<DisplayBuffer>,
    chain: EffectChain,
    envelopes: EnvelopeBank,
    sample_rate: f64,
    display_step: f64,
}

impl CallbackEngine {
    pub fn new(
        params: Arc<ParameterStore>,
        cursor: Arc<ContourCursorState>,
        trigger_rx: rtrb::Consumer<VisionTrigger>,
        display: Arc<DisplayBuffer>,
        sample_rate: f64,
    ) -> Self {
        let display_step = display.decimation_step(sample_rate);
        Self {
            params,
            cursor,
            trigger_rx,
            display,
            chain: EffectChain::new(sample_rate),
            envelopes: EnvelopeBank::new(),
            sample_rate,
            display_step,
        }
    }

    /// Run one callback's worth of work. `input`/`output` are planar
    /// (channel-major) buffers of `frames` samples each, matching
    /// [`crate::stream::AudioCallback`]'s layout: `output` holds L, R,
    /// then CV1..CV5, each occupying a contiguous `frames`-sample run.
    pub fn process(&mut self, input: &[f64], output: &mut [f64], frames: usize) {
        // Step 1 (§4.2): advance C1's audio-side smoothing once per buffer.
        self.params.tick();
        self.drain_triggers();
        self.chain.apply_buffer_params(&self.read_chain_params());

        let track_gains = self.read_track_gains();
        let dt = 1.0 / self.sample_rate;
        let tau1 = self.params.read(ParamTag::Env1Tau).max(1e-4);
        let tau2 = self.params.read(ParamTag::Env2Tau).max(1e-4);
        let tau3 = self.params.read(ParamTag::Env3Tau).max(1e-4);
        let range1 = self.params.read(ParamTag::Seq1Range);
        let range2 = self.params.read(ParamTag::Seq2Range);
        let anchor_x = self.params.read(ParamTag::AnchorX);
        let anchor_y = self.params.read(ParamTag::AnchorY);

        // ENV1 (X>Y) / ENV2 (Y>X) run on hysteresis over the anchor
        // distance; that comparator only needs the buffer-latest
        // reading, so it is evaluated once per callback rather than
        // once per sample (§4.4's trigger policy is edge-triggered,
        // not a continuous per-sample recompute).
        let dx_buf = self.cursor.x() - anchor_x;
        let dy_buf = self.cursor.y() - anchor_y;
        self.envelopes.evaluate_triggers(dx_buf, dy_buf);

        for i in 0..frames {
            // Step 2: demux four mono inputs to four tracks, each with
            // its own gain/pan, summed to a stereo pair (constant-power).
            let mut in_l = 0.0;
            let mut in_r = 0.0;
            for (t, &(gl, gr)) in track_gains.iter().enumerate() {
                let sample = input.get(t * frames + i).copied().unwrap_or(0.0);
                in_l += sample * gl;
                in_r += sample * gr;
            }

            // Step 3: feed the effect chain, write stereo out on
            // channels 0/1.
            let (out_l, out_r) = self.chain.process_sample(in_l, in_r);
            output[i] = out_l;
            if output.len() > frames {
                output[frames + i] = out_r;
            }

            // Step 4: advance C4 per sample. dx/dy are re-read every
            // sample so SEQ1/SEQ2's CVs track the cursor continuously
            // even though the cursor itself only updates at video rate.
            let dx = self.cursor.x() - anchor_x;
            let dy = self.cursor.y() - anchor_y;
            let cvs = self.chain.tick_envelopes(
                &mut self.envelopes,
                dt,
                tau1,
                tau2,
                tau3,
                dx,
                dy,
                range1,
                range2,
            );
            for (ch, &cv) in cvs.iter().enumerate() {
                let out_idx = 2 + ch;
                if output.len() > out_idx * frames {
                    output[out_idx * frames + i] = cv;
                }
            }

            // Step 5: feed the display ring. Channels 0/1 carry the
            // post-chain stereo mix; channels 2/3 carry the raw inputs
            // of tracks 2/3 so every display channel has a source.
            self.display.channel(0).decimate_write(out_l, self.display_step);
            self.display.channel(1).decimate_write(out_r, self.display_step);
            for t in 2..DISPLAY_CHANNELS.min(TRACK_COUNT) {
                let sample = input.get(t * frames + i).copied().unwrap_or(0.0);
                self.display.channel(t).decimate_write(sample, self.display_step);
            }
        }
    }

    fn drain_triggers(&mut self) {
        while let Ok(trigger) = self.trigger_rx.pop() {
            if trigger == VisionTrigger::Env3 {
                self.envelopes.trigger_env3();
            }
            // ENV4 carries no envelope mapping of its own (§4.5); ENV1/
            // ENV2 are driven directly from anchor-distance hysteresis
            // above, not from the trigger queue.
        }
    }

    fn read_track_gains(&self) -> [(f64, f64); TRACK_COUNT] {
        let gain_tags = [
            ParamTag::TrackGain0,
            ParamTag::TrackGain1,
            ParamTag::TrackGain2,
            ParamTag::TrackGain3,
        ];
        let pan_tags = [
            ParamTag::TrackPan0,
            ParamTag::TrackPan1,
            ParamTag::TrackPan2,
            ParamTag::TrackPan3,
        ];
        std::array::from_fn(|t| {
            let gain = self.params.read(gain_tags[t]);
            let pan = self.params.read(pan_tags[t]);
            constant_power_pan(gain, pan)
        })
    }

    fn read_chain_params(&self) -> EffectChainParams {
        let p = &self.params;
        EffectChainParams {
            eq_low_db: p.read(ParamTag::EqLowGain),
            eq_mid_db: p.read(ParamTag::EqMidGain),
            eq_high_db: p.read(ParamTag::EqHighGain),
            delay_time_l: p.read(ParamTag::DelayTimeL),
            delay_time_r: p.read(ParamTag::DelayTimeR),
            delay_feedback: p.read(ParamTag::DelayFeedback),
            delay_wet: p.read(ParamTag::DelayWet),
            grain_density: p.read(ParamTag::GrainDensity),
            grain_wet: p.read(ParamTag::GrainWet),
            reverb_room: p.read(ParamTag::ReverbRoom),
            reverb_damping: p.read(ParamTag::ReverbDamping),
            reverb_decay: p.read(ParamTag::ReverbDecay),
            reverb_wet: p.read(ParamTag::ReverbWet),
            feedback_amount: p.read(ParamTag::FeedbackAmount),
            slice_length_knob: p.read(ParamTag::SliceLength),
            slice_scan: p.read(ParamTag::SliceScan),
            voice_count: p.read(ParamTag::VoiceCount).round().clamp(1.0, 8.0) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kine_core::vision_trigger_channel;

    fn make_engine() -> CallbackEngine {
        let params = Arc::new(ParameterStore::new());
        let cursor = ContourCursorState::new();
        let (_tx, rx) = vision_trigger_channel();
        let display = Arc::new(DisplayBuffer::new(960));
        CallbackEngine::new(params, cursor, rx, display, 48_000.0)
    }

    #[test]
    fn s2_silence_in_yields_silence_out_through_the_full_engine() {
        let mut engine = make_engine();
        let frames = 128;
        let input = vec![0.0f64; TRACK_COUNT * frames];
        let mut output = vec![0.0f64; 7 * frames];
        for _ in 0..200 {
            engine.process(&input, &mut output, frames);
        }
        assert!(output[frames - 1].abs() < 1e-6);
        assert!(output[2 * frames - 1].abs() < 1e-6);
    }

    #[test]
    fn track_gain_and_pan_reach_the_stereo_mix() {
        let mut engine = make_engine();
        engine.params.set_target(ParamTag::TrackGain0, 1.0);
        engine.params.set_target(ParamTag::TrackPan0, -1.0);
        for _ in 0..50 {
            engine.params.tick();
        }
        let frames = 64;
        let mut input = vec![0.0f64; TRACK_COUNT * frames];
        for i in 0..frames {
            input[i] = 1.0;
        }
        let mut output = vec![0.0f64; 7 * frames];
        engine.process(&input, &mut output, frames);
        let energy_l: f64 = output[..frames].iter().map(|s| s.abs()).sum();
        assert!(energy_l > 0.0);
    }

    #[test]
    fn cv_channels_carry_envelope_output_after_trigger() {
        let mut engine = make_engine();
        engine.envelopes.trigger_env3();
        let frames = 64;
        let input = vec![0.0f64; TRACK_COUNT * frames];
        let mut output = vec![0.0f64; 7 * frames];
        engine.process(&input, &mut output, frames);
        let cv3_channel_start = 4 * frames;
        assert!(output[cv3_channel_start] > 0.0);
    }
}
