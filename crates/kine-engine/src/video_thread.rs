//! The video/GL-submission thread (§4.7, §5): resolves the smoothed
//! parameter store into the compositor's per-frame inputs, reads the
//! display ring's latest waveform snapshots, peeks the pumped camera
//! frame, and submits one render request per tick.
//!
//! This thread never touches the GPU directly — [`CompositorHandle`]
//! marshals the request to the dedicated GL thread `kine_viz` owns
//! internally, blocking up to 1 s before degrading to a black frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use kine_core::ParamTag;
use kine_viz::{ChannelParams, CompositorHandle, CompositorParams, CHANNEL_COUNT};

use crate::frame_pump::FrameSlot;
use crate::orchestrator::CoreState;

/// Below this resolved intensity a channel layer is treated as
/// disabled (§4.7 step 2's per-channel `enabled` gate); there is no
/// separate boolean parameter for it, only a continuous intensity.
const CHANNEL_ENABLE_EPSILON: f32 = 1e-4;

const CHANNEL_TAGS: [(ParamTag, ParamTag, ParamTag, ParamTag); CHANNEL_COUNT] = [
    (
        ParamTag::Chan0Intensity,
        ParamTag::Chan0Rotation,
        ParamTag::Chan0Curve,
        ParamTag::Chan0PitchRatio,
    ),
    (
        ParamTag::Chan1Intensity,
        ParamTag::Chan1Rotation,
        ParamTag::Chan1Curve,
        ParamTag::Chan1PitchRatio,
    ),
    (
        ParamTag::Chan2Intensity,
        ParamTag::Chan2Rotation,
        ParamTag::Chan2Curve,
        ParamTag::Chan2PitchRatio,
    ),
    (
        ParamTag::Chan3Intensity,
        ParamTag::Chan3Rotation,
        ParamTag::Chan3Curve,
        ParamTag::Chan3PitchRatio,
    ),
];

fn resolve_channel_params(state: &CoreState) -> [ChannelParams; CHANNEL_COUNT] {
    std::array::from_fn(|i| {
        let (intensity_tag, rotation_tag, curve_tag, pitch_tag) = CHANNEL_TAGS[i];
        let intensity = state.params.read(intensity_tag) as f32;
        ChannelParams {
            enabled: intensity > CHANNEL_ENABLE_EPSILON,
            intensity,
            rotation_deg: state.params.read(rotation_tag) as f32,
            curve: state.params.read(curve_tag) as f32,
            pitch_ratio: state.params.read(pitch_tag) as f32,
        }
    })
}

fn resolve_compositor_params(state: &CoreState) -> CompositorParams {
    CompositorParams {
        base_hue: state.params.read(ParamTag::BaseHue) as f32,
        color_scheme_fader: state.params.read(ParamTag::ColorSchemeFader) as f32,
        blend_mode_fader: state.params.read(ParamTag::BlendModeFader) as f32,
        brightness: state.params.read(ParamTag::Brightness) as f32,
        region_map_enable: state.params.read(ParamTag::RegionMapEnable) >= 0.5,
        camera_mix: state.params.read(ParamTag::CameraMix) as f32,
    }
}

fn snapshot_waveforms(state: &CoreState) -> [Vec<f32>; CHANNEL_COUNT] {
    let mut scratch = Vec::new();
    std::array::from_fn(|i| {
        state.display.channel(i).snapshot(&mut scratch);
        scratch.iter().map(|&s| s as f32).collect()
    })
}

/// Spawns the video thread, ticking at `target_fps` until `shutdown` is
/// set. Every rendered frame is written into `latest_frame` for a
/// caller's windowing surface to pick up.
pub fn spawn(
    state: Arc<CoreState>,
    frames: FrameSlot,
    compositor: CompositorHandle,
    latest_frame: Arc<Mutex<Vec<u8>>>,
    shutdown: Arc<AtomicBool>,
    target_fps: f64,
) -> std::thread::JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / target_fps.max(1.0));
    std::thread::Builder::new()
        .name("kine-video".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                let waveforms = snapshot_waveforms(&state);
                let channel_params = resolve_channel_params(&state);
                let compositor_params = resolve_compositor_params(&state);
                let camera_frame = frames.peek();

                let pixels = compositor.render_frame(
                    waveforms,
                    channel_params,
                    compositor_params,
                    camera_frame,
                );
                *latest_frame.lock() = pixels;

                std::thread::sleep(period);
            }
        })
        .expect("failed to spawn kine-video thread")
}
