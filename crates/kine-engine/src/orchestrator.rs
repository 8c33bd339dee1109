//! The top-level orchestrator (§9): owns the single state struct, spawns
//! and joins the audio, vision, frame-pump, video, and MIDI threads, and
//! exposes the programmatic `start`/`stop`/`set_target` interface (§6).
//!
//! Thread model (§5):
//! - the audio callback thread is driven by the audio driver via
//!   [`kine_audio::AudioStream`];
//! - the vision thread runs the contour scanner (C5) at its own rate;
//! - the frame-pump thread fans the single [`kine_video::FrameSource`]
//!   out to the vision and video threads ([`crate::frame_pump`]);
//! - the video thread drives the GPU compositor (C7) through its own
//!   dedicated GL thread, owned internally by `CompositorThread`;
//! - the MIDI consult thread resolves CC events against the MIDI-learn
//!   table (§9 Design Notes).
//!
//! None of these threads hold a `Result` across a real-time boundary
//! (§7): setup failures here are the one place this crate surfaces a
//! fallible `CoreResult`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use kine_core::{
    vision_trigger_channel, ContourCursorState, CoreError, CoreResult, DisplayBuffer,
    MidiLearnDocument, MidiLearnTable, ParamDocument, ParamTag, ParameterStore,
};
use kine_vision::ContourScanner;
use kine_video::{CameraSource, ExternalGeneratorSlot, ExternalGeneratorSource, FrameSource};
use kine_viz::{CompositorHandle, CompositorThread};

use crate::config::{CoreConfig, FrameSourceKind};
use crate::frame_pump::{self, FrameSlot};
use crate::midi::{self, MidiEvent};
use crate::video_thread;

/// Process-wide state reachable by reference from every thread (§9:
/// "do not use hidden globals"). Nothing here is behind a lock except
/// the MIDI-learn table, which only the (non-realtime) MIDI and UI
/// threads ever touch.
pub struct CoreState {
    pub params: Arc<ParameterStore>,
    pub cursor: Arc<ContourCursorState>,
    pub display: Arc<DisplayBuffer>,
    pub midi_table: Arc<RwLock<MidiLearnTable>>,
}

impl CoreState {
    fn new(display_width: usize) -> Arc<Self> {
        Arc::new(Self {
            params: Arc::new(ParameterStore::new()),
            cursor: ContourCursorState::new(),
            display: Arc::new(DisplayBuffer::new(display_width)),
            midi_table: Arc::new(RwLock::new(MidiLearnTable::new())),
        })
    }
}

/// Externally supplied frame producers a caller wires up before
/// calling `start` — actual camera/OS capture and the external
/// generator process are out of scope (§1) and opaque (§4.8); this
/// crate only consumes whichever one `video.frame_source` selects.
pub enum FrameProducer {
    Camera {
        receiver: crossbeam_channel::Receiver<kine_video::RgbFrame>,
    },
    FileLoop {
        path: std::path::PathBuf,
    },
    ExternalGenerator {
        slot: ExternalGeneratorSlot,
    },
}

/// The running core. Dropping/`stop`-ping joins every thread it owns
/// within the cooperative-cancellation budget (§9: "joining on stop
/// must complete within 500 ms").
pub struct CoreHandle {
    state: Arc<CoreState>,
    shutdown: Arc<AtomicBool>,
    audio_stream: kine_audio::AudioStream,
    /// Kept only to join the GL thread when this handle drops; never
    /// read directly — rendering goes through the cloned handle below.
    #[allow(dead_code)]
    compositor: CompositorThread,
    midi_tx: crossbeam_channel::Sender<MidiEvent>,
    threads: Vec<std::thread::JoinHandle<()>>,
    latest_frame: Arc<Mutex<Vec<u8>>>,
    persistence_path: Option<std::path::PathBuf>,
}

impl CoreHandle {
    /// Write a parameter target (§6 `set_target`). Callable from any
    /// thread, including the GUI/MIDI-learn path — never blocks.
    pub fn set_target(&self, tag: ParamTag, value: f64) {
        self.state.params.set_target(tag, value);
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.state.params
    }

    pub fn midi_sender(&self) -> crossbeam_channel::Sender<MidiEvent> {
        self.midi_tx.clone()
    }

    pub fn midi_table(&self) -> &Arc<RwLock<MidiLearnTable>> {
        &self.state.midi_table
    }

    /// The most recently composited RGBA8 frame (§6 "video output"),
    /// for a caller's windowing surface to present. Updated by the
    /// video thread at its own frame rate.
    pub fn latest_frame(&self) -> Vec<u8> {
        self.latest_frame.lock().clone()
    }

    pub fn audio_xrun_count(&self) -> u64 {
        self.audio_stream.xrun_count()
    }

    /// Save the current parameter and MIDI-learn state to
    /// `persistence_path` (§6, §A5). UI-thread only, fallible.
    pub fn save(&self) -> CoreResult<()> {
        let path = self
            .persistence_path
            .as_deref()
            .ok_or_else(|| CoreError::FatalStartup("no persistence_path configured".into()))?;
        self.state.params.snapshot().save(path)?;
        let midi_path = midi_sidecar_path(path);
        let doc = MidiLearnDocument {
            bindings: self.state.midi_table.read().bindings_snapshot(),
        };
        doc.save(midi_path)?;
        Ok(())
    }

    /// Load parameter and MIDI-learn state from `persistence_path`, if
    /// one is configured and a document exists there.
    pub fn load(&self) -> CoreResult<()> {
        let path = self
            .persistence_path
            .as_deref()
            .ok_or_else(|| CoreError::FatalStartup("no persistence_path configured".into()))?;
        if path.exists() {
            let doc = ParamDocument::load(path)?;
            self.state.params.restore(&doc);
        }
        let midi_path = midi_sidecar_path(path);
        if midi_path.exists() {
            let doc = MidiLearnDocument::load(midi_path)?;
            let mut table = MidiLearnTable::new();
            for (tag, binding) in doc.bindings {
                table.bind(tag, binding);
            }
            *self.state.midi_table.write() = table;
        }
        Ok(())
    }

    /// Stop every thread this handle owns. Sets the shared shutdown
    /// flag, stops the audio stream, and joins the vision/frame-pump/
    /// video/MIDI threads; the GL thread is joined by `CompositorThread`'s
    /// own `Drop` when this handle is dropped.
    pub fn stop(mut self) -> CoreResult<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        self.audio_stream
            .stop()
            .map_err(|e| CoreError::FatalStartup(e.to_string()))?;
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn midi_sidecar_path(path: &Path) -> std::path::PathBuf {
    let mut p = path.to_path_buf();
    let stem = p.file_stem().map(|s| s.to_owned()).unwrap_or_default();
    p.set_file_name(format!("{}.midi.json", stem.to_string_lossy()));
    p
}

/// Start the core: opens the audio device, builds the frame source,
/// and spawns every thread (§6 `start(audio_cfg, video_cfg) -> handle`).
/// Any device/context failure here is a `FatalStartupError` — the core
/// refuses to enter run state (§7).
pub fn start(config: CoreConfig, frame_producer: FrameProducer) -> CoreResult<CoreHandle> {
    let state = CoreState::new(config.video.width as usize);
    let shutdown = Arc::new(AtomicBool::new(false));

    let sample_rate = config.audio.sample_rate.as_f64();
    let buffer_frames = config.audio.buffer_size.as_usize();

    let (trigger_tx, trigger_rx) = vision_trigger_channel();

    let mut engine = kine_audio::CallbackEngine::new(
        Arc::clone(&state.params),
        Arc::clone(&state.cursor),
        trigger_rx,
        Arc::clone(&state.display),
        sample_rate,
    );

    let output_device = kine_audio::get_default_output_device()
        .map_err(|e| CoreError::FatalStartup(format!("audio output device: {e}")))?;
    let input_device = kine_audio::get_default_input_device()
        .map_err(|e| CoreError::FatalStartup(format!("audio input device: {e}")))?;

    let callback: kine_audio::AudioCallback = Box::new(move |input, output| {
        engine.process(input, output, buffer_frames);
    });

    let audio_stream = kine_audio::AudioStream::new(
        &output_device,
        &input_device,
        config.audio.into(),
        callback,
    )
    .map_err(|e| CoreError::FatalStartup(format!("audio stream: {e}")))?;
    audio_stream
        .start()
        .map_err(|e| CoreError::FatalStartup(format!("audio stream start: {e}")))?;

    let frame_source = build_frame_source(config.video.frame_source, frame_producer)?;

    let vision_slot = FrameSlot::new();
    let video_slot = FrameSlot::new();
    let pump_thread = frame_pump::spawn(
        frame_source,
        vision_slot.clone(),
        video_slot.clone(),
        Arc::clone(&shutdown),
    );

    let vision_thread = spawn_vision_thread(
        Arc::clone(&state),
        vision_slot,
        Arc::clone(&shutdown),
        trigger_tx,
        config.vision.target_fps,
    );

    let compositor = CompositorThread::spawn(
        config.video.width,
        config.video.height,
        config.video.width as usize,
    );
    let compositor_handle = compositor.handle();
    let latest_frame = Arc::new(Mutex::new(vec![
        0u8;
        (config.video.width * config.video.height * 4)
            as usize
    ]));

    let video_thread = video_thread::spawn(
        Arc::clone(&state),
        video_slot,
        compositor_handle,
        Arc::clone(&latest_frame),
        Arc::clone(&shutdown),
        config.video.target_fps,
    );

    let (midi_tx, midi_rx) = midi::midi_event_channel();
    let midi_thread = midi::spawn_consult_thread(
        midi_rx,
        Arc::clone(&state.midi_table),
        Arc::clone(&state.params),
        Arc::clone(&shutdown),
    );

    Ok(CoreHandle {
        state,
        shutdown,
        audio_stream,
        compositor,
        midi_tx,
        threads: vec![pump_thread, vision_thread, video_thread, midi_thread],
        latest_frame,
        persistence_path: config.persistence_path,
    })
}

fn build_frame_source(
    kind: FrameSourceKind,
    producer: FrameProducer,
) -> CoreResult<FrameSource> {
    match (kind, producer) {
        (FrameSourceKind::Camera, FrameProducer::Camera { receiver }) => {
            Ok(FrameSource::Camera(CameraSource::new(receiver, 640, 480)))
        }
        (FrameSourceKind::FileLoop, FrameProducer::FileLoop { path }) => {
            let source = kine_video::FileLoopSource::open(&path)
                .map_err(|e| CoreError::FatalStartup(format!("file-loop source: {e}")))?;
            Ok(FrameSource::FileLoop(source))
        }
        (FrameSourceKind::ExternalGenerator, FrameProducer::ExternalGenerator { slot }) => {
            Ok(FrameSource::ExternalGenerator(ExternalGeneratorSource::new(
                slot, 1920, 1080,
            )))
        }
        _ => Err(CoreError::FatalStartup(
            "video.frame_source kind does not match the supplied frame producer".into(),
        )),
    }
}

/// The vision thread (C5, §4.5/§5): peeks the latest pumped frame,
/// runs the contour scanner against it, and sleeps to its configured
/// frame rate. Never blocks the audio callback — cursor/trigger
/// publication is all lock-free atomics/SPSC.
fn spawn_vision_thread(
    state: Arc<CoreState>,
    frames: FrameSlot,
    shutdown: Arc<AtomicBool>,
    trigger_tx: rtrb::Producer<kine_core::VisionTrigger>,
    target_fps: f64,
) -> std::thread::JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / target_fps.max(1.0));
    std::thread::Builder::new()
        .name("kine-vision".into())
        .spawn(move || {
            let mut scanner = ContourScanner::new(Arc::clone(&state.cursor), trigger_tx);
            while !shutdown.load(Ordering::Relaxed) {
                if let Some(frame) = frames.peek() {
                    let t_scan = state.params.read(ParamTag::TScan);
                    scanner.process_frame(&frame, t_scan);
                }
                std::thread::sleep(period);
            }
        })
        .expect("failed to spawn kine-vision thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midi_sidecar_path_swaps_extension() {
        let p = midi_sidecar_path(Path::new("/tmp/session.json"));
        assert_eq!(p, Path::new("/tmp/session.midi.json"));
    }

    #[test]
    fn core_state_starts_with_default_cursor_position() {
        let state = CoreState::new(960);
        assert_eq!(state.cursor.x(), 0.5);
        assert_eq!(state.cursor.y(), 0.5);
        assert_eq!(state.display.width(), 960);
    }
}
