//! Fans one physical [`kine_video::FrameSource`] out to the two
//! independent consumers that need it at their own rates: the contour
//! scanner (C5, <=30 fps) and the GPU compositor's camera layer (C7,
//! the video thread's own frame rate). §4.8 describes a single
//! `fetch()`/`dimensions()` consumer interface; this module is the
//! engine-level fan-out that interface implies once two different
//! threads both need "the latest frame" without racing the source
//! itself.
//!
//! Modeled on `kine_video::ExternalGeneratorSlot` — a shared
//! `Option<RgbFrame>` behind a `parking_lot::Mutex` — except `peek`
//! clones rather than takes, since both downstream readers must be
//! able to observe the same frame independently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use kine_video::{FrameSource, RgbFrame};

/// A shared "latest frame" slot. Cheap to clone (just an `Arc`); every
/// clone sees the same underlying frame.
#[derive(Clone)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<RgbFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    fn publish(&self, frame: RgbFrame) {
        *self.inner.lock() = Some(frame);
    }

    /// Non-destructive read: returns a clone of the latest published
    /// frame, or `None` if nothing has been published yet.
    pub fn peek(&self) -> Option<RgbFrame> {
        self.inner.lock().clone()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll rate for the pump thread itself — faster than either
/// downstream consumer's rate so neither ever waits on a stale frame
/// longer than necessary.
const PUMP_POLL_HZ: f64 = 60.0;

/// Spawns the frame-pump thread: repeatedly calls `source.fetch()` and
/// republishes into both downstream slots. Per §4.8, a `None` fetch is
/// not an error — the slots simply keep holding whatever they last
/// had, exactly like the frame source's own "reuse previous frame"
/// contract.
pub fn spawn(
    mut source: FrameSource,
    vision_slot: FrameSlot,
    video_slot: FrameSlot,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let period = Duration::from_secs_f64(1.0 / PUMP_POLL_HZ);
    std::thread::Builder::new()
        .name("kine-frame-pump".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                if let Some(frame) = source.fetch() {
                    vision_slot.publish(frame.clone());
                    video_slot.publish(frame);
                }
                std::thread::sleep(period);
            }
        })
        .expect("failed to spawn kine-frame-pump thread")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_returns_none_before_first_publish() {
        let slot = FrameSlot::new();
        assert!(slot.peek().is_none());
    }

    #[test]
    fn peek_is_repeatable_and_non_destructive() {
        let slot = FrameSlot::new();
        slot.publish(RgbFrame::black(4, 4));
        assert!(slot.peek().is_some());
        assert!(slot.peek().is_some());
    }

    #[test]
    fn clones_of_a_slot_share_the_same_frame() {
        let slot = FrameSlot::new();
        let other = slot.clone();
        slot.publish(RgbFrame::black(2, 2));
        assert!(other.peek().is_some());
    }
}
