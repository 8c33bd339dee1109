//! The lock-free bridge between the vision thread (C5) and the audio
//! callback (C2): a published cursor (atomic, read every sample) and a
//! small SPSC queue of discrete envelope triggers (drained once at the
//! top of each callback), per §4.5/§5.

use std::sync::Arc;

use crate::params::AtomicParam;

/// The four trigger kinds the contour scanner can raise. ENV4 is the
/// "sharp speed-increase" counterpart to ENV3's speed-decrease trigger
/// (§4.5 step 5); nothing currently consumes it as an envelope, but the
/// scanner still reports it for an overlay or future mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionTrigger {
    Env1,
    Env2,
    Env3,
    Env4,
}

/// Capacity of the vision→audio trigger queue. Generous relative to
/// the scanner's ≤30 fps rate and the audio callback's drain rate —
/// overflow would mean the audio thread stalled for roughly a second.
pub const TRIGGER_QUEUE_CAPACITY: usize = 64;

/// Build a fresh vision→audio trigger queue. The producer half belongs
/// to the vision thread; the consumer half is drained once per audio
/// callback, never blocking if empty.
pub fn vision_trigger_channel() -> (rtrb::Producer<VisionTrigger>, rtrb::Consumer<VisionTrigger>) {
    rtrb::RingBuffer::new(TRIGGER_QUEUE_CAPACITY)
}

/// The contour cursor's published state (§3 "Contour Cursor"):
/// position, curvature, and instantaneous speed weight. Written by the
/// vision thread once per frame; read by the audio callback once per
/// sample. Each field is an independent atomic word, so a reader never
/// observes a torn cursor position — the four fields may individually
/// be a frame apart, which the spec explicitly allows.
pub struct ContourCursorState {
    x: AtomicParam,
    y: AtomicParam,
    curvature: AtomicParam,
    speed_weight: AtomicParam,
}

impl ContourCursorState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            x: AtomicParam::new(0.5),
            y: AtomicParam::new(0.5),
            curvature: AtomicParam::new(0.0),
            speed_weight: AtomicParam::new(1.0),
        })
    }

    #[inline]
    pub fn publish(&self, x: f64, y: f64, curvature: f64, speed_weight: f64) {
        self.x.set(x);
        self.y.set(y);
        self.curvature.set(curvature);
        self.speed_weight.set(speed_weight);
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.x.get()
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.y.get()
    }

    #[inline]
    pub fn curvature(&self) -> f64 {
        self.curvature.get()
    }

    #[inline]
    pub fn speed_weight(&self) -> f64 {
        self.speed_weight.get()
    }
}

impl Default for ContourCursorState {
    fn default() -> Self {
        Self {
            x: AtomicParam::new(0.5),
            y: AtomicParam::new(0.5),
            curvature: AtomicParam::new(0.0),
            speed_weight: AtomicParam::new(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_read_round_trips() {
        let cursor = ContourCursorState::new();
        cursor.publish(0.25, 0.75, 0.4, 1.5);
        assert_eq!(cursor.x(), 0.25);
        assert_eq!(cursor.y(), 0.75);
        assert_eq!(cursor.curvature(), 0.4);
        assert_eq!(cursor.speed_weight(), 1.5);
    }

    #[test]
    fn trigger_queue_carries_events_in_order() {
        let (mut tx, mut rx) = vision_trigger_channel();
        tx.push(VisionTrigger::Env1).unwrap();
        tx.push(VisionTrigger::Env3).unwrap();
        assert_eq!(rx.pop().unwrap(), VisionTrigger::Env1);
        assert_eq!(rx.pop().unwrap(), VisionTrigger::Env3);
        assert!(rx.pop().is_err());
    }
}
