//! External generator frame source (§4.8): reads from a shared slot
//! written asynchronously by an opaque image-generator process. The
//! generator's identity and protocol are intentionally not this
//! crate's concern — it only owns the slot.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::RgbFrame;

/// The shared slot an external generator process writes into. Cloning
/// an [`ExternalGeneratorSlot`] shares the same underlying mutex, so a
/// writer thread and this source can each hold one independently.
#[derive(Clone)]
pub struct ExternalGeneratorSlot {
    inner: Arc<Mutex<Option<RgbFrame>>>,
}

impl ExternalGeneratorSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    /// Called by the generator's writer thread whenever a new frame is
    /// ready.
    pub fn publish(&self, frame: RgbFrame) {
        *self.inner.lock() = Some(frame);
    }
}

impl Default for ExternalGeneratorSlot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ExternalGeneratorSource {
    slot: ExternalGeneratorSlot,
    last_frame: Option<RgbFrame>,
    width: u32,
    height: u32,
}

impl ExternalGeneratorSource {
    pub fn new(slot: ExternalGeneratorSlot, width: u32, height: u32) -> Self {
        Self {
            slot,
            last_frame: None,
            width,
            height,
        }
    }

    pub fn fetch(&mut self) -> Option<RgbFrame> {
        if let Some(frame) = self.slot.inner.lock().take() {
            self.width = frame.width;
            self.height = frame.height;
            self.last_frame = Some(frame);
        }
        self.last_frame.clone()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_is_none_until_first_publish() {
        let slot = ExternalGeneratorSlot::new();
        let mut source = ExternalGeneratorSource::new(slot.clone(), 16, 9);
        assert!(source.fetch().is_none());
        slot.publish(RgbFrame::black(16, 9));
        assert!(source.fetch().is_some());
    }

    #[test]
    fn fetch_reuses_last_frame_after_consuming_slot() {
        let slot = ExternalGeneratorSlot::new();
        let mut source = ExternalGeneratorSource::new(slot.clone(), 16, 9);
        slot.publish(RgbFrame::black(16, 9));
        source.fetch();
        assert!(source.fetch().is_some());
    }
}
