//! Camera frame source (§4.8): wraps whatever platform capture backend
//! the host process wires up, decoupled from this crate via a channel.
//!
//! The actual OS capture API (AVFoundation, V4L2, Media Foundation) is
//! out of scope here — this crate only owns the consumer half. The
//! producer half is any thread that can push [`RgbFrame`]s, which
//! keeps this source and [`crate::ExternalGeneratorSource`] symmetric:
//! both are just asynchronous frame producers observed at the
//! compositor's own frame rate.

use crossbeam_channel::Receiver;

use crate::RgbFrame;

pub struct CameraSource {
    receiver: Receiver<RgbFrame>,
    last_frame: Option<RgbFrame>,
    width: u32,
    height: u32,
}

impl CameraSource {
    pub fn new(receiver: Receiver<RgbFrame>, width: u32, height: u32) -> Self {
        Self {
            receiver,
            last_frame: None,
            width,
            height,
        }
    }

    /// Drain the channel down to the most recent frame (never let a
    /// slow compositor fall behind a fast capture thread), then return
    /// it, or the previous frame if nothing new has arrived.
    pub fn fetch(&mut self) -> Option<RgbFrame> {
        while let Ok(frame) = self.receiver.try_recv() {
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
    fn fetch_reuses_previous_frame_when_channel_empty() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = CameraSource::new(rx, 640, 480);
        assert!(source.fetch().is_none());

        tx.send(RgbFrame::black(640, 480)).unwrap();
        assert!(source.fetch().is_some());
        assert!(source.fetch().is_some());
    }

    #[test]
    fn fetch_drains_to_the_latest_frame() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = CameraSource::new(rx, 2, 2);
        tx.send(RgbFrame::new(2, 2, vec![1; 12])).unwrap();
        tx.send(RgbFrame::new(2, 2, vec![2; 12])).unwrap();
        let frame = source.fetch().unwrap();
        assert_eq!(frame.data[0], 2);
    }
}
