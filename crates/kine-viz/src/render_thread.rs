//! GL-thread marshaling for the GPU compositor (§4.7).
//!
//! The compositor owns its GPU context and runs on one dedicated
//! thread; every other thread reaches it by sending a [`RenderRequest`]
//! through a message channel and blocking on a completion signal with
//! a 1 s timeout. On timeout the caller gets a black frame and a
//! logged warning rather than an error — a stalled GL thread should
//! degrade the picture, not crash the core.

use std::sync::Arc;
use std::time::Duration;

use kine_video::RgbFrame;

use crate::common::GpuContext;
use crate::compositor::{ChannelParams, CompositorParams, GpuCompositor, CHANNEL_COUNT};

const RENDER_TIMEOUT: Duration = Duration::from_secs(1);

struct RenderRequest {
    waveforms: [Vec<f32>; CHANNEL_COUNT],
    channel_params: [ChannelParams; CHANNEL_COUNT],
    compositor_params: CompositorParams,
    camera_frame: Option<RgbFrame>,
    reply: flume::Sender<Vec<u8>>,
}

/// Cloneable front for the GL thread. Every clone shares the same
/// request channel; the GL thread itself is owned by [`CompositorThread`].
#[derive(Clone)]
pub struct CompositorHandle {
    tx: flume::Sender<RenderRequest>,
    width: u32,
    height: u32,
}

impl CompositorHandle {
    /// Submit one frame and block for the result, up to 1 s. Returns a
    /// black RGBA8 frame of the right size on timeout or if the GL
    /// thread has shut down.
    pub fn render_frame(
        &self,
        waveforms: [Vec<f32>; CHANNEL_COUNT],
        channel_params: [ChannelParams; CHANNEL_COUNT],
        compositor_params: CompositorParams,
        camera_frame: Option<RgbFrame>,
    ) -> Vec<u8> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        let request = RenderRequest {
            waveforms,
            channel_params,
            compositor_params,
            camera_frame,
            reply: reply_tx,
        };

        if self.tx.send(request).is_err() {
            log::warn!("kine-viz: GL thread gone, returning black frame");
            return black_frame(self.width, self.height);
        }

        match reply_rx.recv_timeout(RENDER_TIMEOUT) {
            Ok(frame) => frame,
            Err(_) => {
                log::warn!("kine-viz: render request timed out after 1s, returning black frame");
                black_frame(self.width, self.height)
            }
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn black_frame(width: u32, height: u32) -> Vec<u8> {
    vec![0u8; (width * height * 4) as usize]
}

/// Owns the dedicated GL/Metal thread's join handle. The GL thread
/// exits once every [`CompositorHandle`] clone (including this
/// struct's own) has been dropped, closing the request channel;
/// dropping this struct joins it.
pub struct CompositorThread {
    handle: CompositorHandle,
    join: Option<std::thread::JoinHandle<()>>,
}

impl CompositorThread {
    /// Spawn the GL thread, build its `GpuContext`/`GpuCompositor`
    /// there, and return a handle other threads can clone freely.
    /// `ring_width` is the decimated waveform sample count per channel
    /// (§4.6); it must match the display ring's configured length.
    pub fn spawn(width: u32, height: u32, ring_width: usize) -> Self {
        let (tx, rx) = flume::unbounded::<RenderRequest>();

        let join = std::thread::Builder::new()
            .name("kine-viz-gl".into())
            .spawn(move || run(rx, width, height, ring_width))
            .expect("failed to spawn kine-viz GL thread");

        Self {
            handle: CompositorHandle { tx, width, height },
            join: Some(join),
        }
    }

    pub fn handle(&self) -> CompositorHandle {
        self.handle.clone()
    }
}

impl Drop for CompositorThread {
    fn drop(&mut self) {
        let CompositorHandle { tx, .. } = self.handle.clone();
        drop(tx);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(rx: flume::Receiver<RenderRequest>, width: u32, height: u32, ring_width: usize) {
    let ctx = match GpuContext::new_blocking() {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            log::error!("kine-viz: GL thread failed to acquire GPU context: {e}");
            return;
        }
    };

    let compositor = match GpuCompositor::new(&ctx, width, height, ring_width) {
        Ok(c) => c,
        Err(e) => {
            log::error!("kine-viz: GL thread failed to build compositor: {e}");
            return;
        }
    };

    // Uniform uploads and draws are strictly sequential within this
    // thread; there is nothing else contending for the GPU context.
    while let Ok(request) = rx.recv() {
        if let Some(frame) = &request.camera_frame {
            compositor.upload_camera_frame(frame);
        }
        compositor.render(&request.waveforms, &request.channel_params, &request.compositor_params);
        let pixels = compositor
            .read_output_rgba8()
            .unwrap_or_else(|e| {
                log::warn!("kine-viz: readback failed: {e}");
                black_frame(width, height)
            });
        let _ = request.reply.send(pixels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_frame_has_expected_byte_count() {
        let frame = black_frame(64, 32);
        assert_eq!(frame.len(), 64 * 32 * 4);
        assert!(frame.iter().all(|&b| b == 0));
    }
}
