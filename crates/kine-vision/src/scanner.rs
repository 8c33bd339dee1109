//! The contour scanner (C5, §4.5): ties grayscale/edge detection,
//! contour tracing, curvature, and the variable-speed schedule into the
//! per-frame algorithm that publishes a cursor and raises speed-delta
//! trigger events.
//!
//! Anchor-distance (ENV1/ENV2, SEQ1/SEQ2) is *not* computed here: the
//! distance only ever needs the cursor and the anchor, both of which
//! are plain atomics the audio callback can read directly at buffer
//! rate (§4.2 step 4), so that arithmetic lives with its consumer in
//! the engine crate rather than duplicated on this thread. What this
//! scanner owns is the piece only it can compute — the frame-to-frame
//! *speed* delta (§4.5 step 5) — which needs the previous frame's
//! weight, a thing only the scanner thread has.

use std::time::Instant;

use kine_core::{ContourCursorState, VisionTrigger};
use kine_video::RgbFrame;

use crate::contour::{compute_curvatures, longest_contour, trace_contours};
use crate::edge::{sobel_edges, to_grayscale};
use crate::schedule::CursorSchedule;

/// Sobel gradient-magnitude threshold for the binary edge map. Chosen
/// empirically against the working resolution's 0-255*4 magnitude
/// range; high enough to reject sensor noise on a flat wall, low
/// enough to catch a hand-drawn contour in typical room lighting.
const EDGE_THRESHOLD: u16 = 80;

/// `|Δweight|` over one frame beyond which the scanner raises a
/// speed-change trigger (§4.5 step 5).
const SPEED_DELTA_THRESHOLD: f64 = 0.3;

/// Runs the full §4.5 per-frame algorithm against incoming camera
/// frames and publishes cursor state for the audio callback to read.
pub struct ContourScanner {
    cursor: std::sync::Arc<ContourCursorState>,
    trigger_tx: rtrb::Producer<VisionTrigger>,
    started_at: Instant,
    prev_speed_weight: f64,
    last_known: (f64, f64),
}

impl ContourScanner {
    pub fn new(
        cursor: std::sync::Arc<ContourCursorState>,
        trigger_tx: rtrb::Producer<VisionTrigger>,
    ) -> Self {
        Self {
            cursor,
            trigger_tx,
            started_at: Instant::now(),
            prev_speed_weight: 1.0,
            last_known: (0.5, 0.5),
        }
    }

    /// Process one camera frame and publish the resulting cursor state.
    /// `t_scan_seconds` is the smoothed `TScan` parameter, read by the
    /// caller once per frame from the parameter store.
    pub fn process_frame(&mut self, frame: &RgbFrame, t_scan_seconds: f64) {
        let gray = to_grayscale(frame);
        let edges = sobel_edges(&gray, frame.width, frame.height, EDGE_THRESHOLD);
        let contours = trace_contours(&edges);

        let Some(polyline) = longest_contour(&contours) else {
            // §4.5 failure semantics: no contour detected -> cursor
            // holds its prior position, speed reverts to constant, no
            // triggers fire.
            self.cursor
                .publish(self.last_known.0, self.last_known.1, 0.0, 1.0);
            self.prev_speed_weight = 1.0;
            return;
        };

        let curvatures = compute_curvatures(polyline);
        let schedule = CursorSchedule::from_curvatures(&curvatures);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let idx = schedule.vertex_index_at(elapsed, t_scan_seconds.max(1e-3));

        let (vx, vy) = polyline[idx];
        let x = (vx / frame.width.max(1) as f32) as f64;
        let y = (vy / frame.height.max(1) as f32) as f64;
        let curvature = curvatures[idx] as f64;
        let weight = schedule.weight_at(idx) as f64;

        self.cursor.publish(x, y, curvature, weight);
        self.last_known = (x, y);

        let delta = weight - self.prev_speed_weight;
        if delta < -SPEED_DELTA_THRESHOLD {
            let _ = self.trigger_tx.push(VisionTrigger::Env3);
        } else if delta > SPEED_DELTA_THRESHOLD {
            let _ = self.trigger_tx.push(VisionTrigger::Env4);
        }
        self.prev_speed_weight = weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kine_core::vision_trigger_channel;

    fn checkerboard_frame(w: u32, h: u32) -> RgbFrame {
        let mut data = vec![0u8; (w * h * 3) as usize];
        for y in 0..h {
            for x in 0..w {
                let idx = ((y * w + x) * 3) as usize;
                let on = (x / 4 + y / 4) % 2 == 0;
                let v = if on { 255 } else { 0 };
                data[idx] = v;
                data[idx + 1] = v;
                data[idx + 2] = v;
            }
        }
        RgbFrame::new(w, h, data)
    }

    #[test]
    fn blank_frame_holds_cursor_and_resets_speed() {
        let cursor = ContourCursorState::new();
        let (tx, _rx) = vision_trigger_channel();
        let mut scanner = ContourScanner::new(cursor.clone(), tx);
        let frame = RgbFrame::new(16, 16, vec![128u8; 16 * 16 * 3]);
        scanner.process_frame(&frame, 4.0);
        assert_eq!(cursor.curvature(), 0.0);
        assert_eq!(cursor.speed_weight(), 1.0);
    }

    #[test]
    fn textured_frame_publishes_a_cursor_on_the_contour() {
        let cursor = ContourCursorState::new();
        let (tx, _rx) = vision_trigger_channel();
        let mut scanner = ContourScanner::new(cursor.clone(), tx);
        let frame = checkerboard_frame(32, 32);
        scanner.process_frame(&frame, 4.0);
        assert!((0.0..=1.0).contains(&cursor.x()));
        assert!((0.0..=1.0).contains(&cursor.y()));
    }
}
