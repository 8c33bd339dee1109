//! kine-vision: the contour scanner (C5, §4.5) — grayscale/edge
//! detection, Moore-neighbor contour tracing, curvature, the
//! variable-speed traversal schedule, and the scanner that ties them
//! together and publishes a cursor for the audio callback to read.
//!
//! Runs on its own thread at <=30 fps (§5); nothing here blocks the
//! audio callback — the cursor is published through plain atomics
//! (`kine_core::ContourCursorState`), and trigger events ride a
//! lock-free SPSC queue (`kine_core::vision_trigger_channel`).

pub mod contour;
pub mod edge;
pub mod error;
pub mod scanner;
pub mod schedule;

pub use contour::{compute_curvatures, longest_contour, trace_contours};
pub use edge::{sobel_edges, to_grayscale, EdgeMap};
pub use error::{VisionError, VisionResult};
pub use scanner::ContourScanner;
pub use schedule::{inv_curvature_enhanced, CursorSchedule};
