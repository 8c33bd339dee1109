//! kine-viz: the GPU compositor (C7, §4.7) — four channel layers,
//! rotation and curve deformation, HSV coloring, four-blend-mode
//! fading, region-map partitioning, and camera blend, rendered with
//! wgpu and marshaled across threads via [`render_thread`].

pub mod common;
pub mod compositor;
pub mod palette;
pub mod render_thread;

pub use common::{GpuContext, VizError, VizResult};
pub use compositor::{ChannelParams, CompositorParams, GpuCompositor, CHANNEL_COUNT};
pub use palette::{resolve_channel_hues, BlendMode, Palette};
pub use render_thread::{CompositorHandle, CompositorThread};
