pub mod compositor;
pub mod surface;

use std::time::Duration;

pub use compositor::Compositor;

/// One composited frame, borrowed from the canvas for the length of a publish.
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame<'a> {
    pub index: usize,
    /// Straight-alpha RGBA at logical screen size
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Floor-clamped display time
    pub delay: Duration,
}

/// Where composited frames go.
///
/// The frame borrows the canvas only for the call. Implementations copy what
/// they need before returning; scaling to device pixels is their job.
pub trait PresentationSurface: Send {
    fn publish(&mut self, frame: &DecodedFrame<'_>) -> std::io::Result<()>;
}
