/// Animated GIF decoding, compositing and timed playback.
pub mod config;
pub mod decode;
pub mod error;
pub mod playback;
pub mod render;

#[cfg(test)]
mod test_support;

pub use error::{GifError, Result};
pub use playback::{GifInstance, ImageSource, Player, PlayerCommand, PlayerHandle, PlayerStatus};
pub use render::PresentationSurface;
