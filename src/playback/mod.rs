pub mod instance;
pub mod player;
pub mod source;

pub use instance::{GifInstance, PlaybackState, TickOutcome};
pub use player::{Player, PlayerCommand, PlayerHandle, PlayerStatus};
pub use source::{FileResolver, ImageSource, SourceResolver};
