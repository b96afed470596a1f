use std::path::PathBuf;
use std::time::Duration;

/// Engine-level playback tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Frames never display for less than this, whatever their declared delay.
    pub min_frame_delay: Duration,
    /// Period of the scheduling tick.
    pub tick_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_frame_delay: Duration::from_millis(20),
            tick_interval: Duration::from_millis(10),
        }
    }
}

impl PlaybackConfig {
    /// Display time for a frame declaring `centiseconds` of delay.
    pub fn frame_delay(&self, centiseconds: u16) -> Duration {
        Duration::from_millis(centiseconds as u64 * 10).max(self.min_frame_delay)
    }
}

/// Top-level player configuration
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub input: PathBuf,
    pub output_mode: OutputMode,
    pub output_dir: PathBuf,
    /// DPI factor applied by the surface
    pub scale: f32,
    /// Overrides the image's own loop extension
    pub iterations: Option<u16>,
    /// Stop after this long even if the animation loops forever
    pub max_duration: Option<Duration>,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Save each frame as PNG
    #[default]
    Png,
    /// Output raw RGBA frames to stdout (for piping)
    Raw,
    /// Decode and pace frames without output (for testing)
    None,
}

impl std::str::FromStr for OutputMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(OutputMode::Png),
            "raw" | "stdout" => Ok(OutputMode::Raw),
            "none" | "null" => Ok(OutputMode::None),
            _ => Err(format!("Unknown output mode: {s}")),
        }
    }
}
