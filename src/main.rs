use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use gif_player::config::{OutputMode, PlaybackConfig, PlayerConfig};
use gif_player::playback::{FileResolver, ImageSource, Player, PlayerCommand};
use gif_player::render::PresentationSurface;
use gif_player::render::surface::{NullSurface, PixmapSurface, RawSurface};

#[derive(Parser, Debug)]
#[command(name = "gif-player", about = "Animated GIF decoder and player")]
struct Args {
    /// GIF file to play (plain path or file:// URI)
    input: PathBuf,

    /// Output mode: png, raw, none
    #[arg(long, default_value = "png")]
    output: String,

    /// Directory for PNG frames (png mode)
    #[arg(long, default_value = "frames")]
    output_dir: PathBuf,

    /// DPI scale factor applied to each frame
    #[arg(long, default_value_t = 1.0)]
    scale: f32,

    /// Minimum time any frame stays on screen
    #[arg(long, default_value_t = 20)]
    min_delay_ms: u64,

    /// Playback tick period
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Loop count override (0 = forever); defaults to the file's own
    #[arg(long)]
    loops: Option<u16>,

    /// Stop after this many seconds
    #[arg(long)]
    max_duration_secs: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn build_surface(config: &PlayerConfig) -> Result<Box<dyn PresentationSurface>> {
    Ok(match config.output_mode {
        OutputMode::Png => {
            std::fs::create_dir_all(&config.output_dir).with_context(|| {
                format!("Failed to create output directory {}", config.output_dir.display())
            })?;
            Box::new(PixmapSurface::with_png_output(config.scale, &config.output_dir))
        }
        OutputMode::Raw => Box::new(RawSurface::stdout()),
        OutputMode::None => Box::new(NullSurface::default()),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so raw frames can be piped from stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.parse().unwrap_or_default()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PlayerConfig {
        input: args.input.clone(),
        output_mode: args.output.parse().map_err(anyhow::Error::msg)?,
        output_dir: args.output_dir.clone(),
        scale: args.scale,
        iterations: args.loops,
        max_duration: args.max_duration_secs.map(Duration::from_secs),
        playback: PlaybackConfig {
            min_frame_delay: Duration::from_millis(args.min_delay_ms),
            tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        },
    };

    info!(
        "gif-player v{} starting ({}, output: {:?})",
        env!("CARGO_PKG_VERSION"),
        config.input.display(),
        config.output_mode
    );

    let surface = build_surface(&config)?;
    let player = Player::new(config.playback, surface, Arc::new(FileResolver::new()));
    let handle = player.handle();
    let mut status = handle.status();
    let player_task = tokio::spawn(player.run());

    if let Some(count) = config.iterations {
        handle.send(PlayerCommand::IterationCountChanged(count)).await?;
    }
    handle.set_source(ImageSource::from(config.input.as_path())).await?;
    handle.start().await?;

    let deadline = async {
        match config.max_duration {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = status.wait_for(|s| s.finished || s.last_error.is_some()) => {
            result.context("Player stopped unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = deadline => info!("Maximum duration reached"),
    }

    let last = handle.status().borrow().clone();
    handle.shutdown().await?;
    player_task.await.context("Player task failed")?;

    if let Some(err) = last.last_error {
        bail!("Failed to play {}: {}", config.input.display(), err);
    }

    info!(
        "gif-player done: {} frame(s) published, {} loop(s), {} decode error(s)",
        last.frames_published, last.loops_completed, last.decode_errors
    );
    Ok(())
}
