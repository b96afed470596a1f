/// Async playback driver: owns the instance, the surface and the frame timer.
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::PlaybackConfig;
use crate::error::{GifError, Result};
use crate::playback::instance::{GifInstance, PlaybackState};
use crate::playback::source::{ImageSource, SourceResolver};
use crate::render::PresentationSurface;

/// Lifecycle signals from the embedding collaborator
#[derive(Debug)]
pub enum PlayerCommand {
    /// Play from frame 0 (remembered if the source is still decoding)
    Start,
    Stop,
    Pause,
    Resume,
    /// Replace the source; any decode in flight is abandoned
    SourceChanged(ImageSource),
    /// Override the loop count (0 = infinite)
    IterationCountChanged(u16),
    /// Tear down and end `Player::run`
    Shutdown,
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Bumped on every source change.
    pub generation: u64,
    pub state: PlaybackState,
    /// Whether a decoded instance is bound.
    pub ready: bool,
    pub frames_published: u64,
    pub loops_completed: u32,
    pub decode_errors: u64,
    /// Playback ran to its iteration count (or showed a still image).
    pub finished: bool,
    pub last_error: Option<String>,
}

/// Cloneable sender side of a running [`Player`].
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    command_tx: mpsc::Sender<PlayerCommand>,
    status_rx: watch::Receiver<PlayerStatus>,
}

impl PlayerHandle {
    pub async fn send(&self, command: PlayerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| GifError::PlayerClosed)
    }

    pub async fn set_source(&self, source: impl Into<ImageSource>) -> Result<()> {
        self.send(PlayerCommand::SourceChanged(source.into())).await
    }

    pub async fn start(&self) -> Result<()> {
        self.send(PlayerCommand::Start).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(PlayerCommand::Shutdown).await
    }

    /// Latest status; `changed()`/`wait_for()` on the receiver to follow it.
    pub fn status(&self) -> watch::Receiver<PlayerStatus> {
        self.status_rx.clone()
    }
}

/// Result of a background parse, tagged with the generation that requested it.
struct Decoded {
    generation: u64,
    result: Result<GifInstance>,
}

pub struct Player {
    config: PlaybackConfig,
    surface: Box<dyn PresentationSurface>,
    resolver: Arc<dyn SourceResolver>,
    /// Channel for receiving lifecycle commands
    command_rx: mpsc::Receiver<PlayerCommand>,
    /// Sender clone handed out through `handle()`
    command_tx: mpsc::Sender<PlayerCommand>,
    decoded_tx: mpsc::UnboundedSender<Decoded>,
    decoded_rx: mpsc::UnboundedReceiver<Decoded>,
    status_tx: watch::Sender<PlayerStatus>,
    instance: Option<GifInstance>,
    generation: u64,
    /// Start was requested; applied as soon as an instance is ready
    wants_playback: bool,
    /// Pause was requested and not yet undone by Start, Resume or Stop
    paused: bool,
    /// A ready instance is waiting for Resume before its first publish
    start_deferred: bool,
    iteration_override: Option<u16>,
    last_tick: Instant,
    finished: bool,
    last_error: Option<String>,
}

impl Player {
    pub fn new(
        config: PlaybackConfig,
        surface: Box<dyn PresentationSurface>,
        resolver: Arc<dyn SourceResolver>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (decoded_tx, decoded_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(PlayerStatus::default());

        Self {
            config,
            surface,
            resolver,
            command_rx,
            command_tx,
            decoded_tx,
            decoded_rx,
            status_tx,
            instance: None,
            generation: 0,
            wants_playback: false,
            paused: false,
            start_deferred: false,
            iteration_override: None,
            last_tick: Instant::now(),
            finished: false,
            last_error: None,
        }
    }

    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle {
            command_tx: self.command_tx.clone(),
            status_rx: self.status_tx.subscribe(),
        }
    }

    pub fn status(&self) -> watch::Receiver<PlayerStatus> {
        self.status_tx.subscribe()
    }

    /// Main playback loop. Returns after `Shutdown`.
    pub async fn run(mut self) {
        let mut interval = time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.last_tick = Instant::now();

        info!(
            "Starting playback loop: tick {:?}, min frame delay {:?}",
            self.config.tick_interval, self.config.min_frame_delay
        );

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PlayerCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd),
                    }
                }
                Some(decoded) = self.decoded_rx.recv() => {
                    self.on_decoded(decoded);
                }
                now = interval.tick() => {
                    self.tick(now);
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, cmd: PlayerCommand) {
        debug!("Command: {:?}", cmd);
        match cmd {
            PlayerCommand::Start => {
                self.paused = false;
                self.start_instance();
            }
            PlayerCommand::Stop => {
                self.wants_playback = false;
                self.paused = false;
                self.start_deferred = false;
                if let Some(instance) = self.instance.as_mut() {
                    instance.stop();
                }
            }
            PlayerCommand::Pause => {
                self.paused = true;
                if let Some(instance) = self.instance.as_mut() {
                    instance.pause();
                }
            }
            PlayerCommand::Resume => {
                self.paused = false;
                if self.start_deferred {
                    self.start_instance();
                } else if let Some(instance) = self.instance.as_mut() {
                    instance.resume();
                    self.last_tick = Instant::now();
                }
            }
            PlayerCommand::SourceChanged(source) => self.begin_decode(source),
            PlayerCommand::IterationCountChanged(count) => {
                self.iteration_override = Some(count);
                if let Some(instance) = self.instance.as_mut() {
                    instance.set_iteration_count(count);
                }
            }
            // Handled by the run loop
            PlayerCommand::Shutdown => {}
        }
        self.publish_status();
    }

    /// Drop the current instance and parse `source` on the blocking pool.
    fn begin_decode(&mut self, source: ImageSource) {
        self.generation += 1;
        self.instance = None;
        self.start_deferred = false;
        self.finished = false;
        self.last_error = None;

        let generation = self.generation;
        let resolver = Arc::clone(&self.resolver);
        let config = self.config;
        let decoded_tx = self.decoded_tx.clone();
        info!("Loading source {:?} (generation {})", source, generation);

        tokio::task::spawn_blocking(move || {
            let result = GifInstance::from_source(source, resolver.as_ref(), config);
            // The player may already be gone
            let _ = decoded_tx.send(Decoded { generation, result });
        });
    }

    fn on_decoded(&mut self, decoded: Decoded) {
        if decoded.generation != self.generation {
            debug!(
                "Discarding stale decode (generation {}, current {})",
                decoded.generation, self.generation
            );
            return;
        }

        match decoded.result {
            Ok(mut instance) => {
                if let Some(count) = self.iteration_override {
                    instance.set_iteration_count(count);
                }
                self.instance = Some(instance);
                if self.wants_playback && self.paused {
                    debug!("Source ready while paused, waiting for Resume");
                    self.start_deferred = true;
                } else if self.wants_playback {
                    self.start_instance();
                }
            }
            Err(e) => {
                error!("Failed to load GIF: {}", e);
                self.last_error = Some(e.to_string());
            }
        }
        self.publish_status();
    }

    fn start_instance(&mut self) {
        self.wants_playback = true;
        self.start_deferred = false;
        let Some(instance) = self.instance.as_mut() else {
            debug!("Start requested before source is ready");
            return;
        };

        let outcome = instance.start(self.surface.as_mut());
        self.finished = outcome.finished;
        self.last_tick = Instant::now();
    }

    fn tick(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;

        let Some(instance) = self.instance.as_mut() else {
            return;
        };
        if instance.state() != PlaybackState::Playing {
            return;
        }

        let outcome = instance.advance(elapsed, self.surface.as_mut());
        if outcome.finished {
            self.finished = true;
        }
        if outcome.frames_published > 0 || outcome.finished {
            self.publish_status();
        }
    }

    fn publish_status(&self) {
        let instance = self.instance.as_ref();
        self.status_tx.send_replace(PlayerStatus {
            generation: self.generation,
            state: if self.start_deferred {
                PlaybackState::Paused
            } else {
                instance.map_or(PlaybackState::Stopped, |i| i.state())
            },
            ready: instance.is_some(),
            frames_published: instance.map_or(0, |i| i.frames_published()),
            loops_completed: instance.map_or(0, |i| i.loops_completed()),
            decode_errors: instance.map_or(0, |i| i.decode_errors()),
            finished: self.finished,
            last_error: self.last_error.clone(),
        });
    }

    fn teardown(&mut self) {
        // Outstanding decodes no longer match
        self.generation += 1;
        if let Some(instance) = self.instance.as_mut() {
            instance.stop();
        }
        self.publish_status();
        self.instance = None;
        info!("Player shut down");
    }
}
