/// One bound GIF: parsed frames, compositor canvas and playback cursor.
///
/// Time is supplied by the caller through [`GifInstance::advance`], which keeps
/// the state machine deterministic; [`crate::playback::player::Player`] feeds it
/// from a tokio timer.
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::PlaybackConfig;
use crate::decode::{self, frame, LogicalScreenDescriptor, ParsedImage};
use crate::error::Result;
use crate::playback::source::{ImageSource, SourceResolver};
use crate::render::{Compositor, DecodedFrame, PresentationSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// What happened during one `start` or `advance` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickOutcome {
    pub frames_published: usize,
    pub decode_errors: usize,
    /// Playback reached its iteration count (or was a still image) and stopped.
    pub finished: bool,
}

pub struct GifInstance {
    image: ParsedImage,
    compositor: Compositor,
    config: PlaybackConfig,
    state: PlaybackState,
    frame_index: usize,
    frame_elapsed: Duration,
    loops_completed: u32,
    /// 0 = infinite
    iteration_count: u16,
    pending_iteration_count: Option<u16>,
    frames_published: u64,
    decode_errors: u64,
}

impl GifInstance {
    pub fn new(image: ParsedImage, config: PlaybackConfig) -> Self {
        let compositor = Compositor::new(&image.screen, image.background_color());
        let iteration_count = image.iteration_count();
        info!(
            "GIF instance: {}x{}, {} frame(s), iterations: {}",
            image.screen.width,
            image.screen.height,
            image.frames.len(),
            if iteration_count == 0 { "infinite".to_string() } else { iteration_count.to_string() }
        );
        Self {
            image,
            compositor,
            config,
            state: PlaybackState::Stopped,
            frame_index: 0,
            frame_elapsed: Duration::ZERO,
            loops_completed: 0,
            iteration_count,
            pending_iteration_count: None,
            frames_published: 0,
            decode_errors: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8], config: PlaybackConfig) -> Result<Self> {
        Ok(Self::new(decode::parse(bytes)?, config))
    }

    pub fn from_source(
        source: ImageSource,
        resolver: &dyn SourceResolver,
        config: PlaybackConfig,
    ) -> Result<Self> {
        let bytes = source.read_all(resolver)?;
        Self::from_bytes(&bytes, config)
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn screen(&self) -> &LogicalScreenDescriptor {
        &self.image.screen
    }

    pub fn image(&self) -> &ParsedImage {
        &self.image
    }

    pub fn frame_count(&self) -> usize {
        self.image.frames.len()
    }

    pub fn current_frame(&self) -> usize {
        self.frame_index
    }

    pub fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    pub fn iteration_count(&self) -> u16 {
        self.iteration_count
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Display time of `index`, floor-clamped.
    pub fn frame_delay(&self, index: usize) -> Duration {
        self.image
            .frames
            .get(index)
            .map_or(self.config.min_frame_delay, |f| {
                self.config.frame_delay(f.delay_centiseconds)
            })
    }

    /// Time left on the current frame while playing.
    pub fn time_until_next_frame(&self) -> Option<Duration> {
        (self.state == PlaybackState::Playing)
            .then(|| self.frame_delay(self.frame_index).saturating_sub(self.frame_elapsed))
    }

    /// Restart from frame 0 and publish it.
    pub fn start(&mut self, surface: &mut dyn PresentationSurface) -> TickOutcome {
        self.frame_index = 0;
        self.frame_elapsed = Duration::ZERO;
        self.loops_completed = 0;
        if let Some(count) = self.pending_iteration_count.take() {
            self.iteration_count = count;
        }
        self.compositor.reset();

        let mut outcome = TickOutcome::default();
        self.render_current(surface, &mut outcome);

        if self.image.is_animated() {
            self.state = PlaybackState::Playing;
        } else {
            debug!("Still image, holding first frame");
            self.state = PlaybackState::Stopped;
            outcome.finished = true;
        }
        outcome
    }

    /// Feed elapsed time. Steps at most one frame per call.
    ///
    /// Lateness past the current frame's delay is carried into the next frame so
    /// tick quantization does not accumulate, but never more than one tick and
    /// never enough to show the next frame for less than the delay floor.
    pub fn advance(&mut self, elapsed: Duration, surface: &mut dyn PresentationSurface) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.state != PlaybackState::Playing {
            return outcome;
        }

        self.frame_elapsed += elapsed;
        let delay = self.frame_delay(self.frame_index);
        if self.frame_elapsed < delay {
            return outcome;
        }

        let next = self.frame_index + 1;
        let next_delay = self.frame_delay(if next < self.frame_count() { next } else { 0 });
        self.frame_elapsed = (self.frame_elapsed - delay)
            .min(self.config.tick_interval)
            .min(next_delay.saturating_sub(self.config.min_frame_delay));

        if next < self.frame_count() {
            self.frame_index = next;
            self.render_current(surface, &mut outcome);
            return outcome;
        }

        // Loop boundary
        self.loops_completed += 1;
        if let Some(count) = self.pending_iteration_count.take() {
            debug!("Iteration count now {}", count);
            self.iteration_count = count;
        }

        if self.iteration_count != 0 && self.loops_completed >= self.iteration_count as u32 {
            info!("Playback finished after {} loop(s)", self.loops_completed);
            self.state = PlaybackState::Stopped;
            outcome.finished = true;
            return outcome;
        }

        self.frame_index = 0;
        self.compositor.reset();
        self.render_current(surface, &mut outcome);
        outcome
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
    }

    /// Takes effect at the next loop boundary, or immediately when not playing.
    pub fn set_iteration_count(&mut self, count: u16) {
        if self.state == PlaybackState::Stopped {
            self.iteration_count = count;
            self.pending_iteration_count = None;
        } else {
            self.pending_iteration_count = Some(count);
        }
    }

    /// Decode, composite and publish the frame under the cursor.
    fn render_current(&mut self, surface: &mut dyn PresentationSurface, outcome: &mut TickOutcome) {
        let index = self.frame_index;
        let delay = self.frame_delay(index);
        let record = &self.image.frames[index];
        let recovered = frame::decode_recovering(record, self.image.global_color_table.as_ref());
        if let Some(err) = &recovered.error {
            warn!("Frame {} decoded with errors: {}", index, err);
            self.decode_errors += 1;
            outcome.decode_errors += 1;
        }

        let frame = DecodedFrame {
            index,
            pixels: self.compositor.composite(record, &recovered.pixels),
            width: self.image.screen.width as u32,
            height: self.image.screen.height as u32,
            delay,
        };
        if let Err(e) = surface.publish(&frame) {
            warn!("Failed to publish frame {}: {}", index, e);
            return;
        }

        self.frames_published += 1;
        outcome.frames_published += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DisposalMethod;
    use crate::test_support::{GifBuilder, RecordingSurface, TestFrame};

    const PALETTE: [[u8; 3]; 4] = [[0, 0, 0], [255, 0, 0], [0, 255, 0], [0, 0, 255]];
    const TICK: Duration = Duration::from_millis(10);

    fn animated(frames: usize, loops: Option<u16>) -> GifInstance {
        let mut builder = GifBuilder::new(2, 2).global_palette(&PALETTE);
        if let Some(count) = loops {
            builder = builder.loop_count(count);
        }
        for i in 0..frames {
            builder = builder.frame(TestFrame::filled(2, 2, (i % 4) as u8).delay(5));
        }
        GifInstance::from_bytes(&builder.build(), PlaybackConfig::default()).unwrap()
    }

    /// Tick until stopped or `limit` ticks pass.
    fn run(instance: &mut GifInstance, surface: &mut RecordingSurface, limit: usize) {
        for _ in 0..limit {
            if instance.state() != PlaybackState::Playing {
                return;
            }
            instance.advance(TICK, surface);
        }
    }

    #[test]
    fn test_still_image_publishes_once() {
        let bytes = GifBuilder::new(2, 2)
            .global_palette(&PALETTE)
            .loop_count(0)
            .frame(TestFrame::filled(2, 2, 1))
            .build();
        let mut instance = GifInstance::from_bytes(&bytes, PlaybackConfig::default()).unwrap();
        let mut surface = RecordingSurface::new();

        let outcome = instance.start(&mut surface);
        assert!(outcome.finished);
        assert_eq!(instance.state(), PlaybackState::Stopped);

        for _ in 0..100 {
            instance.advance(TICK, &mut surface);
        }
        instance.resume();
        assert_eq!(instance.state(), PlaybackState::Stopped);
        assert_eq!(surface.count(), 1);
    }

    #[test]
    fn test_single_play_through_without_loop_extension() {
        let mut instance = animated(3, None);
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        run(&mut instance, &mut surface, 1000);

        assert_eq!(instance.state(), PlaybackState::Stopped);
        assert_eq!(instance.loops_completed(), 1);
        assert_eq!(surface.count(), 3);
        // Holds the last frame
        assert_eq!(instance.current_frame(), 2);
    }

    #[test]
    fn test_finite_iteration_count() {
        for loops in [1u16, 3] {
            let mut instance = animated(4, Some(loops));
            let mut surface = RecordingSurface::new();
            instance.start(&mut surface);
            run(&mut instance, &mut surface, 10_000);

            assert_eq!(instance.state(), PlaybackState::Stopped);
            assert_eq!(instance.loops_completed(), loops as u32);
            assert_eq!(surface.count(), 4 * loops as usize);
        }
    }

    #[test]
    fn test_infinite_iteration_count_keeps_playing() {
        let mut instance = animated(2, Some(0));
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        run(&mut instance, &mut surface, 1000);

        assert_eq!(instance.state(), PlaybackState::Playing);
        assert!(instance.loops_completed() > 10);
    }

    #[test]
    fn test_frames_published_in_order() {
        let mut instance = animated(4, Some(2));
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        run(&mut instance, &mut surface, 10_000);

        let indices: Vec<usize> = surface.frames().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1, 2, 3]);
        assert!(surface.frames().iter().all(|f| (f.width, f.height) == (2, 2)));
        assert!(surface.frames().iter().all(|f| f.delay == Duration::from_millis(50)));

        let reds: Vec<u8> = surface.frames().iter().map(|f| f.pixels[0]).collect();
        let greens: Vec<u8> = surface.frames().iter().map(|f| f.pixels[1]).collect();
        assert_eq!(reds, vec![0, 255, 0, 0, 0, 255, 0, 0]);
        assert_eq!(greens, vec![0, 0, 255, 0, 0, 0, 255, 0]);
    }

    #[test]
    fn test_zero_delay_uses_floor() {
        let bytes = GifBuilder::new(1, 1)
            .global_palette(&PALETTE)
            .loop_count(0)
            .frame(TestFrame::filled(1, 1, 1).delay(0))
            .frame(TestFrame::filled(1, 1, 2).without_control())
            .build();
        let config = PlaybackConfig {
            min_frame_delay: Duration::from_millis(50),
            tick_interval: TICK,
        };
        let mut instance = GifInstance::from_bytes(&bytes, config).unwrap();
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);

        assert_eq!(instance.frame_delay(0), Duration::from_millis(50));
        assert_eq!(instance.frame_delay(1), Duration::from_millis(50));
        for _ in 0..4 {
            instance.advance(TICK, &mut surface);
        }
        assert_eq!(surface.count(), 1);
        instance.advance(TICK, &mut surface);
        assert_eq!(surface.count(), 2);
    }

    #[test]
    fn test_tick_lateness_does_not_accumulate() {
        let config = PlaybackConfig {
            min_frame_delay: Duration::from_millis(20),
            tick_interval: Duration::from_millis(15),
        };
        let mut instance = GifInstance::new(animated(2, Some(0)).image().clone(), config);
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);

        // 50 ms frames on a 15 ms tick: advance k lands on tick ceil(50k / 15)
        for _ in 0..66 {
            instance.advance(config.tick_interval, &mut surface);
        }
        assert_eq!(surface.count(), 20);
        instance.advance(config.tick_interval, &mut surface);
        assert_eq!(surface.count(), 21);
    }

    #[test]
    fn test_carried_lateness_respects_floor() {
        let config = PlaybackConfig {
            min_frame_delay: Duration::from_millis(20),
            tick_interval: Duration::from_millis(15),
        };
        let bytes = GifBuilder::new(1, 1)
            .global_palette(&PALETTE)
            .loop_count(0)
            .frame(TestFrame::filled(1, 1, 1).delay(0))
            .frame(TestFrame::filled(1, 1, 2).delay(0))
            .build();
        let mut instance = GifInstance::from_bytes(&bytes, config).unwrap();
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);

        // Every frame needs two 15 ms ticks to reach the 20 ms floor
        for _ in 0..10 {
            instance.advance(config.tick_interval, &mut surface);
        }
        assert_eq!(surface.count(), 6);
        assert!(surface.frames().iter().all(|f| f.delay == config.min_frame_delay));
    }

    #[test]
    fn test_large_elapsed_advances_one_frame() {
        let mut instance = animated(5, Some(0));
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        instance.advance(Duration::from_secs(10), &mut surface);
        assert_eq!(instance.current_frame(), 1);
        assert_eq!(surface.count(), 2);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut instance = animated(3, Some(0));
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);

        instance.pause();
        assert_eq!(instance.state(), PlaybackState::Paused);
        assert_eq!(instance.time_until_next_frame(), None);
        for _ in 0..50 {
            instance.advance(TICK, &mut surface);
        }
        assert_eq!(surface.count(), 1);

        instance.resume();
        assert_eq!(instance.state(), PlaybackState::Playing);
        for _ in 0..5 {
            instance.advance(TICK, &mut surface);
        }
        assert_eq!(surface.count(), 2);
    }

    #[test]
    fn test_stop_then_start_restarts() {
        let mut instance = animated(3, Some(0));
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        run(&mut instance, &mut surface, 7);
        instance.stop();
        let published = surface.count();
        instance.advance(Duration::from_secs(1), &mut surface);
        assert_eq!(surface.count(), published);

        instance.start(&mut surface);
        assert_eq!(instance.current_frame(), 0);
        assert_eq!(instance.loops_completed(), 0);
        assert_eq!(instance.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_iteration_change_applies_at_loop_boundary() {
        let mut instance = animated(2, Some(0));
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);

        instance.set_iteration_count(2);
        assert_eq!(instance.iteration_count(), 0);
        run(&mut instance, &mut surface, 10_000);

        // The first boundary applies the new count and counts as loop 1
        assert_eq!(instance.iteration_count(), 2);
        assert_eq!(instance.loops_completed(), 2);
        assert_eq!(surface.count(), 4);
    }

    #[test]
    fn test_corrupt_frame_does_not_stop_playback() {
        let bytes = GifBuilder::new(2, 2)
            .global_palette(&PALETTE)
            .frame(TestFrame::filled(2, 2, 1).delay(5))
            .frame(TestFrame::filled(2, 2, 2).delay(5))
            .frame(TestFrame::filled(2, 2, 3).delay(5))
            .build();
        let mut image = decode::parse(&bytes).unwrap();
        let data = &mut image.frames[1].compressed;
        data.truncate(data.len() / 2);

        let mut instance = GifInstance::new(image, PlaybackConfig::default());
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        run(&mut instance, &mut surface, 1000);

        assert_eq!(instance.decode_errors(), 1);
        assert_eq!(surface.count(), 3);
        let last = surface.frames().pop().unwrap();
        assert_eq!(&last.pixels[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_loop_restart_resets_canvas() {
        let bytes = GifBuilder::new(2, 1)
            .global_palette(&PALETTE)
            .loop_count(2)
            .frame(TestFrame::filled(1, 1, 1).delay(5).disposal(DisposalMethod::DoNotDispose))
            .frame(TestFrame::filled(1, 1, 2).at(1, 0).delay(5))
            .build();
        let mut instance = GifInstance::from_bytes(&bytes, PlaybackConfig::default()).unwrap();
        let mut surface = RecordingSurface::new();
        instance.start(&mut surface);
        run(&mut instance, &mut surface, 1000);

        let frames = surface.frames();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].pixels, frames[2].pixels);
        assert_eq!(&frames[2].pixels[4..], &[0, 0, 0, 0]);
    }
}
