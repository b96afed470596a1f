/// Presentation surfaces: a scaled tiny-skia pixmap (optionally dumped to PNG),
/// raw RGBA to a writer, and a discarding surface.
use std::io::{self, Write};
use std::path::PathBuf;
use tiny_skia::{Color, FilterQuality, Pixmap, PixmapPaint, Transform};
use tracing::debug;

use super::{DecodedFrame, PresentationSurface};

/// Draws each frame into a pixmap scaled by a DPI factor.
pub struct PixmapSurface {
    scale: f32,
    /// Premultiplied copy of the last frame at logical size, reused across publishes.
    source: Option<Pixmap>,
    target: Option<Pixmap>,
    /// When set, every published frame is saved as `frame_NNNNN.png` here.
    output_dir: Option<PathBuf>,
    frames_written: u64,
}

impl PixmapSurface {
    pub fn new(scale: f32) -> Self {
        Self {
            scale: if scale > 0.0 { scale } else { 1.0 },
            source: None,
            target: None,
            output_dir: None,
            frames_written: 0,
        }
    }

    pub fn with_png_output(scale: f32, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
            ..Self::new(scale)
        }
    }

    /// The most recently drawn frame, at device size.
    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.target.as_ref()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn device_size(&self, width: u32, height: u32) -> (u32, u32) {
        let w = (width as f32 * self.scale).round().max(1.0) as u32;
        let h = (height as f32 * self.scale).round().max(1.0) as u32;
        (w, h)
    }
}

/// Keep `slot` holding a `width x height` pixmap, reallocating only on size change.
fn sized_pixmap(slot: &mut Option<Pixmap>, width: u32, height: u32) -> io::Result<&mut Pixmap> {
    let stale = slot
        .as_ref()
        .is_none_or(|p| p.width() != width || p.height() != height);
    if stale {
        *slot = Pixmap::new(width, height);
    }
    slot.as_mut()
        .ok_or_else(|| io::Error::other(format!("invalid pixmap size {width}x{height}")))
}

/// tiny-skia expects premultiplied alpha RGBA
fn premultiply_into(dst: &mut Pixmap, pixels: &[u8]) {
    for (dst, src) in dst.data_mut().chunks_exact_mut(4).zip(pixels.chunks_exact(4)) {
        let a = src[3] as f32 / 255.0;
        dst[0] = (src[0] as f32 * a) as u8;
        dst[1] = (src[1] as f32 * a) as u8;
        dst[2] = (src[2] as f32 * a) as u8;
        dst[3] = src[3];
    }
}

impl PresentationSurface for PixmapSurface {
    fn publish(&mut self, frame: &DecodedFrame<'_>) -> io::Result<()> {
        let (dw, dh) = self.device_size(frame.width, frame.height);
        let source = sized_pixmap(&mut self.source, frame.width, frame.height)?;
        premultiply_into(source, frame.pixels);

        let target = sized_pixmap(&mut self.target, dw, dh)?;
        target.fill(Color::TRANSPARENT);
        let paint = PixmapPaint {
            quality: FilterQuality::Nearest,
            ..PixmapPaint::default()
        };
        target.draw_pixmap(
            0,
            0,
            Pixmap::as_ref(source),
            &paint,
            Transform::from_scale(self.scale, self.scale),
            None,
        );

        if let Some(dir) = &self.output_dir {
            let path = dir.join(format!("frame_{:05}.png", self.frames_written));
            target
                .save_png(&path)
                .map_err(|e| io::Error::other(format!("Failed to save PNG: {}", e)))?;
            debug!("Saved frame {} to {}", frame.index, path.display());
        }

        self.frames_written += 1;
        Ok(())
    }
}

/// Writes raw RGBA frames back to back (for piping).
pub struct RawSurface<W: Write + Send> {
    writer: W,
}

impl RawSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl<W: Write + Send> RawSurface<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> PresentationSurface for RawSurface<W> {
    fn publish(&mut self, frame: &DecodedFrame<'_>) -> io::Result<()> {
        self.writer.write_all(frame.pixels)?;
        self.writer.flush()
    }
}

/// Drops every frame; counts them.
#[derive(Debug, Default)]
pub struct NullSurface {
    pub frames: u64,
}

impl PresentationSurface for NullSurface {
    fn publish(&mut self, _frame: &DecodedFrame<'_>) -> io::Result<()> {
        self.frames += 1;
        Ok(())
    }
}
