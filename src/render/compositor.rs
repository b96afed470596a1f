/// Disposal-aware frame compositor.
/// Keeps the logical-screen canvas between frames and applies each frame's
/// disposal method before the next one is drawn.
use crate::decode::{DisposalMethod, FramePixels, FrameRecord, LogicalScreenDescriptor};

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// Frame rectangle clipped to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

impl Region {
    fn clipped(record: &FrameRecord, canvas_width: usize, canvas_height: usize) -> Self {
        let left = (record.left as usize).min(canvas_width);
        let top = (record.top as usize).min(canvas_height);
        Self {
            left,
            top,
            width: (record.width as usize).min(canvas_width - left),
            height: (record.height as usize).min(canvas_height - top),
        }
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What to do to the previous frame's region before drawing the next frame.
#[derive(Debug, Clone)]
struct PendingDisposal {
    method: DisposalMethod,
    region: Region,
    clear_to: [u8; 4],
    /// Region contents from just before the frame was drawn (RestorePrevious only).
    saved: Option<Vec<u8>>,
}

pub struct Compositor {
    width: usize,
    height: usize,
    canvas: Vec<u8>,
    background: Option<[u8; 3]>,
    pending: Option<PendingDisposal>,
}

impl Compositor {
    /// `background` is the global table's background color, used by
    /// RestoreBackground for frames without a transparent index.
    pub fn new(screen: &LogicalScreenDescriptor, background: Option<[u8; 3]>) -> Self {
        let width = screen.width as usize;
        let height = screen.height as usize;
        Self {
            width,
            height,
            canvas: vec![0; width * height * 4],
            background,
            pending: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn canvas(&self) -> &[u8] {
        &self.canvas
    }

    /// Back to a fully transparent canvas with nothing pending.
    pub fn reset(&mut self) {
        self.canvas.fill(0);
        self.pending = None;
    }

    /// Dispose the previous frame, draw `pixels` at the record's offset and return the canvas.
    pub fn composite(&mut self, record: &FrameRecord, pixels: &FramePixels) -> &[u8] {
        self.dispose_previous();

        let region = Region::clipped(record, self.width, self.height);
        let saved = match record.disposal {
            DisposalMethod::RestorePrevious => Some(self.copy_region(region)),
            _ => None,
        };

        self.blit(region, pixels);

        let clear_to = match (record.transparent_index, self.background) {
            (None, Some([r, g, b])) => [r, g, b, 255],
            _ => TRANSPARENT,
        };
        self.pending = Some(PendingDisposal {
            method: record.disposal,
            region,
            clear_to,
            saved,
        });

        &self.canvas
    }

    /// Apply the last drawn frame's disposal method to its region.
    pub fn dispose_previous(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.region.is_empty() {
            return;
        }

        match pending.method {
            DisposalMethod::None | DisposalMethod::DoNotDispose => {}
            DisposalMethod::RestoreBackground => self.fill_region(pending.region, pending.clear_to),
            DisposalMethod::RestorePrevious => {
                if let Some(saved) = pending.saved {
                    self.restore_region(pending.region, &saved);
                }
            }
        }
    }

    fn row_range(&self, region: Region, row: usize) -> std::ops::Range<usize> {
        let start = ((region.top + row) * self.width + region.left) * 4;
        start..start + region.width * 4
    }

    fn copy_region(&self, region: Region) -> Vec<u8> {
        let mut saved = Vec::with_capacity(region.width * region.height * 4);
        for row in 0..region.height {
            saved.extend_from_slice(&self.canvas[self.row_range(region, row)]);
        }
        saved
    }

    fn restore_region(&mut self, region: Region, saved: &[u8]) {
        let stride = region.width * 4;
        for (row, src) in saved.chunks_exact(stride).enumerate().take(region.height) {
            let range = self.row_range(region, row);
            self.canvas[range].copy_from_slice(src);
        }
    }

    fn fill_region(&mut self, region: Region, color: [u8; 4]) {
        for row in 0..region.height {
            let range = self.row_range(region, row);
            for px in self.canvas[range].chunks_exact_mut(4) {
                px.copy_from_slice(&color);
            }
        }
    }

    /// Copy opaque pixels; alpha-0 pixels leave the canvas untouched.
    fn blit(&mut self, region: Region, pixels: &FramePixels) {
        let src_stride = pixels.width as usize * 4;
        let region = Region {
            width: region.width.min(pixels.width as usize),
            height: region.height.min(pixels.height as usize),
            ..region
        };
        for row in 0..region.height {
            let src_start = row * src_stride;
            let src = &pixels.rgba[src_start..src_start + region.width * 4];
            let range = self.row_range(region, row);
            for (dst, src) in self.canvas[range].chunks_exact_mut(4).zip(src.chunks_exact(4)) {
                if src[3] != 0 {
                    dst.copy_from_slice(src);
                }
            }
        }
    }
}
