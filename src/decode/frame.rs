/// Frame decoder: LZW indices -> row-major RGBA for one frame rectangle.
use super::{lzw, ColorTable, FrameRecord};
use crate::error::DecodeError;

/// Interlace passes as (first row, row step).
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// Straight-alpha RGBA pixels covering the on-screen part of the frame rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePixels {
    pub width: u16,
    pub height: u16,
    pub rgba: Vec<u8>,
}

impl FramePixels {
    /// Fully transparent stand-in for a frame that could not be decoded at all.
    pub fn blank(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        }
    }
}

/// A best-effort frame plus the error that degraded it, if any.
#[derive(Debug, Clone)]
pub struct RecoveredFrame {
    pub pixels: FramePixels,
    pub error: Option<DecodeError>,
}

/// Strict decode: any corruption is an error.
pub fn decode(record: &FrameRecord, global: Option<&ColorTable>) -> Result<FramePixels, DecodeError> {
    let recovered = decode_recovering(record, global);
    match recovered.error {
        Some(err) => Err(err),
        None => Ok(recovered.pixels),
    }
}

/// Lenient decode: corrupt or short streams are padded with index 0 and
/// the first problem is returned next to the pixels.
///
/// Only the on-screen part of the rectangle is kept, so the buffer is
/// `visible_width x visible_height` whatever size the descriptor declares.
pub fn decode_recovering(record: &FrameRecord, global: Option<&ColorTable>) -> RecoveredFrame {
    let (visible_width, visible_height) = (record.visible_width, record.visible_height);
    let Some(table) = record.active_color_table(global) else {
        return RecoveredFrame {
            pixels: FramePixels::blank(visible_width, visible_height),
            error: Some(DecodeError::NoColorTable),
        };
    };

    let width = record.width as usize;
    let height = record.height as usize;
    let (vw, vh) = (visible_width as usize, visible_height as usize);
    let mut indices = vec![0u8; vw * vh];

    let error = lzw::decode_with(
        &record.compressed,
        record.min_code_size,
        record.pixel_count(),
        |pos, index| {
            let (stream_row, x) = (pos / width, pos % width);
            let y = if record.interlaced {
                interlaced_row(stream_row, height)
            } else {
                stream_row
            };
            if x < vw && y < vh {
                indices[y * vw + x] = index;
            }
        },
    );

    RecoveredFrame {
        pixels: FramePixels {
            width: visible_width,
            height: visible_height,
            rgba: map_indices(&indices, table, record.transparent_index),
        },
        error,
    }
}

/// Image row carried by the `stream_row`-th row of an interlaced stream.
fn interlaced_row(stream_row: usize, height: usize) -> usize {
    let mut remaining = stream_row;
    for (start, step) in INTERLACE_PASSES {
        let rows = if start < height { (height - start).div_ceil(step) } else { 0 };
        if remaining < rows {
            return start + remaining * step;
        }
        remaining -= rows;
    }
    height
}

/// Reorder rows delivered in 4-pass interlaced order into row-major order.
pub fn deinterlace(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut output = vec![0u8; width * height];
    if width == 0 {
        return output;
    }

    for (stream_row, row) in data.chunks_exact(width).take(height).enumerate() {
        let y = interlaced_row(stream_row, height);
        output[y * width..(y + 1) * width].copy_from_slice(row);
    }

    output
}

fn map_indices(indices: &[u8], table: &ColorTable, transparent: Option<u8>) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(indices.len() * 4);
    for &index in indices {
        if transparent == Some(index) {
            rgba.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        // Out-of-range indices render as opaque black
        let [r, g, b] = table.get(index).unwrap_or([0, 0, 0]);
        rgba.extend_from_slice(&[r, g, b, 255]);
    }
    rgba
}
