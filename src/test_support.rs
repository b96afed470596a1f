/// Fixture helpers: a byte-level GIF writer and a recording surface.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::decode::DisposalMethod;
use crate::render::{DecodedFrame, PresentationSurface};

/// One frame to be written by [`GifBuilder`]. Indices are row-major.
#[derive(Debug, Clone)]
pub struct TestFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub indices: Vec<u8>,
    /// `None` writes no graphic control extension at all.
    pub delay_cs: Option<u16>,
    pub disposal: DisposalMethod,
    pub transparent: Option<u8>,
    pub local_palette: Option<Vec<[u8; 3]>>,
    pub interlaced: bool,
    /// Descriptor size written instead of `width x height`; the data stays as given.
    pub declared_size: Option<(u16, u16)>,
}

impl TestFrame {
    pub fn new(width: u16, height: u16, indices: Vec<u8>) -> Self {
        assert_eq!(indices.len(), width as usize * height as usize);
        Self {
            left: 0,
            top: 0,
            width,
            height,
            indices,
            delay_cs: Some(10),
            disposal: DisposalMethod::None,
            transparent: None,
            local_palette: None,
            interlaced: false,
            declared_size: None,
        }
    }

    pub fn filled(width: u16, height: u16, index: u8) -> Self {
        Self::new(width, height, vec![index; width as usize * height as usize])
    }

    pub fn at(mut self, left: u16, top: u16) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn delay(mut self, centiseconds: u16) -> Self {
        self.delay_cs = Some(centiseconds);
        self
    }

    pub fn without_control(mut self) -> Self {
        self.delay_cs = None;
        self.disposal = DisposalMethod::None;
        self.transparent = None;
        self
    }

    pub fn disposal(mut self, disposal: DisposalMethod) -> Self {
        self.disposal = disposal;
        self
    }

    pub fn transparent(mut self, index: u8) -> Self {
        self.transparent = Some(index);
        self
    }

    pub fn local_palette(mut self, palette: &[[u8; 3]]) -> Self {
        self.local_palette = Some(palette.to_vec());
        self
    }

    pub fn interlaced(mut self) -> Self {
        self.interlaced = true;
        self
    }

    pub fn declared_size(mut self, width: u16, height: u16) -> Self {
        self.declared_size = Some((width, height));
        self
    }

    fn has_control(&self) -> bool {
        self.delay_cs.is_some() || self.transparent.is_some() || self.disposal != DisposalMethod::None
    }

    fn min_code_size(&self) -> u8 {
        let max = self.indices.iter().copied().max().unwrap_or(0);
        if max == 0 {
            2
        } else {
            (8 - max.leading_zeros() as u8).max(2)
        }
    }
}

/// Writes GIF89a streams with a deliberately simple LZW encoding.
#[derive(Debug, Clone)]
pub struct GifBuilder {
    width: u16,
    height: u16,
    global_palette: Option<Vec<[u8; 3]>>,
    background: u8,
    loop_count: Option<u16>,
    comments: Vec<String>,
    frames: Vec<TestFrame>,
    trailer: bool,
}

impl GifBuilder {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            global_palette: None,
            background: 0,
            loop_count: None,
            comments: Vec::new(),
            frames: Vec::new(),
            trailer: true,
        }
    }

    pub fn global_palette(mut self, palette: &[[u8; 3]]) -> Self {
        self.global_palette = Some(palette.to_vec());
        self
    }

    pub fn background(mut self, index: u8) -> Self {
        self.background = index;
        self
    }

    pub fn loop_count(mut self, count: u16) -> Self {
        self.loop_count = Some(count);
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comments.push(text.to_string());
        self
    }

    pub fn frame(mut self, frame: TestFrame) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn without_trailer(mut self) -> Self {
        self.trailer = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"GIF89a");
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());

        let mut packed = 0x70;
        if let Some(palette) = &self.global_palette {
            packed |= 0x80 | size_field(palette.len());
        }
        out.push(packed);
        out.push(self.background);
        out.push(0);
        if let Some(palette) = &self.global_palette {
            write_palette(&mut out, palette);
        }

        if let Some(count) = self.loop_count {
            out.extend_from_slice(&[0x21, 0xFF, 0x0B]);
            out.extend_from_slice(b"NETSCAPE2.0");
            out.extend_from_slice(&[0x03, 0x01]);
            out.extend_from_slice(&count.to_le_bytes());
            out.push(0);
        }

        for comment in &self.comments {
            out.extend_from_slice(&[0x21, 0xFE]);
            write_sub_blocks(&mut out, comment.as_bytes());
        }

        for frame in &self.frames {
            if frame.has_control() {
                let disposal = match frame.disposal {
                    DisposalMethod::None => 0,
                    DisposalMethod::DoNotDispose => 1,
                    DisposalMethod::RestoreBackground => 2,
                    DisposalMethod::RestorePrevious => 3,
                };
                let flags = (disposal << 2) | u8::from(frame.transparent.is_some());
                out.extend_from_slice(&[0x21, 0xF9, 0x04, flags]);
                out.extend_from_slice(&frame.delay_cs.unwrap_or(0).to_le_bytes());
                out.push(frame.transparent.unwrap_or(0));
                out.push(0);
            }

            out.push(0x2C);
            out.extend_from_slice(&frame.left.to_le_bytes());
            out.extend_from_slice(&frame.top.to_le_bytes());
            let (width, height) = frame.declared_size.unwrap_or((frame.width, frame.height));
            out.extend_from_slice(&width.to_le_bytes());
            out.extend_from_slice(&height.to_le_bytes());
            let mut packed = 0;
            if let Some(palette) = &frame.local_palette {
                packed |= 0x80 | size_field(palette.len());
            }
            if frame.interlaced {
                packed |= 0x40;
            }
            out.push(packed);
            if let Some(palette) = &frame.local_palette {
                write_palette(&mut out, palette);
            }

            let stream_order = if frame.interlaced {
                interlace_rows(&frame.indices, frame.width as usize, frame.height as usize)
            } else {
                frame.indices.clone()
            };
            let min_code_size = frame.min_code_size();
            out.push(min_code_size);
            write_sub_blocks(&mut out, &lzw_encode(&stream_order, min_code_size));
        }

        if self.trailer {
            out.push(0x3B);
        }
        out
    }
}

fn size_field(len: usize) -> u8 {
    let mut size = 0u8;
    while (1usize << (size + 1)) < len && size < 7 {
        size += 1;
    }
    size
}

fn write_palette(out: &mut Vec<u8>, palette: &[[u8; 3]]) {
    let entries = 1usize << (size_field(palette.len()) + 1);
    for i in 0..entries {
        out.extend_from_slice(&palette.get(i).copied().unwrap_or([0, 0, 0]));
    }
}

fn write_sub_blocks(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
}

/// Emits a clear code before every literal so the code width never grows.
pub fn lzw_encode(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear = 1u32 << min_code_size;
    let end = clear + 1;
    let width = min_code_size as u32 + 1;

    let mut out = Vec::new();
    let mut acc = 0u32;
    let mut bits = 0u32;
    let mut push = |code: u32, out: &mut Vec<u8>| {
        acc |= code << bits;
        bits += width;
        while bits >= 8 {
            out.push((acc & 0xFF) as u8);
            acc >>= 8;
            bits -= 8;
        }
    };

    for &index in indices {
        push(clear, &mut out);
        push(index as u32, &mut out);
    }
    push(end, &mut out);
    if bits > 0 {
        out.push((acc & 0xFF) as u8);
    }
    out
}

/// Reorders row-major indices into the 4-pass interlaced stream order.
pub fn interlace_rows(indices: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len());
    for (start, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        for y in (start..height).step_by(step) {
            out.extend_from_slice(&indices[y * width..(y + 1) * width]);
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct Published {
    pub index: usize,
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub delay: Duration,
    pub at: tokio::time::Instant,
}

/// Surface that keeps every published frame for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    frames: Arc<Mutex<Vec<Published>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Published> {
        self.frames.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

impl PresentationSurface for RecordingSurface {
    fn publish(&mut self, frame: &DecodedFrame<'_>) -> std::io::Result<()> {
        self.frames.lock().unwrap().push(Published {
            index: frame.index,
            pixels: frame.pixels.to_vec(),
            width: frame.width,
            height: frame.height,
            delay: frame.delay,
            at: tokio::time::Instant::now(),
        });
        Ok(())
    }
}
