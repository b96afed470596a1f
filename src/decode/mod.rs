/// GIF container model and decoding stages.
/// `parser` turns bytes into frame records, `lzw` and `frame` turn one record into pixels.
pub mod frame;
pub mod lzw;
pub mod parser;

pub use frame::{FramePixels, RecoveredFrame};
pub use parser::parse;

pub const GIF87A_SIGNATURE: &[u8; 6] = b"GIF87a";
pub const GIF89A_SIGNATURE: &[u8; 6] = b"GIF89a";

pub const EXTENSION_INTRODUCER: u8 = 0x21;
pub const IMAGE_SEPARATOR: u8 = 0x2C;
pub const TRAILER: u8 = 0x3B;

pub const PLAIN_TEXT_LABEL: u8 = 0x01;
pub const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
pub const COMMENT_LABEL: u8 = 0xFE;
pub const APPLICATION_LABEL: u8 = 0xFF;

pub const MIN_LZW_CODE_SIZE: u8 = 1;
pub const MAX_LZW_CODE_SIZE: u8 = 11;

/// Logical screen descriptor: the canvas every frame is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalScreenDescriptor {
    pub width: u16,
    pub height: u16,
    pub has_global_color_table: bool,
    pub color_resolution: u8,
    pub sorted: bool,
    /// Packed size field; the table holds 2^(n+1) entries.
    pub global_color_table_size: u8,
    pub background_color_index: u8,
    pub pixel_aspect_ratio: u8,
}

impl LogicalScreenDescriptor {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Ordered RGB palette, 2..=256 entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    entries: Vec<[u8; 3]>,
}

impl ColorTable {
    pub fn new(entries: Vec<[u8; 3]>) -> Self {
        Self { entries }
    }

    /// Number of entries declared by a packed 3-bit size field.
    pub fn entries_for_size_field(size: u8) -> usize {
        1 << ((size & 0x07) + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.entries.get(index as usize).copied()
    }

    pub fn entries(&self) -> &[[u8; 3]] {
        &self.entries
    }
}

/// How a frame's rectangle is treated before the next frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    /// Unspecified; leave the canvas as drawn.
    #[default]
    None,
    /// Explicit keep.
    DoNotDispose,
    /// Clear the rectangle to background.
    RestoreBackground,
    /// Put back what was under the rectangle before this frame.
    RestorePrevious,
}

impl DisposalMethod {
    /// Decode from the graphic control extension's packed field (bits 2..4).
    pub fn from_packed(flags: u8) -> Self {
        match (flags >> 2) & 0x07 {
            1 => DisposalMethod::DoNotDispose,
            2 => DisposalMethod::RestoreBackground,
            3 => DisposalMethod::RestorePrevious,
            _ => DisposalMethod::None,
        }
    }
}

/// One image block plus the graphic control data that preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    /// Part of the rectangle that lies on the logical screen. Pixels outside it
    /// are never stored.
    pub visible_width: u16,
    pub visible_height: u16,
    pub interlaced: bool,
    pub local_color_table: Option<ColorTable>,
    pub transparent_index: Option<u8>,
    /// Raw delay; 0 when absent. The player applies its floor.
    pub delay_centiseconds: u16,
    pub disposal: DisposalMethod,
    pub min_code_size: u8,
    /// Concatenated LZW sub-block payload, decompressed lazily.
    pub compressed: Vec<u8>,
}

impl FrameRecord {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the frame rectangle lies inside the logical screen.
    pub fn fits_screen(&self, screen: &LogicalScreenDescriptor) -> bool {
        self.left as u32 + self.width as u32 <= screen.width as u32
            && self.top as u32 + self.height as u32 <= screen.height as u32
    }

    /// Local table if declared, else the global one.
    pub fn active_color_table<'a>(&'a self, global: Option<&'a ColorTable>) -> Option<&'a ColorTable> {
        self.local_color_table.as_ref().or(global)
    }
}

/// NETSCAPE2.0 looping block. Zero means loop forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopExtension {
    pub iteration_count: u16,
}

/// Everything the container parser extracts from one GIF stream.
#[derive(Debug, Clone)]
pub struct ParsedImage {
    pub screen: LogicalScreenDescriptor,
    pub global_color_table: Option<ColorTable>,
    pub frames: Vec<FrameRecord>,
    pub loop_extension: Option<LoopExtension>,
    pub comments: Vec<String>,
}

impl ParsedImage {
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Iteration count to play; a missing extension means one play-through.
    pub fn iteration_count(&self) -> u16 {
        self.loop_extension.map_or(1, |ext| ext.iteration_count)
    }

    /// Opaque background color from the global table, if one is declared.
    pub fn background_color(&self) -> Option<[u8; 3]> {
        self.global_color_table
            .as_ref()
            .and_then(|table| table.get(self.screen.background_color_index))
    }
}
