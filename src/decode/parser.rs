/// GIF container parser.
/// Walks the block structure and collects frame records; LZW data is left compressed.
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::{debug, trace};

use super::{
    ColorTable, DisposalMethod, FrameRecord, LogicalScreenDescriptor, LoopExtension, ParsedImage,
    APPLICATION_LABEL, COMMENT_LABEL, EXTENSION_INTRODUCER, GIF87A_SIGNATURE, GIF89A_SIGNATURE,
    GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR, MAX_LZW_CODE_SIZE, MIN_LZW_CODE_SIZE, PLAIN_TEXT_LABEL,
    TRAILER,
};
use crate::error::FormatError;

type Result<T> = std::result::Result<T, FormatError>;

/// Graphic control data waiting for the next image block.
#[derive(Debug, Clone, Copy)]
struct GraphicControl {
    disposal: DisposalMethod,
    transparent_index: Option<u8>,
    delay_centiseconds: u16,
}

/// Byte reader that reports every short read as truncation of a named field.
struct BlockReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BlockReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    fn is_at_end(&self) -> bool {
        self.cursor.position() as usize >= self.cursor.get_ref().len()
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        self.cursor.read_u8().map_err(|_| FormatError::Truncated(what))
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| FormatError::Truncated(what))
    }

    fn bytes(&mut self, len: usize, what: &'static str) -> Result<&'a [u8]> {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        let end = start + len;
        if end > data.len() {
            return Err(FormatError::Truncated(what));
        }
        self.cursor.set_position(end as u64);
        Ok(&data[start..end])
    }

    fn color_table(&mut self, size_field: u8, what: &'static str) -> Result<ColorTable> {
        let entries = ColorTable::entries_for_size_field(size_field);
        let raw = self.bytes(entries * 3, what)?;
        Ok(ColorTable::new(
            raw.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
        ))
    }

    /// Concatenate length-prefixed sub-blocks up to the zero terminator.
    fn sub_blocks(&mut self, what: &'static str) -> Result<Vec<u8>> {
        let mut collected = Vec::new();
        loop {
            let len = self.u8(what)? as usize;
            if len == 0 {
                return Ok(collected);
            }
            collected.extend_from_slice(self.bytes(len, what)?);
        }
    }

    fn skip_sub_blocks(&mut self, what: &'static str) -> Result<()> {
        loop {
            let len = self.u8(what)? as usize;
            if len == 0 {
                return Ok(());
            }
            self.bytes(len, what)?;
        }
    }
}

/// Parse a complete GIF stream into its screen descriptor and frame records.
pub fn parse(data: &[u8]) -> Result<ParsedImage> {
    let mut reader = BlockReader::new(data);

    let signature = reader
        .bytes(6, "header")
        .map_err(|_| FormatError::InvalidHeader)?;
    if signature != GIF87A_SIGNATURE && signature != GIF89A_SIGNATURE {
        return Err(FormatError::InvalidHeader);
    }

    let screen = read_screen_descriptor(&mut reader)?;
    if screen.width == 0 || screen.height == 0 {
        return Err(FormatError::EmptyScreen {
            width: screen.width,
            height: screen.height,
        });
    }

    let global_color_table = if screen.has_global_color_table {
        Some(reader.color_table(screen.global_color_table_size, "global color table")?)
    } else {
        None
    };

    let mut frames = Vec::new();
    let mut loop_extension = None;
    let mut comments = Vec::new();
    let mut pending_control: Option<GraphicControl> = None;

    while !reader.is_at_end() {
        match reader.u8("block introducer")? {
            EXTENSION_INTRODUCER => match reader.u8("extension label")? {
                GRAPHIC_CONTROL_LABEL => {
                    pending_control = Some(read_graphic_control(&mut reader)?);
                }
                APPLICATION_LABEL => {
                    if let Some(ext) = read_application_extension(&mut reader)? {
                        debug!("Loop extension: {} iteration(s)", ext.iteration_count);
                        loop_extension = Some(ext);
                    }
                }
                COMMENT_LABEL => {
                    let text = reader.sub_blocks("comment extension")?;
                    comments.push(String::from_utf8_lossy(&text).into_owned());
                }
                PLAIN_TEXT_LABEL => {
                    // Plain text rendering is not supported; the control block it consumed is dropped
                    pending_control = None;
                    reader.skip_sub_blocks("plain text extension")?;
                }
                label => {
                    trace!("Skipping unknown extension 0x{:02X}", label);
                    reader.skip_sub_blocks("extension")?;
                }
            },
            IMAGE_SEPARATOR => {
                let frame = read_image(&mut reader, &screen, pending_control.take())?;
                trace!(
                    "Frame {}: {}x{} at ({}, {})",
                    frames.len(),
                    frame.width,
                    frame.height,
                    frame.left,
                    frame.top
                );
                frames.push(frame);
            }
            TRAILER => break,
            other => return Err(FormatError::UnknownBlock(other)),
        }
    }

    if frames.is_empty() {
        return Err(FormatError::NoFrames);
    }

    debug!(
        "Parsed GIF: {}x{}, {} frame(s), global table: {}",
        screen.width,
        screen.height,
        frames.len(),
        global_color_table.as_ref().map_or(0, ColorTable::len)
    );

    Ok(ParsedImage {
        screen,
        global_color_table,
        frames,
        loop_extension,
        comments,
    })
}

fn read_screen_descriptor(reader: &mut BlockReader<'_>) -> Result<LogicalScreenDescriptor> {
    const WHAT: &str = "logical screen descriptor";
    let width = reader.u16(WHAT)?;
    let height = reader.u16(WHAT)?;
    let packed = reader.u8(WHAT)?;
    let background_color_index = reader.u8(WHAT)?;
    let pixel_aspect_ratio = reader.u8(WHAT)?;

    Ok(LogicalScreenDescriptor {
        width,
        height,
        has_global_color_table: packed & 0x80 != 0,
        color_resolution: ((packed >> 4) & 0x07) + 1,
        sorted: packed & 0x08 != 0,
        global_color_table_size: packed & 0x07,
        background_color_index,
        pixel_aspect_ratio,
    })
}

fn read_graphic_control(reader: &mut BlockReader<'_>) -> Result<GraphicControl> {
    const WHAT: &str = "graphic control extension";
    let size = reader.u8(WHAT)? as usize;
    let body = reader.bytes(size, WHAT)?;
    reader.skip_sub_blocks(WHAT)?;

    if body.len() < 4 {
        return Err(FormatError::Truncated(WHAT));
    }
    let flags = body[0];
    Ok(GraphicControl {
        disposal: DisposalMethod::from_packed(flags),
        transparent_index: (flags & 0x01 != 0).then_some(body[3]),
        delay_centiseconds: u16::from_le_bytes([body[1], body[2]]),
    })
}

fn read_application_extension(reader: &mut BlockReader<'_>) -> Result<Option<LoopExtension>> {
    const WHAT: &str = "application extension";
    let size = reader.u8(WHAT)? as usize;
    let identifier = reader.bytes(size, WHAT)?;

    if identifier != b"NETSCAPE2.0" && identifier != b"ANIMEXTS1.0" {
        reader.skip_sub_blocks(WHAT)?;
        return Ok(None);
    }

    let mut loop_extension = None;
    loop {
        let len = reader.u8(WHAT)? as usize;
        if len == 0 {
            return Ok(loop_extension);
        }
        let block = reader.bytes(len, WHAT)?;
        // Sub-block id 1 carries the loop count; id 2 (buffering hint) is ignored
        if block.len() >= 3 && block[0] == 0x01 {
            loop_extension = Some(LoopExtension {
                iteration_count: u16::from_le_bytes([block[1], block[2]]),
            });
        }
    }
}

fn read_image(
    reader: &mut BlockReader<'_>,
    screen: &LogicalScreenDescriptor,
    control: Option<GraphicControl>,
) -> Result<FrameRecord> {
    const WHAT: &str = "image descriptor";
    let left = reader.u16(WHAT)?;
    let top = reader.u16(WHAT)?;
    let width = reader.u16(WHAT)?;
    let height = reader.u16(WHAT)?;
    let packed = reader.u8(WHAT)?;

    let local_color_table = if packed & 0x80 != 0 {
        Some(reader.color_table(packed & 0x07, "local color table")?)
    } else {
        None
    };

    let min_code_size = reader.u8("LZW minimum code size")?;
    if !(MIN_LZW_CODE_SIZE..=MAX_LZW_CODE_SIZE).contains(&min_code_size) {
        return Err(FormatError::InvalidCodeSize(min_code_size));
    }
    let compressed = reader.sub_blocks("image data")?;

    let control = control.unwrap_or(GraphicControl {
        disposal: DisposalMethod::None,
        transparent_index: None,
        delay_centiseconds: 0,
    });

    // Intersect with the logical screen; declared sizes may far exceed it
    let visible_width = width.min(screen.width.saturating_sub(left));
    let visible_height = height.min(screen.height.saturating_sub(top));
    if visible_width < width || visible_height < height {
        debug!(
            "Frame {}x{} at ({}, {}) clipped to {}x{}",
            width, height, left, top, visible_width, visible_height
        );
    }

    Ok(FrameRecord {
        left,
        top,
        width,
        height,
        visible_width,
        visible_height,
        interlaced: packed & 0x40 != 0,
        local_color_table,
        transparent_index: control.transparent_index,
        delay_centiseconds: control.delay_centiseconds,
        disposal: control.disposal,
        min_code_size,
        compressed,
    })
}
