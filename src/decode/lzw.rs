/// Variable-width LZW decompression for GIF image data.
///
/// The string table is stored as prefix/suffix links so emitting a code never clones.
/// [`decode_with`] streams indices to a sink so callers can keep only what they need.
/// Output is always exactly `expected_len` indices: short streams are padded with
/// index 0 and long ones truncated, and the problem is reported alongside.
use crate::error::DecodeError;

/// Codes never exceed 12 bits.
pub const MAX_CODE_WIDTH: u8 = 12;
const TABLE_CAPACITY: usize = 1 << MAX_CODE_WIDTH;
const NO_PREFIX: u16 = u16::MAX;

/// Decompressed indices and the first problem found, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LzwOutput {
    pub indices: Vec<u8>,
    pub error: Option<DecodeError>,
}

/// LSB-first code reader over the concatenated sub-block payload.
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    fn read(&mut self, width: u8) -> Option<u16> {
        let width = width as usize;
        if self.bit_pos + width > self.data.len() * 8 {
            return None;
        }

        let byte = self.bit_pos / 8;
        let shift = self.bit_pos % 8;
        // A 12-bit code at any bit offset spans at most three bytes
        let mut raw = self.data[byte] as u32;
        if let Some(&b) = self.data.get(byte + 1) {
            raw |= (b as u32) << 8;
        }
        if let Some(&b) = self.data.get(byte + 2) {
            raw |= (b as u32) << 16;
        }

        self.bit_pos += width;
        Some(((raw >> shift) & ((1 << width) - 1)) as u16)
    }
}

struct StringTable {
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    next_code: u16,
    first_free: u16,
    stack: Vec<u8>,
}

impl StringTable {
    fn new(clear_code: u16) -> Self {
        let mut prefix = vec![NO_PREFIX; TABLE_CAPACITY];
        let mut suffix = vec![0u8; TABLE_CAPACITY];
        for code in 0..clear_code as usize {
            prefix[code] = NO_PREFIX;
            suffix[code] = code as u8;
        }
        Self {
            prefix,
            suffix,
            next_code: clear_code + 2,
            first_free: clear_code + 2,
            stack: Vec::with_capacity(TABLE_CAPACITY),
        }
    }

    fn reset(&mut self) {
        self.next_code = self.first_free;
    }

    fn is_full(&self) -> bool {
        self.next_code as usize >= TABLE_CAPACITY
    }

    /// Expand the string for `code` into the reversal stack, returning its first byte.
    fn expand(&mut self, code: u16) -> u8 {
        self.stack.clear();
        let mut current = code;
        loop {
            self.stack.push(self.suffix[current as usize]);
            let prefix = self.prefix[current as usize];
            if prefix == NO_PREFIX {
                break;
            }
            current = prefix;
        }
        self.stack[self.stack.len() - 1]
    }

    /// The last expanded string, first byte first.
    fn string(&self) -> impl Iterator<Item = u8> + '_ {
        self.stack.iter().rev().copied()
    }

    fn add(&mut self, prefix: u16, suffix: u8) {
        if self.is_full() {
            return;
        }
        let code = self.next_code as usize;
        self.prefix[code] = prefix;
        self.suffix[code] = suffix;
        self.next_code += 1;
    }
}

/// Decompress `data` into exactly `expected_len` color indices.
///
/// `min_code_size` must already be validated by the parser (1..=11).
pub fn decode(data: &[u8], min_code_size: u8, expected_len: usize) -> LzwOutput {
    let mut indices = vec![0u8; expected_len];
    let error = decode_with(data, min_code_size, expected_len, |pos, index| indices[pos] = index);
    LzwOutput { indices, error }
}

/// Streaming form of [`decode`]: `sink` receives `(position, index)` for every
/// position below `expected_len`, in order. Positions never reached are left to
/// the caller (index 0 by convention).
pub fn decode_with(
    data: &[u8],
    min_code_size: u8,
    expected_len: usize,
    mut sink: impl FnMut(usize, u8),
) -> Option<DecodeError> {
    let clear_code = 1u16 << min_code_size;
    let end_code = clear_code + 1;

    let mut reader = BitReader::new(data);
    let mut table = StringTable::new(clear_code);
    let mut width = min_code_size + 1;
    let mut prev: Option<u16> = None;
    let mut produced = 0usize;
    let mut emit = |produced: &mut usize, index: u8| {
        if *produced < expected_len {
            sink(*produced, index);
        }
        *produced += 1;
    };

    let error = loop {
        // Anything after the last pixel (end code, padding, garbage) is ignored
        if produced >= expected_len {
            break None;
        }

        let Some(code) = reader.read(width) else {
            break Some(DecodeError::CorruptStream(format!(
                "data ended after {} of {} indices",
                produced, expected_len
            )));
        };

        if code == clear_code {
            table.reset();
            width = min_code_size + 1;
            prev = None;
            continue;
        }

        if code == end_code {
            break None;
        }

        let Some(prev_code) = prev else {
            if code >= clear_code {
                break Some(DecodeError::CorruptStream(format!(
                    "code {code} is not a literal after a clear code"
                )));
            }
            emit(&mut produced, code as u8);
            prev = Some(code);
            continue;
        };

        let first = if code < table.next_code {
            let first = table.expand(code);
            for index in table.string() {
                emit(&mut produced, index);
            }
            first
        } else if code == table.next_code && !table.is_full() {
            // KwKwK: previous string plus its own first byte
            let first = table.expand(prev_code);
            for index in table.string() {
                emit(&mut produced, index);
            }
            emit(&mut produced, first);
            first
        } else {
            break Some(DecodeError::CorruptStream(format!(
                "code {code} not yet defined (next free code {})",
                table.next_code
            )));
        };

        table.add(prev_code, first);
        if table.next_code == 1 << width && width < MAX_CODE_WIDTH {
            width += 1;
        }
        prev = Some(code);
    };

    error.or_else(|| {
        (produced != expected_len).then(|| DecodeError::SizeMismatch {
            expected: expected_len,
            actual: produced,
        })
    })
}
