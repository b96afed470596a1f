/// Error types for parsing, frame decoding and source loading.
use thiserror::Error;

/// Container-level failures. Any of these aborts instance construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid GIF header")]
    InvalidHeader,

    #[error("stream truncated while reading {0}")]
    Truncated(&'static str),

    #[error("no image blocks found")]
    NoFrames,

    #[error("logical screen has zero size ({width}x{height})")]
    EmptyScreen { width: u16, height: u16 },

    #[error("invalid LZW minimum code size: {0}")]
    InvalidCodeSize(u8),

    #[error("unknown block introducer 0x{0:02X}")]
    UnknownBlock(u8),
}

/// Per-frame failures. Playback degrades instead of aborting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("corrupt LZW stream: {0}")]
    CorruptStream(String),

    #[error("decoded {actual} indices, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("frame has no local color table and image has no global one")]
    NoColorTable,
}

/// The single error type surfaced to the embedding collaborator.
#[derive(Error, Debug)]
pub enum GifError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("player has shut down")]
    PlayerClosed,
}

pub type Result<T> = std::result::Result<T, GifError>;
