use crate::PixelFormat;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("no {direction} codec for {format:?} (tiled={tiled})")]
    Unimplemented {
        direction: &'static str,
        format: PixelFormat,
        tiled: bool,
    },

    #[error("tiled decode of {format:?} requires tile-aligned offsets, got {start:#x}..{end:#x}")]
    Misaligned {
        format: PixelFormat,
        start: u32,
        end: u32,
    },

    #[error("invalid layout {width}x{height} for {format:?}")]
    InvalidLayout {
        format: PixelFormat,
        width: u32,
        height: u32,
    },

    #[error("buffer too small: need {needed} bytes, have {actual}")]
    BufferTooSmall { needed: usize, actual: usize },
}
