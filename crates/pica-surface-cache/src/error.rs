use pica_texture_codec::{CodecError, PixelFormat};

use crate::backend::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(
        "failed to allocate {width}x{height} {format} surface at {addr:#010x} (scale {res_scale})"
    )]
    Allocation {
        addr: u32,
        width: u32,
        height: u32,
        format: PixelFormat,
        res_scale: u16,
        #[source]
        source: BackendError,
    },

    #[error("tiled surface at {addr:#010x} has size {width}x{height}, expected multiples of 8")]
    UnalignedTiledSurface { addr: u32, width: u32, height: u32 },
}
