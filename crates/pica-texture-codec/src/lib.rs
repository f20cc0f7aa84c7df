//! Pixel codec for PICA200 guest surfaces.
//!
//! Converts between the guest encoding of a surface (Morton-tiled or linear,
//! in any of the hardware pixel formats) and the row-major host layout
//! uploaded to textures. With `convert` set, colour and depth formats use a
//! normalized 4-byte-per-pixel layout instead of their native host layout.
#![forbid(unsafe_code)]

mod codec;
pub mod color;
pub mod error;
pub mod etc1;
mod format;
pub mod morton;

pub use codec::{can_decode, can_encode, decode_texel, decode_texture, encode_texture, TextureLayout};
pub use error::CodecError;
pub use format::{formats_blittable, PixelFormat, SurfaceType, ALL_FORMATS};
pub use morton::morton_interleave;
