//! Replacement textures supplied by a texture pack.
//!
//! Decoding happens on the provider's worker threads. The only state shared
//! with the cache is the per-material [`DecodeState`] and the payload the
//! worker moves in once it is done.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::params::SurfaceParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CustomPixelFormat {
    Rgba8,
    Bc1,
    Bc3,
    Bc5,
    Bc7,
    Astc4,
    Astc6,
    Astc8,
}

impl CustomPixelFormat {
    pub const fn is_compressed(self) -> bool {
        !matches!(self, Self::Rgba8)
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeState {
    Unloaded = 0,
    Pending = 1,
    Decoded = 2,
    Failed = 3,
}

impl DecodeState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Unloaded,
            1 => Self::Pending,
            2 => Self::Decoded,
            _ => Self::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialData {
    pub width: u32,
    pub height: u32,
    pub format: CustomPixelFormat,
    /// Level 0 colour map, rows bottom-up.
    pub color: Vec<u8>,
    pub normal: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct Material {
    hash: u64,
    state: AtomicU8,
    data: Mutex<Option<MaterialData>>,
}

impl Material {
    pub fn new(hash: u64) -> Self {
        Self {
            hash,
            state: AtomicU8::new(DecodeState::Unloaded as u8),
            data: Mutex::new(None),
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn state(&self) -> DecodeState {
        DecodeState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Moves `Unloaded` to `Pending`. Returns `false` if another request
    /// already started the decode.
    pub fn begin_decode(&self) -> bool {
        self.state
            .compare_exchange(
                DecodeState::Unloaded as u8,
                DecodeState::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Publishes the decoded payload. Called by the decoding thread.
    pub fn complete(&self, data: MaterialData) {
        *self.data.lock().unwrap_or_else(|e| e.into_inner()) = Some(data);
        self.state.store(DecodeState::Decoded as u8, Ordering::Release);
    }

    pub fn fail(&self) {
        self.state.store(DecodeState::Failed as u8, Ordering::Release);
    }

    /// Runs `f` on the payload if decoding finished.
    pub fn with_data<R>(&self, f: impl FnOnce(&MaterialData) -> R) -> Option<R> {
        if self.state() != DecodeState::Decoded {
            return None;
        }
        self.data.lock().unwrap_or_else(|e| e.into_inner()).as_ref().map(f)
    }

    pub fn extent(&self) -> Option<(u32, u32, CustomPixelFormat)> {
        self.with_data(|data| (data.width, data.height, data.format))
    }
}

/// Source of replacement textures, keyed by the xxh3 hash of the guest
/// bytes of a texture.
pub trait CustomTextureProvider {
    fn material(&self, hash: u64) -> Option<Arc<Material>>;

    /// Schedules decoding of `material`. Implementations call
    /// [`Material::begin_decode`] and later [`Material::complete`] or
    /// [`Material::fail`], usually from a worker thread.
    fn request_decode(&self, material: &Arc<Material>);

    /// Whether mip levels above 0 are generated from the replacement rather
    /// than decoded from guest memory.
    fn skip_mipmaps(&self) -> bool {
        true
    }

    /// Receives decoded guest textures when dumping is enabled.
    fn dump(&self, _params: &SurfaceParams, _level: u32, _data: &[u8], _hash: u64) {}
}
