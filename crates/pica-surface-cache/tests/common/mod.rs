//! Shared helpers for `pica-surface-cache` integration tests.
#![allow(dead_code)]

use pica_surface_cache::software::{SoftwareBackend, SoftwareTexture};
use pica_surface_cache::{
    GuestMemory, RasterizerCache, RasterizerCacheOptions, SurfaceId, SurfaceParams, VecGuestMemory,
};
use pica_texture_codec::{decode_texture, PixelFormat};

pub type TestCache = RasterizerCache<SoftwareBackend, VecGuestMemory>;

/// 1 MiB of guest RAM at physical address 0.
pub const RAM_SIZE: usize = 0x10_0000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn cache() -> TestCache {
    cache_with(RasterizerCacheOptions::default())
}

pub fn cache_with(options: RasterizerCacheOptions) -> TestCache {
    init_tracing();
    RasterizerCache::new(SoftwareBackend::new(), VecGuestMemory::new(0, RAM_SIZE), options)
}

pub fn tiled(addr: u32, width: u32, height: u32, format: PixelFormat) -> SurfaceParams {
    SurfaceParams::new(addr, width, height, format, true)
}

pub fn rgba8(addr: u32, width: u32, height: u32) -> SurfaceParams {
    tiled(addr, width, height, PixelFormat::Rgba8)
}

/// Deterministic non-repeating bytes.
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// Writes `data` to guest memory behind the cache's back.
pub fn poke(cache: &mut TestCache, addr: u32, data: &[u8]) {
    cache.memory_mut().write(addr, data).unwrap();
}

pub fn peek(cache: &TestCache, addr: u32, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    cache.memory().read(addr, &mut out).unwrap();
    out
}

pub fn texture_of(cache: &TestCache, id: SurfaceId) -> SoftwareTexture {
    cache.surface(id).and_then(|s| s.texture()).expect("surface has a texture")
}

/// Level 0, layer 0 pixels of a surface's texture, rows bottom-up.
pub fn texels(cache: &TestCache, id: SurfaceId) -> Vec<u8> {
    let texture = texture_of(cache, id);
    cache.backend().level_data(texture, 0, 0).expect("texture exists").to_vec()
}

/// What the cache should hold for `params` given current guest memory.
pub fn decode_from_memory(cache: &TestCache, params: &SurfaceParams) -> Vec<u8> {
    let layout = params.layout();
    let guest = peek(cache, params.addr, params.size as usize);
    let mut host = vec![0u8; layout.linear_size(false)];
    decode_texture(&layout, 0, params.size, &guest, &mut host, false).unwrap();
    host
}
