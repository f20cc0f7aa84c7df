mod common;

use common::{cache, decode_from_memory, init_tracing, pattern, peek, poke, rgba8, texels, tiled, TestCache, RAM_SIZE};
use pica_surface_cache::software::SoftwareBackend;
use pica_surface_cache::{
    FillValue, MemoryFillConfig, RasterizerCache, RasterizerCacheOptions, ScaleMatch, SurfaceId, SurfaceInterval,
    SurfaceParams, VecGuestMemory,
};
use pica_texture_codec::PixelFormat;
use pretty_assertions::assert_eq;

/// Loads `params` from `data`, then pretends the GPU rendered all of it and
/// wipes guest memory so only the surface holds the bytes.
fn render(cache: &mut TestCache, params: &SurfaceParams, data: &[u8]) -> SurfaceId {
    poke(cache, params.addr, data);
    let id = cache.get_surface(params, ScaleMatch::Exact, true).unwrap();
    cache.invalidate_region(params.addr, params.size, id).unwrap();
    poke(cache, params.addr, &vec![0u8; data.len()]);
    id
}

#[test]
fn flush_writes_rendered_bytes_back() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let data = pattern(params.size as usize, 1);
    let id = render(&mut cache, &params, &data);
    assert_eq!(cache.dirty_owner(0x1000), Some(id));

    cache.flush_all().unwrap();
    assert_eq!(peek(&cache, 0x1000, data.len()), data);
    assert_eq!(cache.dirty_owner(0x1000), None);
    assert_eq!(cache.stats().downloads, 1);

    cache.flush_all().unwrap();
    assert_eq!(cache.stats().downloads, 1);
}

#[test]
fn flush_round_trips_through_converted_textures() {
    init_tracing();
    let mut cache: TestCache = RasterizerCache::new(
        SoftwareBackend::with_conversion(),
        VecGuestMemory::new(0, RAM_SIZE),
        RasterizerCacheOptions::default(),
    );
    let params = tiled(0x2000, 16, 16, PixelFormat::Rgba8);
    let data = pattern(params.size as usize, 2);
    render(&mut cache, &params, &data);

    cache.flush_all().unwrap();
    assert_eq!(peek(&cache, 0x2000, data.len()), data);
}

#[test]
fn cpu_read_flushes_only_what_it_touches() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let data = pattern(params.size as usize, 3);
    let id = render(&mut cache, &params, &data);

    let mut out = [0u8; 0x40];
    cache.read_guest_memory(0x1100, &mut out).unwrap();
    assert_eq!(out.to_vec(), data[0x100..0x140].to_vec());
    assert_eq!(peek(&cache, 0x1140, 4), vec![0; 4]);
    assert_eq!(cache.dirty_owner(0x1000), Some(id));
    assert_eq!(cache.dirty_owner(0x1100), None);
}

#[test]
fn cpu_write_to_uncached_memory_is_skipped() {
    let mut cache = cache();
    cache.get_surface(&rgba8(0x1000, 32, 32), ScaleMatch::Exact, true).unwrap();

    cache.write_guest_memory(0x8000, &[1; 16]).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.skipped_invalidations, 1);
    assert_eq!(stats.invalid_marks, 0);
    assert_eq!(peek(&cache, 0x8000, 16), vec![1; 16]);
}

#[test]
fn cpu_write_invalidates_and_the_next_lookup_reloads() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    poke(&mut cache, 0x1000, &pattern(params.size as usize, 4));
    let id = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();

    cache.write_guest_memory(0x1100, &pattern(0x100, 5)).unwrap();
    let surface = cache.surface(id).unwrap();
    assert!(surface.is_registered());
    assert!(!surface.is_region_valid(SurfaceInterval::new(0x1100, 0x1200)));
    assert!(surface.is_region_valid(SurfaceInterval::new(0x1000, 0x1100)));
    assert_eq!(cache.stats().invalid_marks, 1);

    assert_eq!(cache.get_surface(&params, ScaleMatch::Exact, true).unwrap(), id);
    assert_eq!(texels(&cache, id), decode_from_memory(&cache, &params));
    assert_eq!(cache.stats().uploads, 2);
}

#[test]
fn small_cpu_write_flushes_and_drops_the_surface() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let data = pattern(params.size as usize, 6);
    let id = render(&mut cache, &params, &data);

    cache.write_guest_memory(0x1000, &[0xAA; 4]).unwrap();
    assert!(!cache.surface(id).unwrap().is_registered());
    assert_eq!(cache.registered_surfaces(), 0);
    assert_eq!(peek(&cache, 0x1000, 4), vec![0xAA; 4]);
    assert_eq!(peek(&cache, 0x1004, data.len() - 4), data[4..].to_vec());
    assert_eq!(cache.dirty_owner(0x1010), None);
}

#[test]
fn fill_replaces_overlapping_surfaces() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let id = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();

    let fill = MemoryFillConfig {
        start: 0x1000,
        end: 0x2000,
        value: FillValue::Bits32(0x1122_3344),
    };
    assert!(cache.accelerate_fill(&fill).unwrap());
    assert!(!cache.surface(id).unwrap().is_registered());
    assert_eq!(cache.registered_surfaces(), 1);

    let mut out = [0u8; 16];
    cache.read_guest_memory(0x1000, &mut out).unwrap();
    assert_eq!(out.to_vec(), [0x44, 0x33, 0x22, 0x11].repeat(4));
}

#[test]
fn surface_validates_from_a_fill_without_uploading() {
    let mut cache = cache();
    let fill = MemoryFillConfig {
        start: 0x1000,
        end: 0x2000,
        value: FillValue::Bits32(0x1122_3344),
    };
    cache.accelerate_fill(&fill).unwrap();

    let params = rgba8(0x1000, 32, 32);
    let id = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();
    assert_eq!(texels(&cache, id), [0x44, 0x33, 0x22, 0x11].repeat(32 * 32));
    let stats = cache.stats();
    assert_eq!(stats.fills, 1);
    assert_eq!(stats.uploads, 0);
    // Guest memory still hasn't seen the fill.
    assert_eq!(peek(&cache, 0x1000, 4), vec![0; 4]);
}

#[test]
fn small_read_of_a_fill_writes_back_the_whole_fill() {
    let mut cache = cache();
    let fill = MemoryFillConfig {
        start: 0x1000,
        end: 0x1030,
        value: FillValue::Bits24([1, 2, 3]),
    };
    cache.accelerate_fill(&fill).unwrap();

    let mut out = [0u8; 5];
    cache.read_guest_memory(0x1001, &mut out).unwrap();
    assert_eq!(out, [2, 3, 1, 2, 3]);
    assert_eq!(peek(&cache, 0x1000, 0x30), [1, 2, 3].repeat(16));
    assert_eq!(cache.dirty_owner(0x1020), None);
}

#[test]
fn empty_fill_is_rejected() {
    let mut cache = cache();
    let fill = MemoryFillConfig {
        start: 0x2000,
        end: 0x2000,
        value: FillValue::Bits16(0xFFFF),
    };
    assert!(!cache.accelerate_fill(&fill).unwrap());
    assert_eq!(cache.registered_surfaces(), 0);
}

#[test]
fn depth_surface_is_reinterpreted_from_colour() {
    let mut cache = cache();
    let colour = rgba8(0x1000, 32, 32);
    poke(&mut cache, 0x1000, &pattern(colour.size as usize, 8));
    cache.get_surface(&colour, ScaleMatch::Exact, true).unwrap();

    let depth = tiled(0x1000, 32, 32, PixelFormat::D24s8);
    let id = cache.get_surface(&depth, ScaleMatch::Exact, true).unwrap();
    assert_eq!(texels(&cache, id), decode_from_memory(&cache, &depth));
    let stats = cache.stats();
    assert_eq!(stats.reinterpretations, 1);
    assert_eq!(stats.uploads, 1);
}

#[test]
fn clear_all_can_discard_dirty_data() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    render(&mut cache, &params, &pattern(params.size as usize, 9));

    cache.clear_all(false).unwrap();
    assert_eq!(cache.registered_surfaces(), 0);
    assert_eq!(cache.backend().texture_count(), 0);
    assert!(!cache.memory().is_cached(0x1000));
    assert_eq!(peek(&cache, 0x1000, 16), vec![0; 16]);
}

#[test]
fn clear_all_can_flush_first() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let data = pattern(params.size as usize, 10);
    render(&mut cache, &params, &data);

    cache.clear_all(true).unwrap();
    assert_eq!(peek(&cache, 0x1000, data.len()), data);
    assert_eq!(cache.dirty_regions(), vec![]);
}
