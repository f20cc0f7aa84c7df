mod common;

use common::{cache, decode_from_memory, pattern, poke, rgba8, texels, tiled};
use pica_surface_cache::backend::TextureFilter;
use pica_surface_cache::{CacheError, Rect, SamplerParams, ScaleMatch, SurfaceId, TextureInfo};
use pica_texture_codec::PixelFormat;
use pretty_assertions::assert_eq;

#[test]
fn repeated_lookup_returns_the_same_surface() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let first = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();
    let second = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();

    assert_eq!(first, second);
    assert_eq!(cache.registered_surfaces(), 1);
    assert_eq!(cache.stats().uploads, 1);
}

#[test]
fn loaded_surface_holds_decoded_guest_memory() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let data = pattern(params.size as usize, 7);
    poke(&mut cache, params.addr, &data);

    let id = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();
    assert_eq!(texels(&cache, id), decode_from_memory(&cache, &params));
    assert!(cache.surface(id).unwrap().is_region_valid(params.interval()));
}

#[test]
fn sub_rect_lookup_reuses_the_enclosing_surface() {
    let mut cache = cache();
    let outer = cache.get_surface(&rgba8(0x1000, 32, 32), ScaleMatch::Exact, false).unwrap();

    let (id, rect) = cache
        .get_surface_sub_rect(&rgba8(0x1000, 32, 8), ScaleMatch::Exact, false)
        .unwrap();
    assert_eq!(id, outer);
    assert_eq!(rect, Rect::new(0, 32, 32, 24));
    assert_eq!(cache.registered_surfaces(), 1);
}

#[test]
fn scale_mismatch_creates_a_rescaled_copy() {
    let mut cache = cache();
    let outer = cache.get_surface(&rgba8(0x1000, 32, 32), ScaleMatch::Exact, false).unwrap();

    let request = rgba8(0x1000, 32, 8).with_res_scale(2);
    let (id, rect) = cache.get_surface_sub_rect(&request, ScaleMatch::Exact, false).unwrap();
    assert_ne!(id, outer);
    assert_eq!(cache.surface(id).unwrap().params.res_scale, 2);
    assert_eq!(rect, Rect::new(0, 64, 64, 48));
    assert_eq!(cache.registered_surfaces(), 2);
}

#[test]
fn adjacent_request_expands_the_surface() {
    let mut cache = cache();
    let whole = rgba8(0x1000, 32, 16);
    poke(&mut cache, whole.addr, &pattern(whole.size as usize, 3));
    let lower = cache.get_surface(&rgba8(0x1000, 32, 8), ScaleMatch::Exact, true).unwrap();

    let (id, rect) = cache
        .get_surface_sub_rect(&rgba8(0x1400, 32, 8), ScaleMatch::Exact, true)
        .unwrap();
    assert_ne!(id, lower);
    assert_eq!(rect, Rect::new(0, 8, 32, 0));

    let expanded = cache.surface(id).unwrap();
    assert_eq!(expanded.params.addr, 0x1000);
    assert_eq!(expanded.params.height, 16);
    assert!(!cache.surface(lower).unwrap().is_registered());
    assert_eq!(cache.registered_surfaces(), 1);
    assert_eq!(texels(&cache, id), decode_from_memory(&cache, &whole));
}

#[test]
fn small_texture_is_cut_from_an_aligned_surface() {
    let mut cache = cache();
    poke(&mut cache, 0x1000, &pattern(8 * 8 * 4, 11));

    let info = TextureInfo {
        addr: 0x1000,
        width: 4,
        height: 4,
        format: PixelFormat::Rgba8,
    };
    let id = cache.get_texture_surface(&info, 0).unwrap();
    let small = cache.surface(id).unwrap();
    assert!(!small.is_registered());
    assert_eq!((small.params.width, small.params.height), (4, 4));

    let (outer, _) = cache
        .get_surface_sub_rect(&rgba8(0x1000, 8, 8), ScaleMatch::Ignore, false)
        .unwrap();
    let outer_texels = texels(&cache, outer);
    // The first tile's top-left quarter lands on rows 4..8 of the 8x8 surface.
    let expected: Vec<u8> = (4..8).flat_map(|y| outer_texels[y * 32..y * 32 + 16].to_vec()).collect();
    assert_eq!(texels(&cache, id), expected);
    assert_eq!(cache.sentenced_surfaces(), 1);
}

#[test]
fn texture_not_a_multiple_of_four_is_rejected() {
    let mut cache = cache();
    let info = TextureInfo {
        addr: 0x1000,
        width: 6,
        height: 6,
        format: PixelFormat::Rgba8,
    };
    assert_eq!(cache.get_texture_surface(&info, 0).unwrap(), SurfaceId::NULL);
    assert_eq!(cache.registered_surfaces(), 0);
}

#[test]
fn null_texture_address_is_ignored() {
    let mut cache = cache();
    let info = TextureInfo {
        addr: 0,
        width: 32,
        height: 32,
        format: PixelFormat::Rgb565,
    };
    assert_eq!(cache.get_texture_surface(&info, 0).unwrap(), SurfaceId::NULL);
}

#[test]
fn mipmapped_texture_uploads_every_level() {
    let mut cache = cache();
    let params = tiled(0x2000, 32, 32, PixelFormat::Rgba8).with_levels(3);
    poke(&mut cache, params.addr, &pattern(params.size as usize, 5));

    let info = TextureInfo {
        addr: 0x2000,
        width: 32,
        height: 32,
        format: PixelFormat::Rgba8,
    };
    let id = cache.get_texture_surface(&info, 2).unwrap();
    let surface = cache.surface(id).unwrap();
    assert_eq!(surface.params.levels, 3);
    assert!(surface.is_region_valid(params.interval()));
    assert_eq!(cache.stats().uploads, 3);
}

#[test]
fn unaligned_tiled_lookup_is_an_error() {
    let mut cache = cache();
    let err = cache
        .get_surface(&tiled(0x1000, 20, 8, PixelFormat::Rgb565), ScaleMatch::Exact, false)
        .unwrap_err();
    assert!(matches!(err, CacheError::UnalignedTiledSurface { width: 20, height: 8, .. }));
}

#[test]
fn samplers_are_deduplicated() {
    let mut cache = cache();
    let nearest = SamplerParams::default();
    let linear = SamplerParams {
        mag_filter: TextureFilter::Linear,
        ..SamplerParams::default()
    };

    let a = cache.get_sampler(&nearest);
    let b = cache.get_sampler(&nearest);
    let c = cache.get_sampler(&linear);
    assert_eq!(a, b);
    assert_ne!(a, c);
    let handle = cache.sampler(c).unwrap();
    assert_eq!(cache.backend().sampler(handle), Some(&linear));
}
