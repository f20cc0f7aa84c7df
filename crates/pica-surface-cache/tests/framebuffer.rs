mod common;

use common::{cache, cache_with};
use pica_surface_cache::{FramebufferConfig, Rect, RasterizerCacheOptions, SurfaceId, ViewportRect};
use pica_texture_codec::PixelFormat;
use pretty_assertions::assert_eq;

const COLOR: u32 = 0x1_0000;
const DEPTH: u32 = 0x2_0000;

fn config(color_addr: u32, depth_addr: u32) -> FramebufferConfig {
    FramebufferConfig {
        color_addr,
        depth_addr,
        color_format: PixelFormat::Rgba8,
        depth_format: PixelFormat::D24s8,
        width: 32,
        height: 32,
        viewport: ViewportRect {
            left: 0,
            top: 32,
            right: 32,
            bottom: 0,
        },
        scissor: None,
    }
}

#[test]
fn framebuffer_is_created_once_per_attachment_pair() {
    let mut cache = cache();
    let first = cache.get_framebuffer_surfaces(&config(COLOR, DEPTH), true, true).unwrap();
    let second = cache.get_framebuffer_surfaces(&config(COLOR, DEPTH), true, true).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.surfaces_rect, Rect::new(0, 32, 32, 0));
    assert_eq!(first.draw_rect, first.surfaces_rect);
    assert_eq!(cache.backend().framebuffer_count(), 1);

    let handle = cache.framebuffer(first.framebuffer).unwrap();
    let desc = cache.backend().framebuffer(handle).unwrap();
    assert!(desc.color.is_some());
    assert!(desc.depth_has_stencil);
    assert_eq!((desc.width, desc.height), (32, 32));
}

#[test]
fn draw_marks_attachments_dirty() {
    let mut cache = cache();
    let helper = cache.get_framebuffer_surfaces(&config(COLOR, DEPTH), true, true).unwrap();
    cache.invalidate_framebuffer(&helper).unwrap();

    assert_eq!(cache.dirty_owner(COLOR), Some(helper.params.color));
    assert_eq!(cache.dirty_owner(DEPTH + 0xFFF), Some(helper.params.depth));
}

#[test]
fn scissor_limits_what_a_draw_dirties() {
    let mut cache = cache();
    let mut config = config(COLOR, 0);
    config.scissor = Some(Rect::new(4, 11, 11, 4));
    let helper = cache.get_framebuffer_surfaces(&config, true, false).unwrap();
    assert_eq!(helper.draw_rect, Rect::new(4, 12, 12, 4));
    assert_eq!(helper.params.depth, SurfaceId::NULL);

    cache.invalidate_framebuffer(&helper).unwrap();
    // Bottom two tile rows, left two tiles of the last one.
    assert_eq!(cache.dirty_owner(COLOR), None);
    assert_eq!(cache.dirty_owner(COLOR + 2048), Some(helper.params.color));
    assert_eq!(cache.dirty_owner(COLOR + 3584 - 1), Some(helper.params.color));
    assert_eq!(cache.dirty_owner(COLOR + 3584), None);
}

#[test]
fn overlapping_depth_is_dropped() {
    let mut cache = cache();
    let helper = cache.get_framebuffer_surfaces(&config(COLOR, COLOR + 0x800), true, true).unwrap();
    assert!(!helper.params.color.is_null());
    assert_eq!(helper.params.depth, SurfaceId::NULL);
}

#[test]
fn attachments_follow_the_resolution_scale() {
    let mut cache = cache_with(RasterizerCacheOptions {
        resolution_scale_factor: 2,
        ..RasterizerCacheOptions::default()
    });
    let helper = cache.get_framebuffer_surfaces(&config(COLOR, DEPTH), true, true).unwrap();
    assert_eq!(helper.res_scale, 2);
    assert_eq!(helper.surfaces_rect, Rect::new(0, 64, 64, 0));

    let color = cache.surface(helper.params.color).unwrap();
    assert_eq!(color.params.res_scale, 2);
    let handle = cache.framebuffer(helper.framebuffer).unwrap();
    assert_eq!(cache.backend().framebuffer(handle).unwrap().width, 64);
}

#[test]
fn bound_attachments_outlive_the_retention_window() {
    let mut cache = cache();
    let helper = cache.get_framebuffer_surfaces(&config(COLOR, DEPTH), true, true).unwrap();
    let color = helper.params.color;

    // The CPU overwrites the whole colour buffer, so it leaves the cache.
    cache.write_guest_memory(COLOR, &[0x55; 0x1000]).unwrap();
    assert!(!cache.surface(color).unwrap().is_registered());
    for _ in 0..3 {
        cache.tick_frame().unwrap();
    }
    assert!(cache.surface(color).is_some());

    cache.get_framebuffer_surfaces(&config(0x3_0000, 0x4_0000), true, true).unwrap();
    for _ in 0..3 {
        cache.tick_frame().unwrap();
    }
    assert!(cache.surface(color).is_none());
    assert!(cache.framebuffer(helper.framebuffer).is_none());
    assert_eq!(cache.backend().framebuffer_count(), 1);
}
