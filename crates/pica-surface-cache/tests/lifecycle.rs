mod common;

use common::{cache, pattern, peek, poke, rgba8};
use pica_surface_cache::{CacheError, ScaleMatch};
use pretty_assertions::assert_eq;

#[test]
fn unreachable_surface_is_destroyed_after_the_retention_window() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let id = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();
    cache.write_guest_memory(0x1000, &vec![0; params.size as usize]).unwrap();
    assert_eq!(cache.sentenced_surfaces(), 1);

    cache.tick_frame().unwrap();
    cache.tick_frame().unwrap();
    assert_eq!(cache.backend().texture_count(), 1);

    cache.tick_frame().unwrap();
    assert!(cache.surface(id).is_none());
    assert_eq!(cache.backend().texture_count(), 0);
    assert_eq!(cache.backend().allocated_bytes(), 0);
    let stats = cache.stats();
    assert_eq!(stats.surfaces_destroyed, 1);
    assert_eq!(stats.gc_sweeps, 3);
}

#[test]
fn scale_change_writes_back_and_rebuilds() {
    let mut cache = cache();
    let params = rgba8(0x1000, 32, 32);
    let data = pattern(params.size as usize, 12);
    poke(&mut cache, 0x1000, &data);
    let id = cache.get_surface(&params, ScaleMatch::Exact, true).unwrap();
    cache.invalidate_region(0x1000, params.size, id).unwrap();
    poke(&mut cache, 0x1000, &vec![0; data.len()]);

    let mut options = *cache.options();
    options.resolution_scale_factor = 3;
    cache.set_options(options);
    assert_eq!(cache.options().resolution_scale_factor, 1);

    cache.tick_frame().unwrap();
    assert_eq!(cache.options().resolution_scale_factor, 3);
    assert_eq!(cache.registered_surfaces(), 0);
    assert_eq!(peek(&cache, 0x1000, data.len()), data);
}

#[test]
fn unrelated_option_change_keeps_surfaces() {
    let mut cache = cache();
    cache.get_surface(&rgba8(0x1000, 32, 32), ScaleMatch::Exact, true).unwrap();

    let mut options = *cache.options();
    options.gc_retention_frames = 10;
    cache.set_options(options);
    cache.tick_frame().unwrap();
    assert_eq!(cache.registered_surfaces(), 1);
}

#[test]
fn allocation_failure_is_reported() {
    let mut cache = cache();
    cache.backend_mut().set_memory_limit(Some(100));

    let err = cache.get_surface(&rgba8(0x1000, 32, 32), ScaleMatch::Exact, true).unwrap_err();
    assert!(matches!(err, CacheError::Allocation { addr: 0x1000, width: 32, height: 32, .. }));
    assert_eq!(cache.registered_surfaces(), 0);
    assert!(!cache.memory().is_cached(0x1000));
}
