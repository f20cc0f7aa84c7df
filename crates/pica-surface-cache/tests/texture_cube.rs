mod common;

use common::{cache, decode_from_memory, pattern, poke, rgba8, texture_of, TestCache};
use pica_surface_cache::{SurfaceParams, TextureCubeConfig, TextureType};
use pica_texture_codec::PixelFormat;
use pretty_assertions::assert_eq;

fn face(index: u32) -> SurfaceParams {
    rgba8(0x1000 + index * 0x100, 8, 8)
}

fn cube_config() -> TextureCubeConfig {
    TextureCubeConfig {
        px: face(0).addr,
        nx: face(1).addr,
        py: face(2).addr,
        ny: face(3).addr,
        pz: face(4).addr,
        nz: face(5).addr,
        width: 8,
        levels: 1,
        format: PixelFormat::Rgba8,
    }
}

fn layer(cache: &TestCache, id: pica_surface_cache::SurfaceId, layer: u32) -> Vec<u8> {
    let texture = texture_of(cache, id);
    cache.backend().level_data(texture, layer, 0).unwrap().to_vec()
}

#[test]
fn faces_are_copied_into_layers() {
    let mut cache = cache();
    for i in 0..6 {
        poke(&mut cache, face(i).addr, &pattern(0x100, i + 1));
    }

    let id = cache.get_texture_cube(&cube_config()).unwrap();
    let cube = cache.surface(id).unwrap();
    assert_eq!(cube.params.texture_type, TextureType::CubeMap);
    assert!(!cube.is_registered());
    for i in 0..6 {
        assert_eq!(layer(&cache, id, i), decode_from_memory(&cache, &face(i)), "face {i}");
    }
    assert_eq!(cache.registered_surfaces(), 6);
    assert_eq!(cache.get_texture_cube(&cube_config()).unwrap(), id);
}

#[test]
fn rewritten_face_is_copied_again() {
    let mut cache = cache();
    for i in 0..6 {
        poke(&mut cache, face(i).addr, &pattern(0x100, i + 1));
    }
    let id = cache.get_texture_cube(&cube_config()).unwrap();

    cache.write_guest_memory(face(2).addr, &pattern(0x100, 99)).unwrap();
    assert_eq!(cache.get_texture_cube(&cube_config()).unwrap(), id);
    assert_eq!(layer(&cache, id, 2), decode_from_memory(&cache, &face(2)));
    assert_eq!(layer(&cache, id, 3), decode_from_memory(&cache, &face(3)));
}

#[test]
fn cube_is_rebuilt_after_a_scale_change() {
    let mut cache = cache();
    let id = cache.get_texture_cube(&cube_config()).unwrap();

    let mut options = *cache.options();
    options.resolution_scale_factor = 2;
    options.scale_textures = true;
    cache.set_options(options);
    cache.tick_frame().unwrap();
    assert_eq!(cache.registered_surfaces(), 0);

    let rebuilt = cache.get_texture_cube(&cube_config()).unwrap();
    assert_ne!(rebuilt, id);
    assert_eq!(cache.surface(rebuilt).unwrap().params.res_scale, 2);
}

#[test]
fn dropping_a_face_retires_the_cube() {
    let mut cache = cache();
    let id = cache.get_texture_cube(&cube_config()).unwrap();
    assert_eq!(cache.texture_cube_count(), 1);

    cache.write_guest_memory(face(4).addr, &pattern(0x100, 7)).unwrap();
    assert_eq!(cache.texture_cube_count(), 0);
    assert_eq!(cache.registered_surfaces(), 5);

    for _ in 0..3 {
        cache.tick_frame().unwrap();
    }
    assert!(cache.surface(id).is_none());
}
