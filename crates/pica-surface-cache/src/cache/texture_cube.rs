use pica_texture_codec::PixelFormat;

use super::{RasterizerCache, TextureInfo};
use crate::backend::{GraphicsBackend, TextureCopy};
use crate::error::CacheError;
use crate::memory::GuestMemory;
use crate::params::{SurfaceParams, TextureType};
use crate::slot::SurfaceId;

/// Face addresses and shared geometry of a cube map, in +X, -X, +Y, -Y,
/// +Z, -Z order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureCubeConfig {
    pub px: u32,
    pub nx: u32,
    pub py: u32,
    pub ny: u32,
    pub pz: u32,
    pub nz: u32,
    pub width: u32,
    pub levels: u32,
    pub format: PixelFormat,
}

impl TextureCubeConfig {
    fn faces(&self) -> [u32; 6] {
        [self.px, self.nx, self.py, self.ny, self.pz, self.nz]
    }
}

#[derive(Debug)]
pub(super) struct TextureCube {
    pub(super) surface: SurfaceId,
    faces: [SurfaceId; 6],
    ticks: [u64; 6],
}

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    /// Cube map surface assembled from six face textures. Faces are copied
    /// in again whenever their surface changed since the last call.
    pub fn get_texture_cube(&mut self, config: &TextureCubeConfig) -> Result<SurfaceId, CacheError> {
        let levels = config.levels.max(1);
        let stale = self
            .texture_cubes
            .get(config)
            .map_or(true, |cube| !self.slot_surfaces.contains(cube.surface));
        if stale {
            let res_scale = if self.options.scale_textures {
                self.options.resolution_scale_factor
            } else {
                1
            };
            let mut params = SurfaceParams::new(config.px, config.width, config.width, config.format, true)
                .with_levels(levels)
                .with_res_scale(res_scale);
            params.texture_type = TextureType::CubeMap;
            params.update_params();
            let surface = self.create_surface(params)?;
            self.texture_cubes.insert(
                *config,
                TextureCube {
                    surface,
                    faces: [SurfaceId::NULL; 6],
                    ticks: [0; 6],
                },
            );
        }

        for (layer, addr) in config.faces().into_iter().enumerate() {
            if addr == 0 {
                continue;
            }
            let info = TextureInfo {
                addr,
                width: config.width,
                height: config.width,
                format: config.format,
            };
            let face_id = self.get_texture_surface(&info, levels - 1)?;
            let Some(face) = self.slot_surfaces.get(face_id) else {
                continue;
            };
            let (face_texture, face_tick, face_width) =
                (face.texture, face.modification_tick(), face.params.scaled_width());

            let Some(cube) = self.texture_cubes.get_mut(config) else {
                continue;
            };
            if cube.faces[layer] == face_id && cube.ticks[layer] == face_tick {
                continue;
            }
            cube.faces[layer] = face_id;
            cube.ticks[layer] = face_tick;
            let cube_surface = cube.surface;

            let cube_texture = self.slot_surfaces.get(cube_surface).and_then(|surface| surface.texture);
            let (Some(src), Some(dst)) = (face_texture, cube_texture) else {
                continue;
            };
            for level in 0..levels {
                let size = face_width >> level;
                let copy = TextureCopy {
                    src_level: level,
                    dst_level: level,
                    src_layer: 0,
                    dst_layer: layer as u32,
                    src_offset: (0, 0),
                    dst_offset: (0, 0),
                    extent: (size, size),
                };
                self.backend.copy(src, dst, &copy);
            }
        }

        Ok(self.texture_cubes.get(config).map_or(SurfaceId::NULL, |cube| cube.surface))
    }

    /// Cube maps currently cached.
    pub fn texture_cube_count(&self) -> usize {
        self.texture_cubes.len()
    }

    /// Drops every cube built from `surface_id` and sentences its surface.
    pub(super) fn remove_texture_cubes_of(&mut self, surface_id: SurfaceId) {
        let stale: Vec<TextureCubeConfig> = self
            .texture_cubes
            .iter()
            .filter(|(_, cube)| cube.faces.contains(&surface_id))
            .map(|(config, _)| *config)
            .collect();
        for config in stale {
            if let Some(cube) = self.texture_cubes.remove(&config) {
                tracing::trace!(face = ?surface_id, cube = ?cube.surface, "retiring texture cube");
                self.sentenced.push_back((cube.surface, self.frame_tick));
            }
        }
    }
}
