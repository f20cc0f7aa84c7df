//! Replacing guest textures with texture pack materials.

use std::sync::Arc;

use super::RasterizerCache;
use crate::backend::GraphicsBackend;
use crate::error::CacheError;
use crate::material::{CustomTextureProvider, DecodeState, Material};
use crate::memory::GuestMemory;
use crate::slot::SurfaceId;

/// A surface waiting for its material to finish decoding.
#[derive(Debug)]
pub(super) struct PendingUpload {
    surface: SurfaceId,
    material: Arc<Material>,
}

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    pub fn set_custom_texture_provider(&mut self, provider: Box<dyn CustomTextureProvider>) {
        self.custom = Some(provider);
    }

    /// Surfaces queued for a replacement that is still decoding.
    pub fn pending_custom_uploads(&self) -> usize {
        self.custom_uploads.len()
    }

    /// Forgets replacements queued for `surface_id`. Its guest bytes no
    /// longer hash to the queued material.
    pub(super) fn discard_custom_uploads(&mut self, surface_id: SurfaceId) {
        let before = self.custom_uploads.len();
        self.custom_uploads.retain(|pending| pending.surface != surface_id);
        if self.custom_uploads.len() != before {
            tracing::debug!(?surface_id, "dropping queued replacement texture");
        }
    }

    /// Tries to satisfy an upload of `level` from the material matching
    /// `hash`. Returns `true` if the guest data must not be uploaded.
    pub(super) fn try_upload_custom(&mut self, surface_id: SurfaceId, level: u32, hash: u64) -> Result<bool, CacheError> {
        let Some(provider) = self.custom.as_ref() else {
            return Ok(false);
        };
        if level != 0 {
            return Ok(provider.skip_mipmaps() && self.slot_surfaces[surface_id].is_custom());
        }
        let Some(material) = provider.material(hash) else {
            return Ok(false);
        };

        match material.state() {
            DecodeState::Decoded => self.apply_material(surface_id, &material),
            DecodeState::Failed => Ok(false),
            state => {
                if state == DecodeState::Unloaded {
                    provider.request_decode(&material);
                }
                let queued = self
                    .custom_uploads
                    .iter()
                    .any(|pending| pending.surface == surface_id && Arc::ptr_eq(&pending.material, &material));
                if !queued {
                    tracing::debug!(hash = format_args!("{hash:016x}"), "queueing replacement texture");
                    self.custom_uploads.push_back(PendingUpload { surface: surface_id, material });
                }
                // Show the guest texture until the replacement is ready.
                Ok(false)
            }
        }
    }

    /// Swaps the surface's texture for one holding `material`.
    fn apply_material(&mut self, surface_id: SurfaceId, material: &Arc<Material>) -> Result<bool, CacheError> {
        let Some((width, height, format)) = material.extent() else {
            return Ok(false);
        };
        if !self.backend.supports_custom_format(format) {
            tracing::debug!(?format, "backend can't sample replacement format");
            return Ok(false);
        }
        let Some(surface) = self.slot_surfaces.get(surface_id) else {
            return Ok(false);
        };

        let params = surface.params;
        let mut desc = self.texture_desc(&params);
        desc.width = width;
        desc.height = height;
        desc.levels = 1;
        desc.res_scale = 1;
        desc.custom_format = Some(format);
        desc.converted = false;
        let texture = self.allocate(&params, &desc)?;
        material.with_data(|data| self.backend.upload_material(texture, data, 0));

        let surface = &mut self.slot_surfaces[surface_id];
        if let Some(old) = surface.texture.replace(texture) {
            self.backend.destroy_texture(old);
        }
        surface.params.custom_format = Some(format);
        surface.material = Some(Arc::clone(material));
        tracing::debug!(surface = %params, width, height, "applied replacement texture");
        Ok(true)
    }

    /// Gives a surface that held a material a guest-sized texture again.
    pub(super) fn restore_native_texture(&mut self, surface_id: SurfaceId) -> Result<(), CacheError> {
        // Replacements can't be written back; drop what it owns.
        self.flush_owned(surface_id)?;
        let mut params = self.slot_surfaces[surface_id].params;
        params.custom_format = None;
        let desc = self.texture_desc(&params);
        let texture = self.allocate(&params, &desc)?;

        let surface = &mut self.slot_surfaces[surface_id];
        if let Some(old) = surface.texture.replace(texture) {
            self.backend.destroy_texture(old);
        }
        surface.params = params;
        surface.material = None;
        surface.mark_invalid(params.interval());
        Ok(())
    }

    /// Applies up to `max_custom_uploads_per_tick` finished materials.
    pub(super) fn process_custom_uploads(&mut self) -> Result<(), CacheError> {
        let budget = self.options.max_custom_uploads_per_tick;
        let mut applied = 0;
        let mut waiting = std::collections::VecDeque::new();

        while let Some(pending) = self.custom_uploads.pop_front() {
            if applied >= budget {
                waiting.push_back(pending);
                continue;
            }
            if !self.slot_surfaces.contains(pending.surface) {
                continue;
            }
            match pending.material.state() {
                DecodeState::Decoded => {
                    self.apply_material(pending.surface, &pending.material)?;
                    applied += 1;
                }
                DecodeState::Failed => {
                    tracing::warn!(hash = format_args!("{:016x}", pending.material.hash()), "replacement texture failed to decode");
                }
                DecodeState::Unloaded | DecodeState::Pending => waiting.push_back(pending),
            }
        }
        self.custom_uploads = waiting;
        Ok(())
    }
}
