//! Render target lookup.

use pica_texture_codec::PixelFormat;

use super::{RasterizerCache, ScaleMatch};
use crate::backend::{FramebufferDesc, GraphicsBackend};
use crate::error::CacheError;
use crate::memory::GuestMemory;
use crate::params::SurfaceParams;
use crate::rect::Rect;
use crate::slot::{FramebufferId, SurfaceId};

/// Viewport in framebuffer pixels, bottom-left origin. May extend past the
/// framebuffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewportRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferConfig {
    pub color_addr: u32,
    pub depth_addr: u32,
    pub color_format: PixelFormat,
    pub depth_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub viewport: ViewportRect,
    /// Unscaled inclusive scissor box, when the scissor test keeps the
    /// inside.
    pub scissor: Option<Rect>,
}

/// Identity of a cached framebuffer object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FramebufferParams {
    pub color: SurfaceId,
    pub depth: SurfaceId,
    pub color_level: u32,
    pub depth_level: u32,
}

pub(super) struct CachedFramebuffer<B: GraphicsBackend> {
    pub(super) handle: B::Framebuffer,
    params: FramebufferParams,
}

/// Render targets for one draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferHelper {
    pub framebuffer: FramebufferId,
    pub params: FramebufferParams,
    pub res_scale: u16,
    /// Scaled area of the attachments the framebuffer covers.
    pub surfaces_rect: Rect,
    /// Scaled area the draw may touch: the viewport clipped to
    /// `surfaces_rect` and the scissor.
    pub draw_rect: Rect,
}

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    /// Looks up (or creates) the colour and depth surfaces a draw renders
    /// into and validates the part the viewport covers.
    pub fn get_framebuffer_surfaces(
        &mut self,
        config: &FramebufferConfig,
        using_color: bool,
        using_depth: bool,
    ) -> Result<FramebufferHelper, CacheError> {
        let res_scale = self.options.resolution_scale_factor;
        let using_color = using_color && config.color_addr != 0;
        let mut using_depth = using_depth && config.depth_addr != 0;

        let viewport = clamp_viewport(&config.viewport, config.width, config.height);

        let color_params = SurfaceParams::new(config.color_addr, config.width, config.height, config.color_format, true)
            .with_res_scale(res_scale);
        let depth_params = SurfaceParams::new(config.depth_addr, config.width, config.height, config.depth_format, true)
            .with_res_scale(res_scale);

        let color_vp_interval = color_params.sub_rect_interval(viewport, 0);
        let depth_vp_interval = depth_params.sub_rect_interval(viewport, 0);

        if using_color && using_depth && color_vp_interval.overlaps(&depth_vp_interval) {
            tracing::warn!(
                color = config.color_addr,
                depth = config.depth_addr,
                "colour and depth buffers overlap, dropping depth"
            );
            using_depth = false;
        }

        let (mut color_id, mut color_rect) = (SurfaceId::NULL, Rect::default());
        if using_color {
            (color_id, color_rect) = self.get_surface_sub_rect(&color_params, ScaleMatch::Exact, false)?;
        }
        let (mut depth_id, mut depth_rect) = (SurfaceId::NULL, Rect::default());
        if using_depth {
            (depth_id, depth_rect) = self.get_surface_sub_rect(&depth_params, ScaleMatch::Exact, false)?;
        }

        // Both attachments have to cover the same area.
        if !color_id.is_null() && !depth_id.is_null() && color_rect != depth_rect {
            color_id = self.get_surface(&color_params, ScaleMatch::Exact, false)?;
            depth_id = self.get_surface(&depth_params, ScaleMatch::Exact, false)?;
            color_rect = color_params.scaled_rect(0);
            depth_rect = color_rect;
        }

        let surfaces_rect = if !color_id.is_null() {
            color_rect
        } else if !depth_id.is_null() {
            depth_rect
        } else {
            Rect::default()
        };

        if !color_id.is_null() {
            self.validate_surface(color_id, color_vp_interval.start, color_vp_interval.len())?;
        }
        if !depth_id.is_null() {
            self.validate_surface(depth_id, depth_vp_interval.start, depth_vp_interval.len())?;
        }

        let params = FramebufferParams {
            color: color_id,
            depth: depth_id,
            color_level: self.attachment_level(color_id, config.color_addr),
            depth_level: self.attachment_level(depth_id, config.depth_addr),
        };
        let framebuffer = self.framebuffer_for(&params, surfaces_rect);

        let mut draw_rect = viewport_draw_rect(&config.viewport, &surfaces_rect, u32::from(res_scale));
        if let Some(scissor) = config.scissor {
            let scale = u32::from(res_scale);
            let scissor_rect = Rect::new(
                surfaces_rect.left + scissor.left * scale,
                surfaces_rect.bottom + (scissor.top + 1) * scale,
                surfaces_rect.left + (scissor.right + 1) * scale,
                surfaces_rect.bottom + scissor.bottom * scale,
            );
            draw_rect = draw_rect.intersect(&scissor_rect);
        }

        self.bound = [color_id, depth_id].into_iter().filter(|id| !id.is_null()).collect();
        Ok(FramebufferHelper {
            framebuffer,
            params,
            res_scale,
            surfaces_rect,
            draw_rect,
        })
    }

    /// Marks what a draw through `helper` may have written as owned by the
    /// attachments.
    pub fn invalidate_framebuffer(&mut self, helper: &FramebufferHelper) -> Result<(), CacheError> {
        if helper.draw_rect.is_empty() {
            return Ok(());
        }
        let attachments = [
            (helper.params.color, helper.params.color_level),
            (helper.params.depth, helper.params.depth_level),
        ];
        for (surface_id, level) in attachments {
            let Some(surface) = self.slot_surfaces.get(surface_id) else {
                continue;
            };
            let scale = u32::from(surface.params.res_scale).max(1);
            let draw = helper.draw_rect;
            let unscaled = Rect::new(draw.left / scale, draw.top / scale, draw.right / scale, draw.bottom / scale);
            let interval = surface.params.sub_rect_interval(unscaled, level);
            let interval = interval.intersect(&surface.params.interval());
            self.invalidate_region(interval.start, interval.len(), surface_id)?;
        }
        Ok(())
    }

    pub fn framebuffer(&self, id: FramebufferId) -> Option<B::Framebuffer> {
        self.slot_framebuffers.get(id).map(|framebuffer| framebuffer.handle)
    }

    /// Drops framebuffers that render into `surface_id`.
    pub(super) fn remove_framebuffers(&mut self, surface_id: SurfaceId) {
        let stale: Vec<(FramebufferParams, FramebufferId)> = self
            .framebuffers
            .iter()
            .filter(|(params, _)| params.color == surface_id || params.depth == surface_id)
            .map(|(params, id)| (*params, *id))
            .collect();
        for (params, id) in stale {
            self.framebuffers.remove(&params);
            if let Some(framebuffer) = self.slot_framebuffers.remove(id) {
                debug_assert_eq!(framebuffer.params, params);
                self.backend.destroy_framebuffer(framebuffer.handle);
            }
        }
    }

    fn attachment_level(&self, surface_id: SurfaceId, addr: u32) -> u32 {
        self.slot_surfaces
            .get(surface_id)
            .map_or(0, |surface| surface.params.level_of(addr))
    }

    fn framebuffer_for(&mut self, params: &FramebufferParams, surfaces_rect: Rect) -> FramebufferId {
        if let Some(id) = self.framebuffers.get(params) {
            return *id;
        }
        let texture_of = |id: SurfaceId, level: u32| {
            self.slot_surfaces
                .get(id)
                .and_then(|surface| surface.texture)
                .map(|texture| (texture, level))
        };
        let desc = FramebufferDesc {
            color: texture_of(params.color, params.color_level),
            depth: texture_of(params.depth, params.depth_level),
            depth_has_stencil: self
                .slot_surfaces
                .get(params.depth)
                .is_some_and(|surface| surface.params.pixel_format == PixelFormat::D24s8),
            width: surfaces_rect.width(),
            height: surfaces_rect.height(),
        };
        let handle = self.backend.create_framebuffer(&desc);
        let id = self.slot_framebuffers.insert(CachedFramebuffer { handle, params: *params });
        self.framebuffers.insert(*params, id);
        id
    }
}

/// Unscaled viewport clipped to the framebuffer.
fn clamp_viewport(viewport: &ViewportRect, width: u32, height: u32) -> Rect {
    let clamp = |value: i32, max: u32| value.clamp(0, max as i32) as u32;
    let left = clamp(viewport.left, width);
    let bottom = clamp(viewport.bottom, height);
    Rect::new(
        left,
        clamp(viewport.top, height).max(bottom),
        clamp(viewport.right, width).max(left),
        bottom,
    )
}

/// Scaled viewport placed in `surfaces_rect` and clipped to it.
fn viewport_draw_rect(viewport: &ViewportRect, surfaces_rect: &Rect, scale: u32) -> Rect {
    let place = |origin: u32, offset: i32, min: u32, max: u32| {
        let value = i64::from(origin) + i64::from(offset) * i64::from(scale);
        value.clamp(i64::from(min), i64::from(max)) as u32
    };
    let sr = surfaces_rect;
    Rect::new(
        place(sr.left, viewport.left, sr.left, sr.right),
        place(sr.bottom, viewport.top, sr.bottom, sr.top),
        place(sr.left, viewport.right, sr.left, sr.right),
        place(sr.bottom, viewport.bottom, sr.bottom, sr.top),
    )
}
