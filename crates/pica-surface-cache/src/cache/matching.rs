use super::RasterizerCache;
use crate::backend::GraphicsBackend;
use crate::interval::SurfaceInterval;
use crate::memory::GuestMemory;
use crate::params::SurfaceParams;
use crate::slot::SurfaceId;
use crate::surface::SurfaceBase;

bitflags::bitflags! {
    /// Relationships a lookup accepts between a cached surface and the
    /// requested parameters.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MatchFlags: u8 {
        /// Same address, geometry and format.
        const EXACT = 1 << 0;
        /// The request is a rectangle inside the surface.
        const SUB_RECT = 1 << 1;
        /// The surface can supply part of the request by copy or fill.
        const COPY = 1 << 2;
        /// The surface can be merged with the request into a taller one.
        const EXPAND = 1 << 3;
        /// The surface can serve a raw texture copy.
        const TEX_COPY = 1 << 4;
        /// Same bits per pixel, different format.
        const REINTERPRET = 1 << 5;
    }
}

/// Resolution scale a lookup accepts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScaleMatch {
    /// Only the requested scale.
    Exact,
    /// The requested scale or higher.
    Upscale,
    /// Any scale.
    #[default]
    Ignore,
}

/// Candidates compare field by field; a later field only breaks ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MatchRank {
    exact: bool,
    same_scale: bool,
    res_scale: u16,
    valid: bool,
    modification_tick: u64,
    /// Smaller surfaces win containment matches, larger intervals win
    /// copies.
    extent: i64,
}

impl<B: GraphicsBackend, M: GuestMemory> RasterizerCache<B, M> {
    /// Best registered surface matching `params` under any of `flags`, or
    /// [`SurfaceId::NULL`].
    ///
    /// `validate` narrows the range that has to be valid for a candidate to
    /// be preferred; it defaults to the whole request.
    pub fn find_match(
        &self,
        params: &SurfaceParams,
        flags: MatchFlags,
        match_scale: ScaleMatch,
        validate: Option<SurfaceInterval>,
    ) -> SurfaceId {
        self.find_match_filtered(params, flags, match_scale, validate, |_| true)
    }

    pub(super) fn find_match_filtered(
        &self,
        params: &SurfaceParams,
        flags: MatchFlags,
        match_scale: ScaleMatch,
        validate: Option<SurfaceInterval>,
        filter: impl Fn(&SurfaceBase) -> bool,
    ) -> SurfaceId {
        let validate_interval = validate.unwrap_or_else(|| params.interval());
        let mut best: Option<(MatchRank, SurfaceId)> = None;

        for surface_id in self.surfaces_in_region(params.addr, params.size) {
            let surface = &self.slot_surfaces[surface_id];
            if !filter(&surface.base) {
                continue;
            }
            // Fills carry the largest scale, so only `Exact` turns them away.
            let scale_ok = match match_scale {
                ScaleMatch::Exact => surface.params.res_scale == params.res_scale,
                ScaleMatch::Upscale => surface.params.res_scale >= params.res_scale,
                ScaleMatch::Ignore => true,
            };
            if !scale_ok {
                continue;
            }
            let valid = flags.contains(MatchFlags::COPY) || surface.is_region_valid(validate_interval);

            for flag in flags.iter() {
                let Some(extent) = match_extent(surface, params, flag, validate_interval) else {
                    continue;
                };
                let rank = MatchRank {
                    exact: surface.params.exact_match(params),
                    same_scale: surface.params.res_scale == params.res_scale,
                    res_scale: surface.params.res_scale,
                    valid,
                    modification_tick: surface.modification_tick(),
                    extent,
                };
                if best.map_or(true, |(best_rank, _)| rank > best_rank) {
                    best = Some((rank, surface_id));
                }
            }
        }
        best.map_or(SurfaceId::NULL, |(_, id)| id)
    }
}

/// Tie-break weight of `surface` if it matches `params` under `flag`.
fn match_extent(
    surface: &SurfaceBase,
    params: &SurfaceParams,
    flag: MatchFlags,
    validate: SurfaceInterval,
) -> Option<i64> {
    let own_size = -i64::from(surface.params.size);
    if flag == MatchFlags::EXACT {
        surface.params.exact_match(params).then_some(own_size)
    } else if flag == MatchFlags::SUB_RECT {
        surface.params.can_sub_rect(params).then_some(own_size)
    } else if flag == MatchFlags::EXPAND {
        surface.params.can_expand(params).then_some(own_size)
    } else if flag == MatchFlags::TEX_COPY {
        surface.params.can_tex_copy(params).then_some(own_size)
    } else if flag == MatchFlags::COPY {
        let copy_interval = surface.copyable_interval(params);
        let usable = !copy_interval.intersect(&validate).is_empty() && surface.can_copy(params, copy_interval);
        usable.then_some(i64::from(copy_interval.len()))
    } else if flag == MatchFlags::REINTERPRET {
        let copy_interval = surface.copyable_interval(params);
        let usable = !copy_interval.intersect(&validate).is_empty() && surface.params.can_reinterpret(params);
        usable.then_some(i64::from(copy_interval.len()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FillValue, MemoryFillConfig, RasterizerCacheOptions};
    use crate::memory::VecGuestMemory;
    use crate::software::SoftwareBackend;
    use pica_texture_codec::PixelFormat;
    use pretty_assertions::assert_eq;

    fn cache() -> RasterizerCache<SoftwareBackend, VecGuestMemory> {
        RasterizerCache::new(
            SoftwareBackend::new(),
            VecGuestMemory::new(0, 0x10_0000),
            RasterizerCacheOptions::default(),
        )
    }

    #[test]
    fn rank_orders_fields_lexicographically() {
        let base = MatchRank {
            exact: false,
            same_scale: true,
            res_scale: 1,
            valid: false,
            modification_tick: 10,
            extent: -0x1000,
        };
        let exact = MatchRank { exact: true, ..base };
        let valid = MatchRank { valid: true, modification_tick: 0, ..base };
        let smaller = MatchRank { extent: -0x100, ..base };
        assert!(exact > valid);
        assert!(valid > base);
        assert!(smaller > base);
    }

    #[test]
    fn sub_rect_prefers_the_smaller_container() {
        let mut cache = cache();
        let big = SurfaceParams::new(0x1000, 32, 32, PixelFormat::Rgba8, true);
        let small = SurfaceParams::new(0x1000, 32, 16, PixelFormat::Rgba8, true);
        cache.get_surface(&big, ScaleMatch::Exact, false).unwrap();
        let small_id = cache.get_surface(&small, ScaleMatch::Exact, false).unwrap();

        let request = SurfaceParams::new(0x1000, 32, 8, PixelFormat::Rgba8, true);
        assert_eq!(cache.find_match(&request, MatchFlags::SUB_RECT, ScaleMatch::Ignore, None), small_id);
    }

    #[test]
    fn exact_scale_filter_skips_other_scales() {
        let mut cache = cache();
        let params = SurfaceParams::new(0x1000, 32, 32, PixelFormat::Rgba8, true);
        cache.get_surface(&params.with_res_scale(2), ScaleMatch::Exact, false).unwrap();

        assert!(cache.find_match(&params, MatchFlags::EXACT, ScaleMatch::Exact, None).is_null());
        assert!(!cache.find_match(&params, MatchFlags::EXACT, ScaleMatch::Upscale, None).is_null());
        assert!(cache
            .find_match(&params.with_res_scale(4), MatchFlags::EXACT, ScaleMatch::Upscale, None)
            .is_null());
    }

    #[test]
    fn exact_scale_never_returns_a_fill() {
        let mut cache = cache();
        let fill = MemoryFillConfig {
            start: 0x1000,
            end: 0x2000,
            value: FillValue::Bits32(0xFF00_00FF),
        };
        assert!(cache.accelerate_fill(&fill).unwrap());
        let params = SurfaceParams::new(0x1000, 32, 32, PixelFormat::Rgba8, true);

        assert!(cache.find_match(&params, MatchFlags::COPY, ScaleMatch::Exact, None).is_null());
        let found = cache.find_match(&params, MatchFlags::COPY, ScaleMatch::Ignore, None);
        assert_eq!(cache.surface(found).map(|s| s.params.res_scale), Some(u16::MAX));
    }

    #[test]
    fn nothing_registered_means_no_match() {
        let cache = cache();
        let params = SurfaceParams::new(0x1000, 32, 32, PixelFormat::Rgba8, true);
        let all = MatchFlags::all();
        assert_eq!(cache.find_match(&params, all, ScaleMatch::Ignore, None), SurfaceId::NULL);
    }
}
