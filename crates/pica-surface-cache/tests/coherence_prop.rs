#![cfg(not(target_arch = "wasm32"))]

mod common;

use common::{cache, peek, poke, rgba8, TestCache};
use pica_surface_cache::{FillValue, MemoryFillConfig, ScaleMatch, SurfaceId};
use proptest::prelude::*;

/// Surfaces live in the first 16 KiB; one tile row of a 32 pixel wide RGBA8
/// surface is 1 KiB.
const WINDOW: u32 = 0x4000;
const ROW: u32 = 0x400;

#[derive(Clone, Debug)]
enum Op {
    Lookup { row: u32, rows: u32 },
    Render { row: u32, rows: u32 },
    CpuWrite { offset: u32, data: Vec<u8> },
    Fill { offset: u32, len: u32, value: u32 },
    Flush { offset: u32, len: u32 },
    Tick,
}

fn op() -> impl Strategy<Value = Op> {
    let rows = (0u32..12, 1u32..=4);
    prop_oneof![
        4 => rows.clone().prop_map(|(row, rows)| Op::Lookup { row, rows }),
        3 => rows.prop_map(|(row, rows)| Op::Render { row, rows }),
        3 => (0..WINDOW, proptest::collection::vec(any::<u8>(), 1..300))
            .prop_map(|(offset, data)| Op::CpuWrite { offset, data }),
        2 => (0..WINDOW, 1u32..0x1000, any::<u32>()).prop_map(|(offset, len, value)| Op::Fill { offset, len, value }),
        2 => (0..WINDOW, 1u32..0x1000).prop_map(|(offset, len)| Op::Flush { offset, len }),
        1 => Just(Op::Tick),
    ]
}

/// Applies `op` to the cache and to a model of what guest memory should
/// read back as.
fn apply(cache: &mut TestCache, model: &mut [u8], op: &Op) {
    match op {
        Op::Lookup { row, rows } => {
            let params = rgba8(row * ROW, 32, rows * 8);
            cache.get_surface_sub_rect(&params, ScaleMatch::Ignore, true).unwrap();
        }
        Op::Render { row, rows } => {
            // The draw writes back exactly what the surface already holds,
            // so the model doesn't change but ownership does.
            let params = rgba8(row * ROW, 32, rows * 8);
            let (id, _) = cache.get_surface_sub_rect(&params, ScaleMatch::Ignore, true).unwrap();
            cache.invalidate_region(params.addr, params.size, id).unwrap();
        }
        Op::CpuWrite { offset, data } => {
            cache.write_guest_memory(*offset, data).unwrap();
            let start = *offset as usize;
            let end = (start + data.len()).min(model.len());
            model[start..end].copy_from_slice(&data[..end - start]);
        }
        Op::Fill { offset, len, value } => {
            let fill = MemoryFillConfig {
                start: *offset,
                end: offset + len,
                value: FillValue::Bits32(*value),
            };
            cache.accelerate_fill(&fill).unwrap();
            let pattern = value.to_le_bytes();
            for (i, byte) in model[*offset as usize..(offset + len) as usize].iter_mut().enumerate() {
                *byte = pattern[i % 4];
            }
        }
        Op::Flush { offset, len } => cache.flush_region(*offset, *len, SurfaceId::NULL).unwrap(),
        Op::Tick => cache.tick_frame().unwrap(),
    }
}

fn check_invariants(cache: &TestCache) -> Result<(), TestCaseError> {
    for (interval, owner) in cache.dirty_regions() {
        let surface = cache.surface(owner);
        prop_assert!(surface.is_some(), "{interval:?} owned by a destroyed surface");
        prop_assert!(
            surface.is_some_and(|s| s.is_region_valid(interval)),
            "{interval:?} owned by a surface that doesn't hold it"
        );
    }
    for (_, surface) in cache.registered() {
        let bounds = surface.params.interval();
        for invalid in surface.invalid_regions().iter() {
            prop_assert!(bounds.contains(&invalid), "{invalid:?} outside {bounds:?}");
        }
        prop_assert!(cache.memory().is_cached(bounds.start));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn guest_memory_reads_back_the_latest_writes(
        seed in proptest::collection::vec(any::<u8>(), WINDOW as usize * 2),
        ops in proptest::collection::vec(op(), 1..40),
    ) {
        let mut cache = cache();
        poke(&mut cache, 0, &seed);
        let mut model = seed;

        for op in &ops {
            apply(&mut cache, &mut model, op);
            check_invariants(&cache)?;
        }

        cache.flush_all().unwrap();
        prop_assert!(cache.dirty_regions().is_empty());
        prop_assert_eq!(peek(&cache, 0, model.len()), model);
    }
}
