#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
#[cfg(not(target_arch = "wasm32"))]
use pica_texture_codec::{decode_texture, encode_texture, PixelFormat, TextureLayout};

#[cfg(not(target_arch = "wasm32"))]
fn criterion_config() -> Criterion {
    match std::env::var("PICA_BENCH_PROFILE").as_deref() {
        Ok("ci") => Criterion::default()
            .warm_up_time(Duration::from_millis(150))
            .measurement_time(Duration::from_millis(400))
            .sample_size(10),
        _ => Criterion::default()
            .warm_up_time(Duration::from_secs(1))
            .measurement_time(Duration::from_secs(2))
            .sample_size(50),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_tiled(c: &mut Criterion) {
    let mut group = c.benchmark_group("morton");
    for format in [PixelFormat::Rgba8, PixelFormat::Rgb565, PixelFormat::I4, PixelFormat::Etc1] {
        let layout = TextureLayout { format, width: 256, height: 256, tiled: true };
        let guest = vec![0x5Au8; layout.guest_size()];
        let mut host = vec![0u8; layout.linear_size(true)];
        group.throughput(Throughput::Bytes(guest.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode", format), &guest, |b, guest| {
            b.iter(|| {
                decode_texture(&layout, 0, guest.len() as u32, black_box(guest), &mut host, true)
                    .unwrap();
            })
        });

        if format.is_compressed() {
            continue;
        }
        let mut out = vec![0u8; guest.len()];
        group.bench_with_input(BenchmarkId::new("encode", format), &host, |b, host| {
            b.iter(|| {
                encode_texture(&layout, 0, out.len() as u32, black_box(host), &mut out, true).unwrap();
            })
        });
    }
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_tiled
}

#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
