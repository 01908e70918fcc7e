use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use bg_refine::{
    backends::test_utils::{centered_square_map, MockSegmenter},
    AlphaChannel, Compositor, CompositorConfig, MaskRefiner, PixelBuffer, RefinementParameter,
    RefinementSession, SessionConfig,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

const IMAGE_SIZE: u32 = 1024;
const MAP_SIZE: u32 = 320;

fn test_image() -> PixelBuffer {
    PixelBuffer::from_fn(IMAGE_SIZE, IMAGE_SIZE, |x, y| {
        [(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255]
    })
}

fn benchmark_refine_parameters(c: &mut Criterion) {
    let refiner = MaskRefiner::default();
    let map = centered_square_map(MAP_SIZE, MAP_SIZE);
    let upsampled = refiner
        .upsample(&map, (IMAGE_SIZE, IMAGE_SIZE))
        .expect("square map fits square image");

    let mut group = c.benchmark_group("refine");
    group.sample_size(20);

    group.bench_function("upsample", |b| {
        b.iter(|| refiner.upsample(black_box(&map), (IMAGE_SIZE, IMAGE_SIZE)).unwrap());
    });

    for value in [-10, -5, -1, 0, 1, 5, 10] {
        let parameter = RefinementParameter::new(value);
        group.bench_with_input(
            BenchmarkId::new("shape_edges", parameter),
            &parameter,
            |b, &parameter| {
                b.iter(|| refiner.refine_upsampled(black_box(&upsampled), parameter).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_composite(c: &mut Criterion) {
    let source = test_image();
    let alpha = MaskRefiner::default()
        .refine(
            &centered_square_map(MAP_SIZE, MAP_SIZE),
            RefinementParameter::new(-3),
            (IMAGE_SIZE, IMAGE_SIZE),
        )
        .expect("refine");

    let mut group = c.benchmark_group("composite");
    group.sample_size(20);

    let plain = Compositor::default();
    group.bench_function("plain", |b| {
        b.iter(|| plain.composite_pixels(black_box(&source), black_box(&alpha)).unwrap());
    });

    let defringe = Compositor::new(CompositorConfig {
        defringe: true,
        ..CompositorConfig::default()
    });
    group.bench_function("defringe", |b| {
        b.iter(|| defringe.composite_pixels(black_box(&source), black_box(&alpha)).unwrap());
    });

    let opaque = AlphaChannel::filled(IMAGE_SIZE, IMAGE_SIZE, 255);
    group.bench_function("opaque", |b| {
        b.iter(|| plain.composite_pixels(black_box(&source), black_box(&opaque)).unwrap());
    });

    group.finish();
}

fn benchmark_session_reprocess(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let session = RefinementSession::new(
        SessionConfig::default(),
        Arc::new(MockSegmenter::centered_square(IMAGE_SIZE / MAP_SIZE)),
    )
    .unwrap();
    rt.block_on(async { session.process_image(test_image()).await.unwrap() });

    let mut group = c.benchmark_group("session");
    group.sample_size(20);

    // cached upsample, so this is the interactive slider path
    group.bench_function("reprocess_sweep", |b| {
        b.iter(|| {
            rt.block_on(async {
                for value in [-6, -2, 0, 2, 6] {
                    session
                        .reprocess(black_box(RefinementParameter::new(value)))
                        .await
                        .unwrap();
                }
            })
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_refine_parameters,
    benchmark_composite,
    benchmark_session_reprocess
);
criterion_main!(benches);
