use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lumen_core::{BlendFunction, BlendMode, Color, Surface};
use lumen_render::smaa::{blend, edges, weights};
use lumen_render::{
    ColorOverlayEffect, Composer, EdgeDetectionMode, Effect, EffectPass, FrameInputs, SmaaEffect,
    SmaaLookup, SmaaPreset, VignetteEffect,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 360;

/// Diagonal stripes: long staircases in both directions.
fn create_frame() -> Surface {
    Surface::from_fn(WIDTH, HEIGHT, |x, y| {
        if (x + y / 3) / 24 % 2 == 0 {
            [0.9, 0.85, 0.8, 1.0]
        } else {
            [0.1, 0.15, 0.2, 1.0]
        }
    })
}

fn bench_smaa_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("lumen_smaa_stages");
    let frame = create_frame();
    let lookup = SmaaLookup::shared();
    let settings = SmaaPreset::High.settings();

    let mut edge_map = Surface::new(WIDTH, HEIGHT);
    edges::detect(&frame, EdgeDetectionMode::Luma, settings.threshold, &mut edge_map);
    let mut weight_map = Surface::new(WIDTH, HEIGHT);
    weights::compute(&edge_map, &lookup, &settings, &mut weight_map);
    let mut output = Surface::new(WIDTH, HEIGHT);

    group.bench_function("edge_detection_luma", |b| {
        let mut out = Surface::new(WIDTH, HEIGHT);
        b.iter(|| edges::detect(black_box(&frame), EdgeDetectionMode::Luma, settings.threshold, &mut out));
    });
    group.bench_function("blending_weights_high", |b| {
        let mut out = Surface::new(WIDTH, HEIGHT);
        b.iter(|| weights::compute(black_box(&edge_map), &lookup, &settings, &mut out));
    });
    group.bench_function("neighborhood_blending", |b| {
        b.iter(|| blend::blend(black_box(&frame), &weight_map, &mut output));
    });
    group.bench_function("lookup_generation", |b| {
        b.iter(SmaaLookup::generate);
    });
    group.finish();
}

fn bench_composer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lumen_composer");
    group.sample_size(20);
    let frame = create_frame();

    for preset in [SmaaPreset::Low, SmaaPreset::Ultra] {
        let mut composer = Composer::new(WIDTH, HEIGHT);
        composer
            .add_pass(
                EffectPass::new(vec![
                    Effect::multi_pass(SmaaEffect::new(preset, EdgeDetectionMode::Luma)),
                    Effect::fusable(ColorOverlayEffect::new(
                        Color::rgb(1.0, 0.5, 0.2),
                        BlendMode::new(BlendFunction::SoftLight, 0.3),
                    )),
                    Effect::fusable(VignetteEffect::default()),
                ])
                .unwrap(),
            )
            .unwrap();

        group.bench_function(format!("smaa_{preset}_plus_two_fused"), |b| {
            let mut frame_index = 0u32;
            b.iter(|| {
                frame_index += 1;
                let inputs = FrameInputs::new(&frame).at(frame_index as f32 / 60.0, frame_index);
                black_box(composer.render(&inputs).unwrap().size());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_smaa_stages, bench_composer);
criterion_main!(benches);
