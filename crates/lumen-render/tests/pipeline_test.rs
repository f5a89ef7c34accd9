use std::sync::Arc;

use lumen_core::{BlendFunction, BlendMode, Color, LumenConfig, LumenError, Surface};
use lumen_render::{
    asset_requests, build_passes, AssetBundle, AssetLoader, Backend, ColorOverlayEffect, Composer,
    EdgeDetectionMode, Effect, EffectPass, FrameInputs, GpuRenderer, SmaaEffect, SmaaLookup,
    SmaaPreset, VignetteEffect,
};

fn overlay(color: Color, function: BlendFunction, opacity: f32) -> Effect {
    Effect::fusable(ColorOverlayEffect::new(color, BlendMode::new(function, opacity)))
}

fn smaa(preset: SmaaPreset) -> Effect {
    Effect::multi_pass(SmaaEffect::new(preset, EdgeDetectionMode::Luma))
}

fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("lumen-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_effect_order_changes_program_and_result() {
    let forward = EffectPass::new(vec![
        overlay(Color::RED, BlendFunction::Normal, 1.0),
        Effect::fusable(VignetteEffect::new(1.0, 1.0)),
    ])
    .unwrap();
    let reversed = EffectPass::new(vec![
        Effect::fusable(VignetteEffect::new(1.0, 1.0)),
        overlay(Color::RED, BlendFunction::Normal, 1.0),
    ])
    .unwrap();
    assert_ne!(forward.program_id(), reversed.program_id());

    let input = Surface::solid(8, 8, &Color::WHITE);
    let mut a = Composer::new(8, 8);
    a.add_pass(forward).unwrap();
    let mut b = Composer::new(8, 8);
    b.add_pass(reversed).unwrap();
    let corner_a = a.render(&FrameInputs::new(&input)).unwrap().at(0, 0);
    let corner_b = b.render(&FrameInputs::new(&input)).unwrap().at(0, 0);
    // overlay last paints over the darkened corner
    assert_eq!(corner_b, Color::RED.to_array());
    assert!(corner_a[0] < 1.0);
}

#[test]
fn test_skip_effect_is_not_folded() {
    let pass = EffectPass::new(vec![overlay(Color::RED, BlendFunction::Skip, 1.0)]).unwrap();
    assert!(!pass.program().source().contains("e0_opacity"));

    let mut composer = Composer::new(4, 4);
    composer.add_pass(pass).unwrap();
    let input = Surface::solid(4, 4, &Color::BLUE);
    assert_eq!(composer.render(&FrameInputs::new(&input)).unwrap(), &input);
}

#[test]
fn test_opacity_does_not_change_program() {
    let half = EffectPass::new(vec![overlay(Color::GREEN, BlendFunction::Screen, 0.5)]).unwrap();
    let full = EffectPass::new(vec![overlay(Color::GREEN, BlendFunction::Screen, 1.0)]).unwrap();
    assert_eq!(half.program_id(), full.program_id());

    let other = EffectPass::new(vec![overlay(Color::GREEN, BlendFunction::Multiply, 1.0)]).unwrap();
    assert_ne!(half.program_id(), other.program_id());
}

#[test]
fn test_smaa_softens_straight_edge_inside_fused_pass() {
    let input = Surface::from_fn(8, 8, |x, _| if x < 4 { [0.0, 0.0, 0.0, 1.0] } else { [1.0; 4] });
    let tint = Arc::new(ColorOverlayEffect::new(
        Color::BLACK,
        BlendMode::new(BlendFunction::Normal, 0.0),
    ));
    let pass = EffectPass::new(vec![smaa(SmaaPreset::Ultra), Effect::Fusable(tint)]).unwrap();
    assert!(pass.chain().is_some());

    let mut composer = Composer::new(8, 8);
    composer.add_pass(pass).unwrap();
    let out = composer.render(&FrameInputs::new(&input)).unwrap();
    for y in 0..8 {
        assert!(out.at(3, y)[0] > 0.1 && out.at(3, y)[0] < 0.5);
        assert!(out.at(4, y)[0] > 0.5 && out.at(4, y)[0] < 0.9);
        assert_eq!(out.at(0, y), input.at(0, y));
    }
}

#[test]
fn test_smaa_staircase_stays_bounded() {
    let input = Surface::from_fn(16, 16, |x, y| if x < 4 + y / 4 { [0.0, 0.0, 0.0, 1.0] } else { [1.0; 4] });
    let mut composer = Composer::new(16, 16);
    composer.add_pass(EffectPass::new(vec![smaa(SmaaPreset::High)]).unwrap()).unwrap();
    let out = composer.render(&FrameInputs::new(&input)).unwrap().clone();

    assert_ne!(out, input);
    for texel in &out.data {
        assert!(texel.iter().all(|c| (0.0..=1.0).contains(c)));
    }
    // far from the boundary nothing moves
    assert_eq!(out.at(0, 8), input.at(0, 8));
    assert_eq!(out.at(15, 8), input.at(15, 8));
}

#[test]
fn test_identical_smaa_chains_share_one_run() {
    let single = EffectPass::new(vec![smaa(SmaaPreset::Medium)]).unwrap();
    let doubled = EffectPass::new(vec![smaa(SmaaPreset::Medium), smaa(SmaaPreset::Medium)]).unwrap();
    assert_eq!(single.program_id(), doubled.program_id());

    let err = EffectPass::new(vec![smaa(SmaaPreset::Low), smaa(SmaaPreset::Ultra)]).unwrap_err();
    assert!(matches!(err, LumenError::IncompatibleDedicatedPass { .. }));
}

#[test]
fn test_composer_resize_and_mismatch() {
    let mut composer = Composer::new(4, 4);
    composer
        .add_pass(EffectPass::new(vec![smaa(SmaaPreset::Low)]).unwrap())
        .unwrap();
    let big = Surface::solid(6, 3, &Color::WHITE);
    assert!(matches!(
        composer.render(&FrameInputs::new(&big)),
        Err(LumenError::InvalidArgument(_))
    ));
    composer.resize(6, 3);
    assert_eq!(composer.size(), (6, 3));
    assert_eq!(composer.render(&FrameInputs::new(&big)).unwrap(), &big);
}

#[test]
fn test_context_lost_until_reinitialized() {
    let mut composer = Composer::new(2, 2);
    composer
        .add_pass(EffectPass::new(vec![overlay(Color::RED, BlendFunction::Normal, 1.0)]).unwrap())
        .unwrap();
    composer.mark_context_lost("adapter reset");
    let input = Surface::new(2, 2);
    let err = composer.render(&FrameInputs::new(&input)).unwrap_err();
    assert!(err.requires_reinitialization());

    composer.reinitialize(Backend::Cpu).unwrap();
    assert_eq!(composer.passes().len(), 1);
    assert_eq!(
        composer.render(&FrameInputs::new(&input)).unwrap().at(0, 0),
        Color::RED.to_array()
    );
}

#[test]
fn test_lookup_tables_survive_png_round_trip() {
    let dir = scratch_dir("lookup");
    let generated = SmaaLookup::generate();
    generated.save_png(&dir).unwrap();

    let bundle = AssetLoader::new()
        .with_smaa_lookup(&dir)
        .load_blocking()
        .unwrap();
    assert!(bundle.failures().is_empty());
    let effect = SmaaEffect::from_assets(&bundle, SmaaPreset::High, EdgeDetectionMode::Color).unwrap();
    assert_eq!(**effect.lookup(), generated);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_configured_lookup_dir_must_exist() {
    let config = LumenConfig::from_toml_str(
        "[smaa]\nlookup_dir = \"/nonexistent/lumen-luts\"\n\n[[pass]]\n[[pass.effect]]\nkind = \"smaa\"\n",
    )
    .unwrap();
    let bundle = asset_requests(&config).load_blocking().unwrap();
    assert_eq!(bundle.failures().len(), 2);
    let err = build_passes(&config, &bundle).unwrap_err();
    assert!(matches!(err, LumenError::MissingAsset { .. }));
}

#[test]
fn test_missing_overlay_texture() {
    let err = SmaaEffect::from_assets(&AssetBundle::default(), SmaaPreset::Low, EdgeDetectionMode::Luma)
        .unwrap_err();
    assert!(matches!(err, LumenError::MissingAsset { .. }));
}

#[test]
fn test_gpu_matches_cpu_when_adapter_available() {
    let gpu = match GpuRenderer::headless() {
        Ok(gpu) => Arc::new(gpu),
        Err(e) => {
            eprintln!("skipping: no GPU adapter ({e})");
            return;
        }
    };
    let input = Surface::from_fn(16, 16, |x, y| [x as f32 / 15.0, y as f32 / 15.0, 0.5, 1.0]);
    let effects = || {
        vec![
            overlay(Color::RED, BlendFunction::Overlay, 0.5),
            Effect::fusable(VignetteEffect::new(1.0, 0.5)),
        ]
    };

    let mut cpu = Composer::new(16, 16);
    cpu.add_pass(EffectPass::new(effects()).unwrap()).unwrap();
    let expected = cpu.render(&FrameInputs::new(&input)).unwrap().clone();

    let mut composer = Composer::new(16, 16).with_backend(Backend::Gpu(gpu));
    composer.add_pass(EffectPass::new(effects()).unwrap()).unwrap();
    let actual = composer.render(&FrameInputs::new(&input)).unwrap();
    assert!(actual.max_abs_diff(&expected) < 0.02);
}
