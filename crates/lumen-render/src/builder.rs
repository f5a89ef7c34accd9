//! Building effects and passes from a [`LumenConfig`].

use std::path::Path;
use std::str::FromStr;

use lumen_core::{
    BlendFunction, BlendMode, Color, EffectConfig, LumenConfig, LumenError, LumenResult,
    SmaaConfig, UvTransform,
};

use crate::assets::{AssetBundle, AssetLoader};
use crate::effect::Effect;
use crate::effects::{
    BrightnessContrastEffect, ColorOverlayEffect, DepthEffect, TextureEffect, VignetteEffect,
};
use crate::pass::EffectPass;
use crate::smaa::{EdgeDetectionMode, SmaaEffect, SmaaPreset};

/// Every asset the configured effects will ask for.
pub fn asset_requests(config: &LumenConfig) -> AssetLoader {
    let mut loader = AssetLoader::new();
    let mut uses_smaa = false;
    for effect in config.passes.iter().flat_map(|p| &p.effects) {
        match effect.kind.as_str() {
            "texture" => {
                if let Some(path) = effect.param_str("path") {
                    loader = loader.add(path, path);
                }
            }
            "smaa" => uses_smaa = true,
            _ => {}
        }
    }
    if uses_smaa {
        if let Some(dir) = &config.smaa.lookup_dir {
            loader = loader.with_smaa_lookup(Path::new(dir));
        }
    }
    loader
}

fn blend_mode(config: &EffectConfig) -> LumenResult<BlendMode> {
    let function = match &config.blend {
        Some(id) => BlendFunction::resolve(id)?,
        None => BlendFunction::Normal,
    };
    Ok(BlendMode::new(function, config.opacity))
}

fn parse_param<T: FromStr<Err = LumenError>>(config: &EffectConfig, name: &str, fallback: &str) -> LumenResult<T> {
    config.param_str(name).unwrap_or(fallback).parse()
}

/// Build one effect. Initial uniform values are committed before returning.
pub fn build_effect(config: &EffectConfig, smaa: &SmaaConfig, bundle: &AssetBundle) -> LumenResult<Effect> {
    let blend = blend_mode(config)?;
    let effect = match config.kind.as_str() {
        "color_overlay" => {
            let hex = config.param_str("color").ok_or_else(|| {
                LumenError::Config("color_overlay needs a 'color' parameter".into())
            })?;
            let color = Color::from_hex(hex)
                .map_err(|e| LumenError::Config(format!("color_overlay: {e} '{hex}'")))?;
            Effect::fusable(ColorOverlayEffect::new(color, blend))
        }
        "texture" => {
            let path = config.param_str("path").ok_or_else(|| {
                LumenError::Config("texture needs a 'path' parameter".into())
            })?;
            let effect = TextureEffect::new(bundle.require(path, "texture")?, blend);
            let identity = UvTransform::identity();
            effect.set_uv_transform(&UvTransform {
                offset: config.param_vec2("offset")?.unwrap_or(identity.offset),
                repeat: config.param_vec2("repeat")?.unwrap_or(identity.repeat),
                rotation: config.param_f32("rotation").unwrap_or(identity.rotation),
                center: config.param_vec2("center")?.unwrap_or(identity.center),
            })?;
            Effect::fusable(effect)
        }
        "brightness_contrast" => Effect::fusable(
            BrightnessContrastEffect::new(
                config.param_f32("brightness").unwrap_or(0.0),
                config.param_f32("contrast").unwrap_or(0.0),
            )
            .with_blend(blend),
        ),
        "vignette" => Effect::fusable(
            VignetteEffect::new(
                config.param_f32("offset").unwrap_or(1.0),
                config.param_f32("darkness").unwrap_or(0.5),
            )
            .with_blend(blend),
        ),
        "depth" => Effect::fusable(DepthEffect::new(
            config.param_bool("inverted").unwrap_or(false),
            blend,
        )),
        "smaa" => {
            // per-effect keys override the [smaa] section
            let merged = SmaaConfig {
                preset: parse_param::<SmaaPreset>(config, "preset", &smaa.preset)?.to_string(),
                edge_detection: parse_param::<EdgeDetectionMode>(config, "edge_detection", &smaa.edge_detection)?
                    .to_string(),
                threshold: config.param_f32("threshold").or(smaa.threshold),
                lookup_dir: smaa.lookup_dir.clone(),
            };
            Effect::multi_pass(SmaaEffect::from_config(&merged, bundle)?)
        }
        other => {
            return Err(LumenError::Config(format!("unknown effect kind '{other}'")));
        }
    };
    effect.uniforms().commit();
    Ok(effect)
}

/// Build every configured pass in order. The first failure aborts.
pub fn build_passes(config: &LumenConfig, bundle: &AssetBundle) -> LumenResult<Vec<EffectPass>> {
    config
        .passes
        .iter()
        .enumerate()
        .map(|(index, pass)| {
            let effects = pass
                .effects
                .iter()
                .map(|e| build_effect(e, &config.smaa, bundle))
                .collect::<LumenResult<Vec<_>>>()?;
            let built = EffectPass::new(effects)?;
            tracing::debug!(
                index,
                name = pass.name.as_deref().unwrap_or(built.name()),
                "configured pass"
            );
            Ok(built)
        })
        .collect()
}
