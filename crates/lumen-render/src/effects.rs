//! Shipped fragment effects. Each one carries its WGSL fragment and a CPU
//! kernel that computes the same `main_image`.

use std::sync::Arc;

use lumen_core::{BlendMode, Color, LumenResult, Surface, UvTransform, Wrap};
use lumen_fx::{FragmentSpec, InputBuffer, UniformValue, OPACITY_UNIFORM};

use crate::effect::{Fragment, FragmentEffect};
use crate::uniforms::{UniformValues, Uniforms};

fn uniforms_for(spec: &FragmentSpec) -> Uniforms {
    Uniforms::new(spec.runtime_uniforms())
}

/// Stage a new opacity. SKIP effects have no opacity uniform and ignore it.
fn set_opacity(uniforms: &Uniforms, opacity: f32) -> LumenResult<()> {
    if !uniforms.has(OPACITY_UNIFORM) {
        return Ok(());
    }
    uniforms.set(OPACITY_UNIFORM, UniformValue::F32(opacity.clamp(0.0, 1.0)))
}

fn rgb(c: [f32; 3], a: f32) -> [f32; 4] {
    [c[0], c[1], c[2], a]
}

/// A constant color layered over the input.
pub struct ColorOverlayEffect {
    spec: FragmentSpec,
    uniforms: Uniforms,
}

impl ColorOverlayEffect {
    pub fn new(color: Color, blend: impl Into<BlendMode>) -> Self {
        let spec = FragmentSpec::new("    return color;")
            .with_uniform("color", UniformValue::Vec4(color.to_array()))
            .with_blend(blend);
        Self {
            uniforms: uniforms_for(&spec),
            spec,
        }
    }

    pub fn set_color(&self, color: Color) -> LumenResult<()> {
        self.uniforms.set("color", UniformValue::Vec4(color.to_array()))
    }

    pub fn set_opacity(&self, opacity: f32) -> LumenResult<()> {
        set_opacity(&self.uniforms, opacity)
    }
}

impl FragmentEffect for ColorOverlayEffect {
    fn name(&self) -> &str {
        "color_overlay"
    }

    fn fragment(&self) -> &FragmentSpec {
        &self.spec
    }

    fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    fn shade(&self, _input: [f32; 4], _fragment: &Fragment<'_>, values: &UniformValues) -> [f32; 4] {
        values.vec4("color")
    }
}

/// An image layered over the input through a UV transform.
///
/// The transform is a uniform, so moving, scaling or rotating the texture
/// never changes the fused program.
pub struct TextureEffect {
    spec: FragmentSpec,
    uniforms: Uniforms,
    texture: Arc<Surface>,
}

const TEXTURE_BODY: &str = "    let t = (uv_transform * vec3<f32>(uv, 1.0)).xy;
    return textureSampleLevel(map, texture_sampler, t, 0.0);";

impl TextureEffect {
    pub fn new(texture: Arc<Surface>, blend: impl Into<BlendMode>) -> Self {
        let spec = FragmentSpec::new(TEXTURE_BODY)
            .with_texture("map")
            .with_uniform(
                "uv_transform",
                UniformValue::Mat3(UvTransform::identity().matrix()),
            )
            .with_blend(blend);
        Self {
            uniforms: uniforms_for(&spec),
            spec,
            texture,
        }
    }

    pub fn set_uv_transform(&self, transform: &UvTransform) -> LumenResult<()> {
        self.uniforms
            .set("uv_transform", UniformValue::Mat3(transform.matrix()))
    }

    pub fn set_opacity(&self, opacity: f32) -> LumenResult<()> {
        set_opacity(&self.uniforms, opacity)
    }

    pub fn texture(&self) -> &Arc<Surface> {
        &self.texture
    }
}

impl FragmentEffect for TextureEffect {
    fn name(&self) -> &str {
        "texture"
    }

    fn fragment(&self) -> &FragmentSpec {
        &self.spec
    }

    fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    fn shade(&self, _input: [f32; 4], fragment: &Fragment<'_>, values: &UniformValues) -> [f32; 4] {
        let uv = values.mat3("uv_transform").transform_point(fragment.uv);
        self.texture.sample(uv, Wrap::Repeat)
    }

    fn textures(&self) -> Vec<(String, Arc<Surface>)> {
        vec![("map".to_string(), self.texture.clone())]
    }
}

/// Brightness offset and contrast stretch around mid-grey.
pub struct BrightnessContrastEffect {
    spec: FragmentSpec,
    uniforms: Uniforms,
}

const BRIGHTNESS_CONTRAST_BODY: &str = "    var c = input_color.rgb + vec3<f32>(brightness);
    if (contrast > 0.0) {
        c = (c - vec3<f32>(0.5)) / (1.0 - contrast) + vec3<f32>(0.5);
    } else if (contrast < 0.0) {
        c = (c - vec3<f32>(0.5)) * (1.0 + contrast) + vec3<f32>(0.5);
    }
    return vec4<f32>(c, input_color.a);";

/// Contrast is kept inside (-1, 1) so the stretch stays finite.
const MAX_CONTRAST: f32 = 0.99;

impl BrightnessContrastEffect {
    pub fn new(brightness: f32, contrast: f32) -> Self {
        let spec = FragmentSpec::new(BRIGHTNESS_CONTRAST_BODY)
            .with_uniform("brightness", UniformValue::F32(brightness.clamp(-1.0, 1.0)))
            .with_uniform(
                "contrast",
                UniformValue::F32(contrast.clamp(-MAX_CONTRAST, MAX_CONTRAST)),
            );
        Self {
            uniforms: uniforms_for(&spec),
            spec,
        }
    }

    pub fn with_blend(mut self, blend: impl Into<BlendMode>) -> Self {
        self.spec = self.spec.with_blend(blend);
        self.uniforms = uniforms_for(&self.spec);
        self
    }

    pub fn set_brightness(&self, brightness: f32) -> LumenResult<()> {
        self.uniforms
            .set("brightness", UniformValue::F32(brightness.clamp(-1.0, 1.0)))
    }

    pub fn set_contrast(&self, contrast: f32) -> LumenResult<()> {
        self.uniforms.set(
            "contrast",
            UniformValue::F32(contrast.clamp(-MAX_CONTRAST, MAX_CONTRAST)),
        )
    }

    pub fn set_opacity(&self, opacity: f32) -> LumenResult<()> {
        set_opacity(&self.uniforms, opacity)
    }
}

impl FragmentEffect for BrightnessContrastEffect {
    fn name(&self) -> &str {
        "brightness_contrast"
    }

    fn fragment(&self) -> &FragmentSpec {
        &self.spec
    }

    fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    fn shade(&self, input: [f32; 4], _fragment: &Fragment<'_>, values: &UniformValues) -> [f32; 4] {
        let brightness = values.f32("brightness");
        let contrast = values.f32("contrast");
        let mut c = [input[0] + brightness, input[1] + brightness, input[2] + brightness];
        for v in &mut c {
            if contrast > 0.0 {
                *v = (*v - 0.5) / (1.0 - contrast) + 0.5;
            } else if contrast < 0.0 {
                *v = (*v - 0.5) * (1.0 + contrast) + 0.5;
            }
        }
        rgb(c, input[3])
    }
}

/// Darkens (or lightens) toward the frame edges.
pub struct VignetteEffect {
    spec: FragmentSpec,
    uniforms: Uniforms,
}

const VIGNETTE_BODY: &str = "    let coord = (uv - vec2<f32>(0.5)) * offset;
    let k = clamp(dot(coord, coord), 0.0, 1.0);
    return vec4<f32>(mix(input_color.rgb, vec3<f32>(1.0 - darkness), k), input_color.a);";

impl VignetteEffect {
    pub fn new(offset: f32, darkness: f32) -> Self {
        let spec = FragmentSpec::new(VIGNETTE_BODY)
            .with_uniform("offset", UniformValue::F32(offset))
            .with_uniform("darkness", UniformValue::F32(darkness));
        Self {
            uniforms: uniforms_for(&spec),
            spec,
        }
    }

    pub fn with_blend(mut self, blend: impl Into<BlendMode>) -> Self {
        self.spec = self.spec.with_blend(blend);
        self.uniforms = uniforms_for(&self.spec);
        self
    }

    pub fn set_darkness(&self, darkness: f32) -> LumenResult<()> {
        self.uniforms.set("darkness", UniformValue::F32(darkness))
    }

    pub fn set_offset(&self, offset: f32) -> LumenResult<()> {
        self.uniforms.set("offset", UniformValue::F32(offset))
    }

    pub fn set_opacity(&self, opacity: f32) -> LumenResult<()> {
        set_opacity(&self.uniforms, opacity)
    }
}

impl Default for VignetteEffect {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl FragmentEffect for VignetteEffect {
    fn name(&self) -> &str {
        "vignette"
    }

    fn fragment(&self) -> &FragmentSpec {
        &self.spec
    }

    fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    fn shade(&self, input: [f32; 4], fragment: &Fragment<'_>, values: &UniformValues) -> [f32; 4] {
        let offset = values.f32("offset");
        let darkness = values.f32("darkness");
        let cx = (fragment.uv[0] - 0.5) * offset;
        let cy = (fragment.uv[1] - 0.5) * offset;
        let k = (cx * cx + cy * cy).clamp(0.0, 1.0);
        let target = 1.0 - darkness;
        rgb(
            [
                input[0] + (target - input[0]) * k,
                input[1] + (target - input[1]) * k,
                input[2] + (target - input[2]) * k,
            ],
            input[3],
        )
    }
}

/// Visualizes the scene depth buffer as grey levels.
pub struct DepthEffect {
    spec: FragmentSpec,
    uniforms: Uniforms,
}

const DEPTH_BODY: &str = "    let d = read_depth(uv);
    let v = mix(d, 1.0 - d, inverted);
    return vec4<f32>(vec3<f32>(v), 1.0);";

impl DepthEffect {
    pub fn new(inverted: bool, blend: impl Into<BlendMode>) -> Self {
        let spec = FragmentSpec::new(DEPTH_BODY)
            .with_input(InputBuffer::Depth)
            .with_uniform("inverted", UniformValue::F32(if inverted { 1.0 } else { 0.0 }))
            .with_blend(blend);
        Self {
            uniforms: uniforms_for(&spec),
            spec,
        }
    }

    pub fn set_opacity(&self, opacity: f32) -> LumenResult<()> {
        set_opacity(&self.uniforms, opacity)
    }
}

impl FragmentEffect for DepthEffect {
    fn name(&self) -> &str {
        "depth"
    }

    fn fragment(&self) -> &FragmentSpec {
        &self.spec
    }

    fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    fn shade(&self, _input: [f32; 4], fragment: &Fragment<'_>, values: &UniformValues) -> [f32; 4] {
        let d = fragment.read_depth(fragment.uv);
        let inverted = values.f32("inverted");
        let v = d + ((1.0 - d) - d) * inverted;
        [v, v, v, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::FrameContext;
    use lumen_core::BlendFunction;

    fn shade_at(effect: &dyn FragmentEffect, input: &Surface, x: u32, y: u32) -> [f32; 4] {
        let ctx = FrameContext::default();
        let frag = Fragment::new(x, y, input, &ctx);
        effect.shade(input.at(x, y), &frag, &effect.uniforms().snapshot())
    }

    #[test]
    fn test_every_fragment_validates() {
        let texture = Arc::new(Surface::new(2, 2));
        let effects: Vec<Box<dyn FragmentEffect>> = vec![
            Box::new(ColorOverlayEffect::new(Color::RED, BlendFunction::Screen)),
            Box::new(TextureEffect::new(texture, BlendFunction::Normal)),
            Box::new(BrightnessContrastEffect::new(0.1, 0.2)),
            Box::new(VignetteEffect::default()),
            Box::new(DepthEffect::new(false, BlendFunction::Skip)),
        ];
        for effect in &effects {
            effect.fragment().validate(effect.name()).unwrap();
        }
    }

    #[test]
    fn test_texture_effect_repeats() {
        let texture = Arc::new(Surface::from_fn(2, 1, |x, _| {
            if x == 0 {
                [1.0, 0.0, 0.0, 1.0]
            } else {
                [0.0, 0.0, 1.0, 1.0]
            }
        }));
        let effect = TextureEffect::new(texture, BlendFunction::Normal);
        let transform = UvTransform {
            offset: [0.5, 0.0],
            ..UvTransform::identity()
        };
        effect.set_uv_transform(&transform).unwrap();
        effect.uniforms().commit();
        let input = Surface::new(2, 1);
        // texel 0 samples u = 0.25 + 0.5, which is the blue texel center
        assert_eq!(shade_at(&effect, &input, 0, 0), [0.0, 0.0, 1.0, 1.0]);
        // texel 1 wraps around to the red texel center
        assert_eq!(shade_at(&effect, &input, 1, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_brightness_contrast_identity() {
        let effect = BrightnessContrastEffect::new(0.0, 0.0);
        let input = Surface::filled(1, 1, [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(shade_at(&effect, &input, 0, 0), [0.2, 0.4, 0.6, 1.0]);
    }

    #[test]
    fn test_vignette_leaves_center_alone() {
        let effect = VignetteEffect::new(1.0, 1.0);
        let input = Surface::filled(3, 3, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(shade_at(&effect, &input, 1, 1), [0.5, 0.5, 0.5, 1.0]);
        assert!(shade_at(&effect, &input, 0, 0)[0] < 0.5);
    }

    #[test]
    fn test_adjustment_effects_stage_opacity() {
        let grade = BrightnessContrastEffect::new(0.1, 0.0)
            .with_blend(BlendMode::new(BlendFunction::Overlay, 1.0));
        grade.set_opacity(0.25).unwrap();
        let vignette = VignetteEffect::default();
        vignette.set_opacity(-0.5).unwrap();

        // nothing lands before the frame boundary
        assert_eq!(grade.uniforms().snapshot().f32(OPACITY_UNIFORM), 1.0);
        grade.uniforms().commit();
        vignette.uniforms().commit();
        assert_eq!(grade.uniforms().snapshot().f32(OPACITY_UNIFORM), 0.25);
        assert_eq!(vignette.uniforms().snapshot().f32(OPACITY_UNIFORM), 0.0);
    }

    #[test]
    fn test_skip_effect_has_no_opacity() {
        let effect = DepthEffect::new(false, BlendFunction::Skip);
        assert!(!effect.uniforms().has(OPACITY_UNIFORM));
        effect.set_opacity(0.5).unwrap();
    }
}
