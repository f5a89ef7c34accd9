//! Effect descriptors: the immutable input of fusion.
//!
//! An effect is either a fusable fragment (WGSL snippet + blend rule) or a
//! dedicated multi-pass chain that runs in front of the fused program.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use lumen_core::{BlendFunction, BlendMode, LumenError, LumenResult, Mat3};

/// Name of the per-effect opacity uniform added by fusion.
pub const OPACITY_UNIFORM: &str = "opacity";

/// Buffers a fragment may read besides the accumulated color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputBuffer {
    /// Arbitrary reads of the input color buffer via `sample_input(uv)`.
    Color,
    /// `read_depth(uv)`.
    Depth,
    /// `read_velocity(uv)`.
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformType {
    F32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
}

impl UniformType {
    pub fn wgsl(self) -> &'static str {
        match self {
            UniformType::F32 => "f32",
            UniformType::Vec2 => "vec2<f32>",
            UniformType::Vec3 => "vec3<f32>",
            UniformType::Vec4 => "vec4<f32>",
            UniformType::Mat3 => "mat3x3<f32>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    F32(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3(Mat3),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::F32(_) => UniformType::F32,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat3(_) => UniformType::Mat3,
        }
    }
}

/// A named uniform with its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformDecl {
    pub name: String,
    pub default: UniformValue,
}

impl UniformDecl {
    pub fn new(name: impl Into<String>, default: UniformValue) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }

    pub fn ty(&self) -> UniformType {
        self.default.ty()
    }
}

/// Shader-side description of a fusable effect.
///
/// `body` is the body of `fn main_image(input_color: vec4<f32>, uv: vec2<f32>) -> vec4<f32>`.
/// `declarations` holds top-level helper functions, constants and structs.
/// Uniforms and textures are referenced by their plain names; fusion
/// namespaces every one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpec {
    pub inputs: BTreeSet<InputBuffer>,
    pub uniforms: Vec<UniformDecl>,
    pub textures: Vec<String>,
    pub declarations: String,
    pub body: String,
    pub blend: BlendMode,
}

impl FragmentSpec {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            inputs: BTreeSet::new(),
            uniforms: Vec::new(),
            textures: Vec::new(),
            declarations: String::new(),
            body: body.into(),
            blend: BlendMode::default(),
        }
    }

    pub fn with_input(mut self, input: InputBuffer) -> Self {
        self.inputs.insert(input);
        self
    }

    pub fn with_uniform(mut self, name: impl Into<String>, default: UniformValue) -> Self {
        self.uniforms.push(UniformDecl::new(name, default));
        self
    }

    pub fn with_texture(mut self, name: impl Into<String>) -> Self {
        self.textures.push(name.into());
        self
    }

    pub fn with_declarations(mut self, declarations: impl Into<String>) -> Self {
        self.declarations = declarations.into();
        self
    }

    pub fn with_blend(mut self, blend: impl Into<BlendMode>) -> Self {
        self.blend = blend.into();
        self
    }

    /// Every uniform the effect owns at runtime, including the implicit
    /// opacity of contributing effects.
    pub fn runtime_uniforms(&self) -> Vec<UniformDecl> {
        let mut all = Vec::with_capacity(self.uniforms.len() + 1);
        if self.blend.function.contributes() {
            all.push(UniformDecl::new(
                OPACITY_UNIFORM,
                UniformValue::F32(self.blend.opacity),
            ));
        }
        all.extend(self.uniforms.iter().cloned());
        all
    }

    /// Reject declarations fusion cannot namespace.
    pub fn validate(&self, effect: &str) -> LumenResult<()> {
        let mut seen = BTreeSet::new();
        let names = self
            .uniforms
            .iter()
            .map(|u| u.name.as_str())
            .chain(self.textures.iter().map(String::as_str));
        for name in names {
            if name == OPACITY_UNIFORM {
                return Err(LumenError::InvalidArgument(format!(
                    "effect '{effect}': '{OPACITY_UNIFORM}' is reserved for the blend opacity"
                )));
            }
            if !is_identifier(name) {
                return Err(LumenError::InvalidArgument(format!(
                    "effect '{effect}': '{name}' is not a valid identifier"
                )));
            }
            if !seen.insert(name) {
                return Err(LumenError::InvalidArgument(format!(
                    "effect '{effect}': '{name}' is declared twice"
                )));
            }
        }
        if !self.body.contains("return") {
            return Err(LumenError::InvalidArgument(format!(
                "effect '{effect}': main_image body never returns a color"
            )));
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One stage of a dedicated pass chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPassSpec {
    pub name: String,
    pub inputs: BTreeSet<InputBuffer>,
}

impl SubPassSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: BTreeSet::new(),
        }
    }

    pub fn with_input(mut self, input: InputBuffer) -> Self {
        self.inputs.insert(input);
        self
    }
}

/// An ordered chain of dedicated sub-passes. Two chains are compatible only when equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassChain {
    pub id: String,
    pub stages: Vec<SubPassSpec>,
}

impl PassChain {
    pub fn new(id: impl Into<String>, stages: Vec<SubPassSpec>) -> Self {
        Self {
            id: id.into(),
            stages,
        }
    }

    pub fn inputs(&self) -> BTreeSet<InputBuffer> {
        self.stages
            .iter()
            .flat_map(|s| s.inputs.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EffectShape {
    Fusable(FragmentSpec),
    MultiPass(PassChain),
}

/// What an effect tells the fusion engine about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    pub name: String,
    pub shape: EffectShape,
}

impl EffectDescriptor {
    pub fn fusable(name: impl Into<String>, spec: FragmentSpec) -> Self {
        Self {
            name: name.into(),
            shape: EffectShape::Fusable(spec),
        }
    }

    pub fn multi_pass(name: impl Into<String>, chain: PassChain) -> Self {
        Self {
            name: name.into(),
            shape: EffectShape::MultiPass(chain),
        }
    }

    pub fn required_inputs(&self) -> BTreeSet<InputBuffer> {
        match &self.shape {
            EffectShape::Fusable(spec) => spec.inputs.clone(),
            EffectShape::MultiPass(chain) => chain.inputs(),
        }
    }

    /// The blend function, `None` for multi-pass effects.
    pub fn blend_function(&self) -> Option<BlendFunction> {
        match &self.shape {
            EffectShape::Fusable(spec) => Some(spec.blend.function),
            EffectShape::MultiPass(_) => None,
        }
    }

    pub fn dedicated_passes(&self) -> &[SubPassSpec] {
        match &self.shape {
            EffectShape::Fusable(_) => &[],
            EffectShape::MultiPass(chain) => &chain.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_uniforms_prepend_opacity() {
        let spec = FragmentSpec::new("return input_color;")
            .with_uniform("tint", UniformValue::Vec3([1.0, 0.5, 0.0]))
            .with_blend(BlendMode::new(BlendFunction::Screen, 0.4));
        let uniforms = spec.runtime_uniforms();
        assert_eq!(uniforms[0].name, OPACITY_UNIFORM);
        assert_eq!(uniforms[0].default, UniformValue::F32(0.4));
        assert_eq!(uniforms[1].ty(), UniformType::Vec3);
    }

    #[test]
    fn test_skip_effects_have_no_opacity() {
        let spec = FragmentSpec::new("return input_color;").with_blend(BlendFunction::Skip);
        assert!(spec.runtime_uniforms().is_empty());
    }

    #[test]
    fn test_validate_rejects_reserved_and_duplicate_names() {
        let reserved = FragmentSpec::new("return input_color;")
            .with_uniform("opacity", UniformValue::F32(1.0));
        assert!(reserved.validate("fx").is_err());

        let duplicate = FragmentSpec::new("return input_color;")
            .with_uniform("map", UniformValue::F32(1.0))
            .with_texture("map");
        assert!(duplicate.validate("fx").is_err());

        let bad_name = FragmentSpec::new("return input_color;").with_texture("2d");
        assert!(bad_name.validate("fx").is_err());
    }

    #[test]
    fn test_chain_inputs_are_unioned() {
        let chain = PassChain::new(
            "smaa",
            vec![
                SubPassSpec::new("edges").with_input(InputBuffer::Depth),
                SubPassSpec::new("blend").with_input(InputBuffer::Color),
            ],
        );
        let d = EffectDescriptor::multi_pass("aa", chain);
        assert_eq!(d.required_inputs().len(), 2);
        assert_eq!(d.dedicated_passes().len(), 2);
        assert!(d.blend_function().is_none());
    }
}
