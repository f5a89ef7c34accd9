//! Fusion intermediate representation.
//!
//! The IR is what fusion decides; code generation only prints it. Keeping the
//! namespacing, binding table and fold order here makes them testable without
//! reading WGSL.

use std::collections::BTreeSet;

use serde::Serialize;

use lumen_core::BlendFunction;

use crate::descriptor::{InputBuffer, PassChain};
use crate::layout::UniformLayout;

/// Bind group holding the pass inputs and frame uniforms.
pub const FRAME_GROUP: u32 = 0;
/// Bind group holding effect uniforms and textures.
pub const EFFECT_GROUP: u32 = 1;

/// One fusable effect after namespacing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedStage {
    pub effect: String,
    /// Position of the effect in the caller's list.
    pub index: usize,
    pub prefix: String,
    /// Name of the generated wrapper function.
    pub entry: String,
    pub declarations: String,
    pub body: String,
    pub blend: BlendFunction,
}

impl FusedStage {
    /// Member of the uniform block holding this stage's opacity.
    pub fn opacity_symbol(&self) -> Option<String> {
        self.blend
            .contributes()
            .then(|| format!("{}{}", self.prefix, crate::descriptor::OPACITY_UNIFORM))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureSlot {
    pub stage: usize,
    pub local: String,
    pub symbol: String,
}

/// A dedicated chain lifted in front of the fused program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoistedChain {
    pub chain: PassChain,
    /// Effects that declared this chain, in list order.
    pub effects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resource {
    InputColor,
    InputSampler,
    FrameUniforms,
    Depth,
    Velocity,
    EffectUniforms,
    TextureSampler,
    /// Index into [`FusionIr::textures`].
    Texture(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub group: u32,
    pub binding: u32,
    pub name: String,
    pub resource: Resource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusionIr {
    /// Union of the fusable effects' inputs.
    pub inputs: BTreeSet<InputBuffer>,
    pub chain: Option<HoistedChain>,
    pub stages: Vec<FusedStage>,
    pub uniforms: UniformLayout,
    pub textures: Vec<TextureSlot>,
}

impl FusionIr {
    pub fn requires(&self, input: InputBuffer) -> bool {
        self.inputs.contains(&input)
    }

    /// Blend functions that need a helper in the generated module.
    pub fn blend_functions(&self) -> BTreeSet<BlendFunction> {
        self.stages
            .iter()
            .map(|s| s.blend)
            .filter(|b| b.contributes())
            .collect()
    }

    /// The complete binding table, numbered in a fixed order.
    pub fn bindings(&self) -> Vec<Binding> {
        fn push(out: &mut Vec<Binding>, group: u32, name: &str, resource: Resource) {
            let binding = out.iter().filter(|b| b.group == group).count() as u32;
            out.push(Binding {
                group,
                binding,
                name: name.to_string(),
                resource,
            });
        }

        let mut out = Vec::new();

        push(&mut out, FRAME_GROUP, "input_buffer", Resource::InputColor);
        push(&mut out, FRAME_GROUP, "input_sampler", Resource::InputSampler);
        push(&mut out, FRAME_GROUP, "frame", Resource::FrameUniforms);
        if self.requires(InputBuffer::Depth) {
            push(&mut out, FRAME_GROUP, "depth_buffer", Resource::Depth);
        }
        if self.requires(InputBuffer::Velocity) {
            push(&mut out, FRAME_GROUP, "velocity_buffer", Resource::Velocity);
        }

        if !self.uniforms.is_empty() {
            push(&mut out, EFFECT_GROUP, "effects", Resource::EffectUniforms);
        }
        if !self.textures.is_empty() {
            push(&mut out, EFFECT_GROUP, "texture_sampler", Resource::TextureSampler);
        }
        for (i, slot) in self.textures.iter().enumerate() {
            push(&mut out, EFFECT_GROUP, &slot.symbol, Resource::Texture(i));
        }
        out
    }

    pub fn has_effect_group(&self) -> bool {
        !self.uniforms.is_empty() || !self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::UniformType;

    #[test]
    fn test_minimal_binding_table() {
        let ir = FusionIr::default();
        let names: Vec<_> = ir.bindings().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["input_buffer", "input_sampler", "frame"]);
        assert!(!ir.has_effect_group());
    }

    #[test]
    fn test_bindings_are_numbered_per_group() {
        let mut ir = FusionIr::default();
        ir.inputs.insert(InputBuffer::Velocity);
        ir.uniforms.push(0, "opacity", "e0_opacity".into(), UniformType::F32);
        ir.textures.push(TextureSlot {
            stage: 0,
            local: "map".into(),
            symbol: "e0_map".into(),
        });
        let bindings = ir.bindings();
        let velocity = bindings.iter().find(|b| b.resource == Resource::Velocity).unwrap();
        assert_eq!((velocity.group, velocity.binding), (0, 3));
        let texture = bindings.iter().find(|b| b.name == "e0_map").unwrap();
        assert_eq!((texture.group, texture.binding), (1, 2));
    }
}
