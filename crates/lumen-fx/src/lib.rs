//! # lumen-fx
//!
//! The shader fusion engine. An ordered group of effect descriptors becomes a
//! single WGSL module: symbols are namespaced per effect, inputs are unioned,
//! and each fragment is folded over the input color with its blend function.

pub mod codegen;
pub mod descriptor;
pub mod fusion;
pub mod ir;
pub mod layout;
pub mod lexer;
pub mod link;
pub mod program;

pub use descriptor::{
    EffectDescriptor, EffectShape, FragmentSpec, InputBuffer, PassChain, SubPassSpec,
    UniformDecl, UniformType, UniformValue, OPACITY_UNIFORM,
};
pub use fusion::fuse;
pub use ir::{Binding, FusionIr, Resource};
pub use layout::{FrameUniforms, UniformLayout};
pub use link::{link, link_source, validate_wgsl};
pub use program::{FusedProgram, ProgramId};

/// Fuse and link in one step.
pub fn compile(effects: &[EffectDescriptor]) -> lumen_core::LumenResult<FusedProgram> {
    let program = fuse(effects)?;
    link(&program)?;
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{BlendFunction, BlendMode};

    #[test]
    fn test_compile_vignette_over_overlay() {
        let overlay = EffectDescriptor::fusable(
            "overlay",
            FragmentSpec::new("    return color;")
                .with_uniform("color", UniformValue::Vec4([1.0, 0.0, 0.0, 1.0]))
                .with_blend(BlendMode::new(BlendFunction::Overlay, 0.5)),
        );
        let vignette = EffectDescriptor::fusable(
            "vignette",
            FragmentSpec::new(
                "    let d = distance(uv, vec2<f32>(0.5)) * offset;\n    return vec4<f32>(input_color.rgb * (1.0 - d * darkness), 1.0);",
            )
            .with_uniform("offset", UniformValue::F32(1.0))
            .with_uniform("darkness", UniformValue::F32(1.0)),
        );

        let program = compile(&[overlay, vignette]).expect("compilation failed");
        assert!(program.source().contains("fn blend_overlay("));
        assert!(program.source().contains("effects.e1_darkness"));
        assert_eq!(program.uniforms().fields().len(), 5);
    }
}
