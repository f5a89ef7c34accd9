//! Merging an ordered group of effects into one program.

use std::collections::BTreeMap;

use lumen_core::{LumenError, LumenResult};

use crate::codegen::{Codegen, RESERVED_SYMBOLS};
use crate::descriptor::{EffectDescriptor, EffectShape, FragmentSpec, PassChain};
use crate::ir::{FusedStage, FusionIr, HoistedChain, TextureSlot};
use crate::lexer::{rename_identifiers, top_level_declarations, Lexer, SourceScope};
use crate::program::FusedProgram;

/// Prefix owning every symbol of the effect at `index`.
pub fn stage_prefix(index: usize) -> String {
    format!("e{index}_")
}

/// Fuse `effects`, in order, into one program.
///
/// Dedicated chains must lead the group and must all be the same chain;
/// fragment effects are folded over the input color in list order.
pub fn fuse(effects: &[EffectDescriptor]) -> LumenResult<FusedProgram> {
    if effects.is_empty() {
        return Err(LumenError::InvalidArgument(
            "cannot fuse an empty effect group".into(),
        ));
    }

    let mut ir = FusionIr::default();
    for (index, effect) in effects.iter().enumerate() {
        match &effect.shape {
            EffectShape::MultiPass(chain) => hoist_chain(&mut ir, &effect.name, chain)?,
            EffectShape::Fusable(spec) => {
                let stage = namespace_stage(&mut ir, index, &effect.name, spec)?;
                ir.inputs.extend(spec.inputs.iter().copied());
                ir.stages.push(stage);
            }
        }
    }

    let source = Codegen::new().generate(&ir)?;
    let label = effects
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join("+");
    let program = FusedProgram::new(label, source, ir);
    tracing::debug!(
        program = %program.id(),
        label = program.label(),
        stages = program.stages().len(),
        uniform_bytes = program.uniforms().size(),
        "fused effect group"
    );
    Ok(program)
}

fn hoist_chain(ir: &mut FusionIr, effect: &str, chain: &PassChain) -> LumenResult<()> {
    if let Some(first) = ir.stages.first() {
        return Err(LumenError::incompatible(
            effect,
            format!(
                "dedicated chain '{}' must run before fragment effect '{}'; move it to the head of the group",
                chain.id, first.effect
            ),
        ));
    }
    match &mut ir.chain {
        None => {
            ir.chain = Some(HoistedChain {
                chain: chain.clone(),
                effects: vec![effect.to_string()],
            });
            Ok(())
        }
        Some(hoisted) if hoisted.chain == *chain => {
            hoisted.effects.push(effect.to_string());
            Ok(())
        }
        Some(hoisted) => Err(LumenError::incompatible(
            effect,
            format!(
                "dedicated chain '{}' conflicts with chain '{}' of '{}'",
                chain.id,
                hoisted.chain.id,
                hoisted.effects.join(", ")
            ),
        )),
    }
}

fn namespace_stage(
    ir: &mut FusionIr,
    index: usize,
    effect: &str,
    spec: &FragmentSpec,
) -> LumenResult<FusedStage> {
    spec.validate(effect)?;
    let prefix = stage_prefix(index);
    let mut renames = BTreeMap::new();

    for uniform in spec.runtime_uniforms() {
        let symbol = format!("{prefix}{}", uniform.name);
        renames.insert(uniform.name.clone(), format!("effects.{symbol}"));
        ir.uniforms.push(index, &uniform.name, symbol, uniform.ty());
    }
    for texture in &spec.textures {
        let symbol = format!("{prefix}{texture}");
        renames.insert(texture.clone(), symbol.clone());
        ir.textures.push(TextureSlot {
            stage: index,
            local: texture.clone(),
            symbol,
        });
    }

    let tokens = Lexer::new(&spec.declarations).tokenize()?;
    for decl in top_level_declarations(&tokens) {
        if renames.contains_key(&decl.name) {
            return Err(LumenError::InvalidArgument(format!(
                "effect '{effect}': '{}' is declared both as a resource and at module scope",
                decl.name
            )));
        }
        renames.insert(decl.name.clone(), format!("{prefix}{}", decl.name));
    }
    if let Some(reserved) = renames
        .keys()
        .find(|name| RESERVED_SYMBOLS.contains(&name.as_str()))
    {
        return Err(LumenError::InvalidArgument(format!(
            "effect '{effect}': '{reserved}' is a reserved program symbol"
        )));
    }

    Ok(FusedStage {
        effect: effect.to_string(),
        index,
        entry: format!("{prefix}main_image"),
        declarations: rename_identifiers(&spec.declarations, SourceScope::Module, &renames)?,
        body: rename_identifiers(&spec.body, SourceScope::Function, &renames)?,
        prefix,
        blend: spec.blend.function,
    })
}
