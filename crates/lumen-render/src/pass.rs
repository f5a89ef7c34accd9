//! EffectPass: one fused program plus the effects that contributed to it.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use rayon::prelude::*;

use lumen_core::{BlendMode, LumenError, LumenResult, Surface};
use lumen_fx::{EffectDescriptor, FusedProgram, InputBuffer, ProgramId, OPACITY_UNIFORM};

use crate::effect::{Effect, Fragment, FragmentEffect, FrameContext, MultiPassEffect};
use crate::uniforms::UniformValues;

/// Linked programs shared by id. Building the same effect group twice links
/// once.
#[derive(Default)]
pub struct ProgramCache {
    programs: DashMap<ProgramId, Arc<FusedProgram>>,
}

static GLOBAL_CACHE: OnceLock<ProgramCache> = OnceLock::new();

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`EffectPass::new`].
    pub fn global() -> &'static ProgramCache {
        GLOBAL_CACHE.get_or_init(ProgramCache::new)
    }

    /// Fuse `descriptors` and return the linked program, linking only on a miss.
    pub fn compile(&self, descriptors: &[EffectDescriptor]) -> LumenResult<Arc<FusedProgram>> {
        let program = lumen_fx::fuse(descriptors)?;
        if let Some(hit) = self.programs.get(&program.id()) {
            tracing::trace!(program = %program.id(), "program cache hit");
            return Ok(hit.clone());
        }
        lumen_fx::link(&program)?;
        let program = Arc::new(program);
        self.programs.insert(program.id(), program.clone());
        Ok(program)
    }

    pub fn contains(&self, id: &ProgramId) -> bool {
        self.programs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// A fragment effect bound to its stage in the fused program.
#[derive(Clone)]
pub struct BoundStage {
    pub index: usize,
    pub effect: Arc<dyn FragmentEffect>,
    pub blend: lumen_core::BlendFunction,
}

pub struct EffectPass {
    name: String,
    effects: Vec<Effect>,
    program: Arc<FusedProgram>,
    chain: Option<Arc<dyn MultiPassEffect>>,
    stages: Vec<BoundStage>,
}

impl EffectPass {
    /// Fuse and link `effects`. Errors surface here, never at execute time.
    pub fn new(effects: Vec<Effect>) -> LumenResult<Self> {
        Self::with_cache(effects, ProgramCache::global())
    }

    pub fn with_cache(effects: Vec<Effect>, cache: &ProgramCache) -> LumenResult<Self> {
        let descriptors: Vec<EffectDescriptor> = effects.iter().map(Effect::describe).collect();
        let program = cache.compile(&descriptors)?;

        let mut chain = None;
        let mut stages = Vec::new();
        for (index, effect) in effects.iter().enumerate() {
            match effect {
                // identical chains were deduplicated by fusion; the first one runs
                Effect::MultiPass(e) if chain.is_none() => chain = Some(e.clone()),
                Effect::MultiPass(_) => {}
                Effect::Fusable(e) => stages.push(BoundStage {
                    index,
                    effect: e.clone(),
                    blend: e.fragment().blend.function,
                }),
            }
        }

        let name = program.label().to_string();
        tracing::info!(
            pass = %name,
            program = %program.id(),
            stages = stages.len(),
            dedicated = chain.is_some(),
            "built effect pass"
        );
        Ok(Self {
            name,
            effects,
            program,
            chain,
            stages,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn program(&self) -> &FusedProgram {
        &self.program
    }

    pub fn program_id(&self) -> ProgramId {
        self.program.id()
    }

    pub fn chain(&self) -> Option<&Arc<dyn MultiPassEffect>> {
        self.chain.as_ref()
    }

    pub fn stages(&self) -> &[BoundStage] {
        &self.stages
    }

    /// Publish pending uniform writes of every effect.
    pub fn commit_uniforms(&self) {
        for effect in &self.effects {
            effect.uniforms().commit();
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        for effect in &self.effects {
            if let Effect::MultiPass(e) = effect {
                e.resize(width, height);
            }
        }
    }

    /// Fail when the frame lacks a buffer the program reads.
    pub fn check_inputs(&self, ctx: &FrameContext<'_>) -> LumenResult<()> {
        let required = self.program.required_inputs();
        if required.contains(&InputBuffer::Depth) && ctx.depth.is_none() {
            return Err(LumenError::Render(format!(
                "pass '{}' reads the depth buffer but the frame has none",
                self.name
            )));
        }
        if required.contains(&InputBuffer::Velocity) && ctx.velocity.is_none() {
            return Err(LumenError::Render(format!(
                "pass '{}' reads the velocity buffer but the frame has none",
                self.name
            )));
        }
        Ok(())
    }

    /// Current uniform block of the fused program, laid out for upload.
    pub fn pack_uniforms(&self) -> Vec<u8> {
        let snapshots: Vec<(usize, Arc<UniformValues>)> = self
            .stages
            .iter()
            .map(|s| (s.index, s.effect.uniforms().snapshot()))
            .collect();
        self.program.uniforms().pack(|field| {
            snapshots
                .iter()
                .find(|(index, _)| *index == field.stage)
                .and_then(|(_, values)| values.get(&field.local))
        })
    }

    /// Texture bound to a slot of the fused program.
    pub fn texture_for(&self, stage: usize, local: &str) -> LumenResult<Arc<Surface>> {
        self.stages
            .iter()
            .find(|s| s.index == stage)
            .and_then(|s| {
                s.effect
                    .textures()
                    .into_iter()
                    .find(|(name, _)| name == local)
                    .map(|(_, surface)| surface)
            })
            .ok_or_else(|| LumenError::missing_asset(local, self.name.as_str()))
    }

    /// Run the pass on the CPU: the hoisted chain first, then the fused
    /// program over every pixel.
    pub fn execute(&self, input: &Surface, output: &mut Surface, ctx: &FrameContext<'_>) -> LumenResult<()> {
        if !input.same_size(output) {
            return Err(LumenError::InvalidArgument(format!(
                "pass '{}': output is {:?}, input is {:?}",
                self.name,
                output.size(),
                input.size()
            )));
        }
        self.check_inputs(ctx)?;

        let source: Cow<'_, Surface> = match &self.chain {
            Some(chain) => {
                let mut chained = Surface::new(input.width, input.height);
                chain.run(input, &mut chained, ctx)?;
                Cow::Owned(chained)
            }
            None => Cow::Borrowed(input),
        };

        if self.stages.is_empty() || input.width == 0 || input.height == 0 {
            output.data.copy_from_slice(&source.data);
            return Ok(());
        }

        let bound: Vec<(&BoundStage, Arc<UniformValues>)> = self
            .stages
            .iter()
            .map(|s| (s, s.effect.uniforms().snapshot()))
            .collect();
        let source: &Surface = &source;
        let width = source.width as usize;

        output
            .data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.iter_mut().enumerate() {
                    let fragment = Fragment::new(x as u32, y as u32, source, ctx);
                    let mut acc = source.at(x as u32, y as u32);
                    for (stage, values) in &bound {
                        let color = stage.effect.shade(acc, &fragment, values);
                        if stage.blend.contributes() {
                            let mode = BlendMode::new(stage.blend, values.f32(OPACITY_UNIFORM));
                            acc = mode.apply_rgba(acc, color);
                        }
                    }
                    *texel = acc;
                }
            });
        Ok(())
    }
}

impl std::fmt::Debug for EffectPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectPass")
            .field("name", &self.name)
            .field("program", &self.program.id())
            .field("effects", &self.effects)
            .finish()
    }
}
