//! The output of fusion.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use lumen_core::hash::{hash_source, ContentHash};
use lumen_core::LumenResult;

use crate::descriptor::{InputBuffer, PassChain};
use crate::ir::{Binding, FusedStage, FusionIr, TextureSlot};
use crate::layout::UniformLayout;

/// Identity of a fused program. Derived from the generated source, so it
/// changes only when the effect set or a shader body changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ProgramId(ContentHash);

impl ProgramId {
    pub fn of_source(source: &str) -> Self {
        Self(hash_source(source))
    }

    pub fn hash(&self) -> &ContentHash {
        &self.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.short())
    }
}

#[derive(Debug, Clone)]
pub struct FusedProgram {
    id: ProgramId,
    label: String,
    source: String,
    ir: FusionIr,
}

#[derive(Serialize)]
struct ProgramMetadata<'a> {
    id: String,
    label: &'a str,
    inputs: &'a BTreeSet<InputBuffer>,
    dedicated_chain: Option<&'a PassChain>,
    stages: &'a [FusedStage],
    uniform_size: u32,
    uniforms: &'a UniformLayout,
    bindings: Vec<Binding>,
}

impl FusedProgram {
    pub fn new(label: impl Into<String>, source: String, ir: FusionIr) -> Self {
        Self {
            id: ProgramId::of_source(&source),
            label: label.into(),
            source,
            ir,
        }
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ir(&self) -> &FusionIr {
        &self.ir
    }

    pub fn stages(&self) -> &[FusedStage] {
        &self.ir.stages
    }

    pub fn uniforms(&self) -> &UniformLayout {
        &self.ir.uniforms
    }

    pub fn textures(&self) -> &[TextureSlot] {
        &self.ir.textures
    }

    pub fn chain(&self) -> Option<&PassChain> {
        self.ir.chain.as_ref().map(|h| &h.chain)
    }

    /// Inputs of the fused module plus those of the hoisted chain.
    pub fn required_inputs(&self) -> BTreeSet<InputBuffer> {
        let mut inputs = self.ir.inputs.clone();
        if let Some(chain) = self.chain() {
            inputs.extend(chain.inputs());
        }
        inputs
    }

    /// Binding table and layout as pretty JSON, for tooling.
    pub fn metadata_json(&self) -> LumenResult<String> {
        let meta = ProgramMetadata {
            id: self.id.hash().to_hex(),
            label: &self.label,
            inputs: &self.ir.inputs,
            dedicated_chain: self.chain(),
            stages: &self.ir.stages,
            uniform_size: self.ir.uniforms.size(),
            uniforms: &self.ir.uniforms,
            bindings: self.ir.bindings(),
        };
        Ok(serde_json::to_string_pretty(&meta)?)
    }
}
