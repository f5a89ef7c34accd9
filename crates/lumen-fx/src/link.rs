//! Program linking: parse and validate WGSL with naga before any backend
//! sees it.

use lumen_core::{LumenError, LumenResult};

use crate::codegen::{FRAGMENT_ENTRY, VERTEX_ENTRY};
use crate::program::FusedProgram;

/// Parse and validate a WGSL module, mapping failures to `ProgramLink`.
pub fn validate_wgsl(label: &str, source: &str) -> LumenResult<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| LumenError::program_link(label, e.emit_to_string(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| LumenError::program_link(label, format!("{e:?}")))?;

    Ok(module)
}

/// Require an entry point of the given stage.
pub fn require_entry_point(
    label: &str,
    module: &naga::Module,
    name: &str,
    stage: naga::ShaderStage,
) -> LumenResult<()> {
    if module
        .entry_points
        .iter()
        .any(|ep| ep.name == name && ep.stage == stage)
    {
        Ok(())
    } else {
        Err(LumenError::program_link(
            label,
            format!("missing {stage:?} entry point '{name}'"),
        ))
    }
}

/// Validate a full-screen module: it must parse, validate and expose both
/// `vs_main` and `fs_main`.
pub fn link_source(label: &str, source: &str) -> LumenResult<naga::Module> {
    let module = validate_wgsl(label, source)?;
    require_entry_point(label, &module, VERTEX_ENTRY, naga::ShaderStage::Vertex)?;
    require_entry_point(label, &module, FRAGMENT_ENTRY, naga::ShaderStage::Fragment)?;
    Ok(module)
}

/// Link a fused program. Returns the validated module.
pub fn link(program: &FusedProgram) -> LumenResult<naga::Module> {
    let module = link_source(program.label(), program.source())?;
    tracing::debug!(program = %program.id(), label = program.label(), "linked fused program");
    Ok(module)
}
