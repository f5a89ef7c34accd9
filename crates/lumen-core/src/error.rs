/// Core error types for the Lumen composer.
use std::path::PathBuf;

/// A specialized Result type for Lumen operations.
pub type LumenResult<T> = Result<T, LumenError>;

/// Top-level error type encompassing all Lumen subsystems.
///
/// Setup-time variants (`UnsupportedBlendFunction`, `IncompatibleDedicatedPass`,
/// `ProgramLink`, `MissingAsset`) abort pipeline construction. `ContextLost`
/// is the only frame-time error that forces a full re-initialization.
#[derive(Debug, thiserror::Error)]
pub enum LumenError {
    #[error("unsupported blend function: '{0}'")]
    UnsupportedBlendFunction(String),

    #[error("effect '{effect}' cannot share a fused program: {reason}")]
    IncompatibleDedicatedPass { effect: String, reason: String },

    #[error("program link error in '{program}': {message}")]
    ProgramLink { program: String, message: String },

    #[error("missing asset '{name}' required by '{required_by}'")]
    MissingAsset { name: String, required_by: String },

    #[error("asset error: {message} ({path:?})")]
    Asset { message: String, path: PathBuf },

    #[error("rendering context lost: {0}")]
    ContextLost(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl LumenError {
    /// Create a dedicated-pass conflict error.
    pub fn incompatible(effect: impl Into<String>, reason: impl Into<String>) -> Self {
        LumenError::IncompatibleDedicatedPass {
            effect: effect.into(),
            reason: reason.into(),
        }
    }

    /// Create a program link error.
    pub fn program_link(program: impl Into<String>, message: impl Into<String>) -> Self {
        LumenError::ProgramLink {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create a missing asset error.
    pub fn missing_asset(name: impl Into<String>, required_by: impl Into<String>) -> Self {
        LumenError::MissingAsset {
            name: name.into(),
            required_by: required_by.into(),
        }
    }

    /// Create an asset error.
    pub fn asset(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        LumenError::Asset {
            message: message.into(),
            path: path.into(),
        }
    }

    /// True for errors that invalidate the whole pipeline rather than one frame.
    pub fn requires_reinitialization(&self) -> bool {
        matches!(self, LumenError::ContextLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatible_error_display() {
        let err = LumenError::incompatible("smaa", "conflicting pass chain 'bloom'");
        assert_eq!(
            err.to_string(),
            "effect 'smaa' cannot share a fused program: conflicting pass chain 'bloom'"
        );
    }

    #[test]
    fn test_missing_asset_display() {
        let err = LumenError::missing_asset("smaa-area", "smaa");
        assert!(err.to_string().contains("smaa-area"));
        assert!(!err.requires_reinitialization());
    }

    #[test]
    fn test_context_lost_requires_reinit() {
        assert!(LumenError::ContextLost("device removed".into()).requires_reinitialization());
    }
}
