use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LumenError, LumenResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    pub backend: String, // "cpu" | "gpu"
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: "cpu".to_string(),
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmaaConfig {
    pub preset: String,         // "low" | "medium" | "high" | "ultra"
    pub edge_detection: String, // "luma" | "color" | "depth"
    pub threshold: Option<f32>,
    /// Directory holding `smaa-search.png` and `smaa-area.png`. Generated when absent.
    pub lookup_dir: Option<String>,
}

impl Default for SmaaConfig {
    fn default() -> Self {
        Self {
            preset: "high".to_string(),
            edge_detection: "luma".to_string(),
            threshold: None,
            lookup_dir: None,
        }
    }
}

/// One effect in a pass. Effect-specific parameters are kept as raw TOML values.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EffectConfig {
    pub kind: String,
    #[serde(default)]
    pub blend: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(flatten)]
    pub params: BTreeMap<String, toml::Value>,
}

fn default_opacity() -> f32 {
    1.0
}

impl EffectConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            blend: None,
            opacity: 1.0,
            params: BTreeMap::new(),
        }
    }

    pub fn param_f32(&self, name: &str) -> Option<f32> {
        match self.params.get(name)? {
            toml::Value::Float(v) => Some(*v as f32),
            toml::Value::Integer(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.params.get(name)?.as_str()
    }

    pub fn param_bool(&self, name: &str) -> Option<bool> {
        self.params.get(name)?.as_bool()
    }

    /// A two-element numeric array such as `offset = [0.5, 0.0]`.
    pub fn param_vec2(&self, name: &str) -> LumenResult<Option<[f32; 2]>> {
        let Some(value) = self.params.get(name) else {
            return Ok(None);
        };
        let numbers: Option<Vec<f32>> = value.as_array().map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
                .map(|v| v as f32)
                .collect()
        });
        match numbers.as_deref() {
            Some([x, y]) => Ok(Some([*x, *y])),
            _ => Err(LumenError::Config(format!(
                "effect '{}': parameter '{}' must be a two-element number array",
                self.kind, name
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PassConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "effect")]
    pub effects: Vec<EffectConfig>,
}

/// Pipeline configuration, usually read from `lumen.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LumenConfig {
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub smaa: SmaaConfig,
    #[serde(default, rename = "pass")]
    pub passes: Vec<PassConfig>,
}

impl LumenConfig {
    pub fn from_toml_str(contents: &str) -> LumenResult<Self> {
        toml::from_str(contents).map_err(|e| LumenError::Config(e.to_string()))
    }

    pub fn load_from_file(path: &Path) -> LumenResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: &Path) -> LumenResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| LumenError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
