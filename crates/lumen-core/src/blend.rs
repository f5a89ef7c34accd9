//! Blend function registry.
//!
//! Every blend function is a per-channel formula `f(base, contribution)`
//! over values in `[0, 1]`. A [`BlendMode`] pairs one with an opacity and
//! folds a contribution into the accumulated color:
//!
//! ```text
//! k   = opacity * contribution.a
//! rgb = lerp(base.rgb, f(base.rgb, contribution.rgb), k)
//! a   = base.a + (1 - base.a) * k
//! ```
//!
//! `Skip` has no formula: effects using it are evaluated but never folded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Color, LumenError, LumenResult};

/// Per-channel blend formula.
pub type BlendFormula = fn(f32, f32) -> f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlendFunction {
    Skip,
    Normal,
    Add,
    AddSmooth,
    Average,
    ColorBurn,
    ColorDodge,
    Darken,
    Divide,
    Difference,
    Exclusion,
    HardLight,
    Lighten,
    LinearBurn,
    LinearLight,
    Multiply,
    Negation,
    Overlay,
    PinLight,
    Reflect,
    Screen,
    SoftLight,
    Subtract,
    VividLight,
}

impl BlendFunction {
    pub const ALL: [BlendFunction; 24] = [
        BlendFunction::Skip,
        BlendFunction::Normal,
        BlendFunction::Add,
        BlendFunction::AddSmooth,
        BlendFunction::Average,
        BlendFunction::ColorBurn,
        BlendFunction::ColorDodge,
        BlendFunction::Darken,
        BlendFunction::Divide,
        BlendFunction::Difference,
        BlendFunction::Exclusion,
        BlendFunction::HardLight,
        BlendFunction::Lighten,
        BlendFunction::LinearBurn,
        BlendFunction::LinearLight,
        BlendFunction::Multiply,
        BlendFunction::Negation,
        BlendFunction::Overlay,
        BlendFunction::PinLight,
        BlendFunction::Reflect,
        BlendFunction::Screen,
        BlendFunction::SoftLight,
        BlendFunction::Subtract,
        BlendFunction::VividLight,
    ];

    /// Look up a blend function by identifier (`"COLOR_DODGE"`, `"color-dodge"`, ...).
    pub fn resolve(id: &str) -> LumenResult<BlendFunction> {
        let normalized = id.trim().replace('-', "_").to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| LumenError::UnsupportedBlendFunction(id.to_string()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlendFunction::Skip => "SKIP",
            BlendFunction::Normal => "NORMAL",
            BlendFunction::Add => "ADD",
            BlendFunction::AddSmooth => "ADD_SMOOTH",
            BlendFunction::Average => "AVERAGE",
            BlendFunction::ColorBurn => "COLOR_BURN",
            BlendFunction::ColorDodge => "COLOR_DODGE",
            BlendFunction::Darken => "DARKEN",
            BlendFunction::Divide => "DIVIDE",
            BlendFunction::Difference => "DIFFERENCE",
            BlendFunction::Exclusion => "EXCLUSION",
            BlendFunction::HardLight => "HARD_LIGHT",
            BlendFunction::Lighten => "LIGHTEN",
            BlendFunction::LinearBurn => "LINEAR_BURN",
            BlendFunction::LinearLight => "LINEAR_LIGHT",
            BlendFunction::Multiply => "MULTIPLY",
            BlendFunction::Negation => "NEGATION",
            BlendFunction::Overlay => "OVERLAY",
            BlendFunction::PinLight => "PIN_LIGHT",
            BlendFunction::Reflect => "REFLECT",
            BlendFunction::Screen => "SCREEN",
            BlendFunction::SoftLight => "SOFT_LIGHT",
            BlendFunction::Subtract => "SUBTRACT",
            BlendFunction::VividLight => "VIVID_LIGHT",
        }
    }

    /// The per-channel formula, or `None` for `Skip`.
    pub fn formula(self) -> Option<BlendFormula> {
        let f: BlendFormula = match self {
            BlendFunction::Skip => return None,
            BlendFunction::Normal => |_, y| y,
            BlendFunction::Add => |x, y| (x + y).min(1.0),
            BlendFunction::AddSmooth => |x, y| (x + y) / (1.0 + x * y),
            BlendFunction::Average => |x, y| (x + y) * 0.5,
            BlendFunction::ColorBurn => color_burn,
            BlendFunction::ColorDodge => color_dodge,
            BlendFunction::Darken => f32::min,
            BlendFunction::Divide => |x, y| {
                if y <= 0.0 {
                    if x > 0.0 {
                        1.0
                    } else {
                        0.0
                    }
                } else {
                    (x / y).min(1.0)
                }
            },
            BlendFunction::Difference => |x, y| (x - y).abs(),
            BlendFunction::Exclusion => |x, y| x + y - 2.0 * x * y,
            BlendFunction::HardLight => |x, y| overlay(y, x),
            BlendFunction::Lighten => f32::max,
            BlendFunction::LinearBurn => |x, y| (x + y - 1.0).max(0.0),
            BlendFunction::LinearLight => |x, y| (x + 2.0 * y - 1.0).clamp(0.0, 1.0),
            BlendFunction::Multiply => |x, y| x * y,
            BlendFunction::Negation => |x, y| 1.0 - (1.0 - x - y).abs(),
            BlendFunction::Overlay => overlay,
            BlendFunction::PinLight => |x, y| {
                if y < 0.5 {
                    x.min(2.0 * y)
                } else {
                    x.max(2.0 * y - 1.0)
                }
            },
            BlendFunction::Reflect => |x, y| {
                if y >= 1.0 {
                    1.0
                } else {
                    (x * x / (1.0 - y)).min(1.0)
                }
            },
            BlendFunction::Screen => |x, y| x + y - x * y,
            BlendFunction::SoftLight => |x, y| (1.0 - 2.0 * y) * x * x + 2.0 * y * x,
            BlendFunction::Subtract => |x, y| (x - y).max(0.0),
            BlendFunction::VividLight => |x, y| {
                if y < 0.5 {
                    color_burn(x, 2.0 * y)
                } else {
                    color_dodge(x, 2.0 * (y - 0.5))
                }
            },
        };
        Some(f)
    }

    /// Whether this function participates in the accumulation fold.
    pub fn contributes(self) -> bool {
        self != BlendFunction::Skip
    }

    /// Evaluate the formula on one channel, clamping inputs and result to `[0, 1]`.
    pub fn apply_channel(self, base: f32, contribution: f32) -> Option<f32> {
        let f = self.formula()?;
        Some(f(base.clamp(0.0, 1.0), contribution.clamp(0.0, 1.0)).clamp(0.0, 1.0))
    }

    /// Name of the generated WGSL helper, e.g. `blend_color_dodge`.
    pub fn wgsl_name(self) -> Option<String> {
        self.formula()?;
        Some(format!("blend_{}", self.as_str().to_ascii_lowercase()))
    }

    /// WGSL source implementing the formula as `fn(vec3<f32>, vec3<f32>) -> vec3<f32>`.
    pub fn wgsl_function(self) -> Option<String> {
        let name = self.wgsl_name()?;
        let channel = wgsl_channel_body(self)?;
        Some(format!(
            "fn {name}_channel(x: f32, y: f32) -> f32 {{\n{channel}\n}}\n\n\
             fn {name}(x: vec3<f32>, y: vec3<f32>) -> vec3<f32> {{\n    \
             return vec3<f32>({name}_channel(x.r, y.r), {name}_channel(x.g, y.g), {name}_channel(x.b, y.b));\n}}\n"
        ))
    }
}

fn overlay(x: f32, y: f32) -> f32 {
    if x < 0.5 {
        2.0 * x * y
    } else {
        1.0 - 2.0 * (1.0 - x) * (1.0 - y)
    }
}

fn color_burn(x: f32, y: f32) -> f32 {
    if x >= 1.0 {
        1.0
    } else if y <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - x) / y).max(0.0)
    }
}

fn color_dodge(x: f32, y: f32) -> f32 {
    if y >= 1.0 {
        1.0
    } else {
        (x / (1.0 - y)).min(1.0)
    }
}

fn wgsl_channel_body(function: BlendFunction) -> Option<&'static str> {
    let body = match function {
        BlendFunction::Skip => return None,
        BlendFunction::Normal => "    return y;",
        BlendFunction::Add => "    return min(x + y, 1.0);",
        BlendFunction::AddSmooth => "    return (x + y) / (1.0 + x * y);",
        BlendFunction::Average => "    return (x + y) * 0.5;",
        BlendFunction::ColorBurn => {
            "    if (x >= 1.0) { return 1.0; }\n    if (y <= 0.0) { return 0.0; }\n    return max(1.0 - (1.0 - x) / y, 0.0);"
        }
        BlendFunction::ColorDodge => {
            "    if (y >= 1.0) { return 1.0; }\n    return min(x / (1.0 - y), 1.0);"
        }
        BlendFunction::Darken => "    return min(x, y);",
        BlendFunction::Divide => {
            "    if (y <= 0.0) { return select(0.0, 1.0, x > 0.0); }\n    return min(x / y, 1.0);"
        }
        BlendFunction::Difference => "    return abs(x - y);",
        BlendFunction::Exclusion => "    return x + y - 2.0 * x * y;",
        BlendFunction::HardLight => {
            "    if (y < 0.5) { return 2.0 * x * y; }\n    return 1.0 - 2.0 * (1.0 - x) * (1.0 - y);"
        }
        BlendFunction::Lighten => "    return max(x, y);",
        BlendFunction::LinearBurn => "    return max(x + y - 1.0, 0.0);",
        BlendFunction::LinearLight => "    return clamp(x + 2.0 * y - 1.0, 0.0, 1.0);",
        BlendFunction::Multiply => "    return x * y;",
        BlendFunction::Negation => "    return 1.0 - abs(1.0 - x - y);",
        BlendFunction::Overlay => {
            "    if (x < 0.5) { return 2.0 * x * y; }\n    return 1.0 - 2.0 * (1.0 - x) * (1.0 - y);"
        }
        BlendFunction::PinLight => {
            "    if (y < 0.5) { return min(x, 2.0 * y); }\n    return max(x, 2.0 * y - 1.0);"
        }
        BlendFunction::Reflect => {
            "    if (y >= 1.0) { return 1.0; }\n    return min(x * x / (1.0 - y), 1.0);"
        }
        BlendFunction::Screen => "    return x + y - x * y;",
        BlendFunction::SoftLight => "    return (1.0 - 2.0 * y) * x * x + 2.0 * y * x;",
        BlendFunction::Subtract => "    return max(x - y, 0.0);",
        BlendFunction::VividLight => {
            "    if (y < 0.5) {\n        let b = 2.0 * y;\n        if (x >= 1.0) { return 1.0; }\n        if (b <= 0.0) { return 0.0; }\n        return max(1.0 - (1.0 - x) / b, 0.0);\n    }\n    let d = 2.0 * (y - 0.5);\n    if (d >= 1.0) { return 1.0; }\n    return min(x / (1.0 - d), 1.0);"
        }
    };
    Some(body)
}

impl fmt::Display for BlendFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendFunction {
    type Err = LumenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlendFunction::resolve(s)
    }
}

/// A blend function with its opacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendMode {
    pub function: BlendFunction,
    pub opacity: f32,
}

impl BlendMode {
    pub fn new(function: BlendFunction, opacity: f32) -> Self {
        Self {
            function,
            opacity: opacity.clamp(0.0, 1.0),
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Fold `contribution` into `base`. `Skip` returns `base` unchanged.
    pub fn apply(&self, base: Color, contribution: Color) -> Color {
        Color::from_array(self.apply_rgba(base.to_array(), contribution.to_array()))
    }

    /// Raw-array form of [`BlendMode::apply`], used by the per-pixel kernels.
    pub fn apply_rgba(&self, base: [f32; 4], contribution: [f32; 4]) -> [f32; 4] {
        let Some(f) = self.function.formula() else {
            return base;
        };
        let k = (self.opacity * contribution[3]).clamp(0.0, 1.0);
        let mut out = base;
        for i in 0..3 {
            let blended = f(base[i].clamp(0.0, 1.0), contribution[i].clamp(0.0, 1.0)).clamp(0.0, 1.0);
            out[i] = base[i] + (blended - base[i]) * k;
        }
        out[3] = base[3] + (1.0 - base[3]) * k;
        out
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::new(BlendFunction::Normal, 1.0)
    }
}

impl From<BlendFunction> for BlendMode {
    fn from(function: BlendFunction) -> Self {
        Self::new(function, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_accepts_aliases() {
        assert_eq!(BlendFunction::resolve("COLOR_DODGE").unwrap(), BlendFunction::ColorDodge);
        assert_eq!(BlendFunction::resolve("color-dodge").unwrap(), BlendFunction::ColorDodge);
        assert_eq!(" soft_light ".parse::<BlendFunction>().unwrap(), BlendFunction::SoftLight);
    }

    #[test]
    fn test_resolve_rejects_unknown() {
        let err = BlendFunction::resolve("HUE_SHIFT").unwrap_err();
        assert!(matches!(err, LumenError::UnsupportedBlendFunction(ref id) if id == "HUE_SHIFT"));
    }

    #[test]
    fn test_every_identifier_resolves_to_itself() {
        for f in BlendFunction::ALL {
            assert_eq!(BlendFunction::resolve(f.as_str()).unwrap(), f);
        }
    }

    #[test]
    fn test_skip_has_no_formula_and_never_folds() {
        assert!(BlendFunction::Skip.formula().is_none());
        assert!(BlendFunction::Skip.wgsl_function().is_none());
        let mode = BlendMode::new(BlendFunction::Skip, 1.0);
        assert_eq!(mode.apply(Color::BLUE, Color::RED), Color::BLUE);
    }

    #[test]
    fn test_dodge_and_reflect_saturate_at_full_contribution() {
        assert_eq!(BlendFunction::ColorDodge.apply_channel(0.3, 1.0), Some(1.0));
        assert_eq!(BlendFunction::Reflect.apply_channel(0.0, 1.0), Some(1.0));
        assert_eq!(BlendFunction::Divide.apply_channel(0.0, 0.0), Some(0.0));
        assert_eq!(BlendFunction::ColorBurn.apply_channel(0.5, 0.0), Some(0.0));
    }

    #[test]
    fn test_opacity_lerps_between_base_and_formula() {
        let mode = BlendMode::new(BlendFunction::Normal, 0.25);
        let out = mode.apply(Color::BLACK, Color::WHITE);
        assert!((out.r - 0.25).abs() < 1e-6);
        assert_eq!(out.a, 1.0);
    }

    #[test]
    fn test_subtract_is_order_sensitive() {
        let f = BlendFunction::Subtract.formula().unwrap();
        assert_ne!(f(0.8, 0.3), f(0.3, 0.8));
    }

    #[test]
    fn test_wgsl_helper_names() {
        assert_eq!(BlendFunction::AddSmooth.wgsl_name().as_deref(), Some("blend_add_smooth"));
        let src = BlendFunction::Multiply.wgsl_function().unwrap();
        assert!(src.contains("fn blend_multiply_channel(x: f32, y: f32) -> f32"));
        assert!(src.contains("fn blend_multiply(x: vec3<f32>, y: vec3<f32>) -> vec3<f32>"));
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&BlendFunction::LinearLight).unwrap();
        assert_eq!(json, "\"LINEAR_LIGHT\"");
    }

    proptest! {
        #[test]
        fn prop_formulas_stay_in_unit_range(base in 0.0f32..=1.0, contribution in 0.0f32..=1.0) {
            for function in BlendFunction::ALL.into_iter().filter(|f| f.contributes()) {
                let f = function.formula().unwrap();
                let v = f(base, contribution);
                prop_assert!((-1e-5..=1.0 + 1e-5).contains(&v), "{function} produced {v}");
            }
        }

        #[test]
        fn prop_blend_mode_stays_in_unit_range(
            base in prop::array::uniform4(0.0f32..=1.0),
            contribution in prop::array::uniform4(0.0f32..=1.0),
            opacity in 0.0f32..=1.0,
        ) {
            for function in BlendFunction::ALL {
                let out = BlendMode::new(function, opacity).apply_rgba(base, contribution);
                for v in out {
                    prop_assert!((-1e-5..=1.0 + 1e-5).contains(&v));
                }
            }
        }
    }
}
