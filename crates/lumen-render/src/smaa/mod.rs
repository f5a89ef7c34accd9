//! SMAA-style antialiasing as a dedicated three-stage chain:
//! edge detection, blending-weight calculation and neighborhood blending.

pub mod blend;
pub mod edges;
pub mod lookup;
pub mod shaders;
pub mod weights;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use lumen_core::{LumenError, LumenResult, SmaaConfig, Surface};
use lumen_fx::{InputBuffer, PassChain, SubPassSpec, UniformDecl, UniformValue};

use crate::assets::AssetBundle;
use crate::effect::{FrameContext, GpuStage, MultiPassEffect, StageTexture};
use crate::uniforms::Uniforms;

pub use lookup::{SmaaLookup, AREA_ASSET, SEARCH_ASSET, STRAIGHT_EDGE_COVERAGE};

/// Depth edges use a tenth of the color threshold.
pub const DEPTH_THRESHOLD_SCALE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmaaPreset {
    Low,
    Medium,
    #[default]
    High,
    Ultra,
}

/// Quality parameters selected by a preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmaaSettings {
    pub threshold: f32,
    pub max_search_steps: u32,
    /// `None` disables corner detection.
    pub corner_rounding: Option<f32>,
}

impl SmaaSettings {
    /// Each search step covers two texels.
    pub fn max_search_distance(&self) -> u32 {
        self.max_search_steps * 2
    }
}

impl SmaaPreset {
    pub fn settings(self) -> SmaaSettings {
        match self {
            SmaaPreset::Low => SmaaSettings {
                threshold: 0.15,
                max_search_steps: 4,
                corner_rounding: None,
            },
            SmaaPreset::Medium => SmaaSettings {
                threshold: 0.1,
                max_search_steps: 8,
                corner_rounding: None,
            },
            SmaaPreset::High => SmaaSettings {
                threshold: 0.1,
                max_search_steps: 16,
                corner_rounding: Some(0.25),
            },
            SmaaPreset::Ultra => SmaaSettings {
                threshold: 0.05,
                max_search_steps: 32,
                corner_rounding: Some(0.25),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SmaaPreset::Low => "low",
            SmaaPreset::Medium => "medium",
            SmaaPreset::High => "high",
            SmaaPreset::Ultra => "ultra",
        }
    }
}

impl FromStr for SmaaPreset {
    type Err = LumenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(SmaaPreset::Low),
            "medium" => Ok(SmaaPreset::Medium),
            "high" => Ok(SmaaPreset::High),
            "ultra" => Ok(SmaaPreset::Ultra),
            other => Err(LumenError::Config(format!("unknown SMAA preset '{other}'"))),
        }
    }
}

impl fmt::Display for SmaaPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the edge detection stage compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDetectionMode {
    #[default]
    Luma,
    Color,
    Depth,
}

impl EdgeDetectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeDetectionMode::Luma => "luma",
            EdgeDetectionMode::Color => "color",
            EdgeDetectionMode::Depth => "depth",
        }
    }

    /// Mode selector passed to the edge detection shader.
    pub fn shader_index(self) -> f32 {
        match self {
            EdgeDetectionMode::Luma => 0.0,
            EdgeDetectionMode::Color => 1.0,
            EdgeDetectionMode::Depth => 2.0,
        }
    }

    pub fn input(self) -> InputBuffer {
        match self {
            EdgeDetectionMode::Depth => InputBuffer::Depth,
            _ => InputBuffer::Color,
        }
    }
}

impl FromStr for EdgeDetectionMode {
    type Err = LumenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "luma" => Ok(EdgeDetectionMode::Luma),
            "color" => Ok(EdgeDetectionMode::Color),
            "depth" => Ok(EdgeDetectionMode::Depth),
            other => Err(LumenError::Config(format!("unknown edge detection mode '{other}'"))),
        }
    }
}

impl fmt::Display for EdgeDetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one SMAA run. Stages only ever advance in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaaStage {
    EdgeDetection,
    BlendingWeights,
    NeighborhoodBlending,
    Blended,
}

impl SmaaStage {
    pub fn next(self) -> SmaaStage {
        match self {
            SmaaStage::EdgeDetection => SmaaStage::BlendingWeights,
            SmaaStage::BlendingWeights => SmaaStage::NeighborhoodBlending,
            SmaaStage::NeighborhoodBlending | SmaaStage::Blended => SmaaStage::Blended,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SmaaStage::EdgeDetection => "smaa-edges",
            SmaaStage::BlendingWeights => "smaa-weights",
            SmaaStage::NeighborhoodBlending => "smaa-blend",
            SmaaStage::Blended => "smaa-done",
        }
    }
}

#[derive(Debug)]
struct Targets {
    edges: Surface,
    weights: Surface,
}

impl Targets {
    fn new(width: u32, height: u32) -> Self {
        Self {
            edges: Surface::new(width, height),
            weights: Surface::new(width, height),
        }
    }
}

#[derive(Debug)]
pub struct SmaaEffect {
    name: String,
    preset: SmaaPreset,
    mode: EdgeDetectionMode,
    lookup: Arc<SmaaLookup>,
    lookup_surfaces: OnceLock<(Arc<Surface>, Arc<Surface>)>,
    uniforms: Uniforms,
    targets: Mutex<Option<Targets>>,
}

impl SmaaEffect {
    /// An SMAA effect using the process-wide generated lookup tables.
    pub fn new(preset: SmaaPreset, mode: EdgeDetectionMode) -> Self {
        Self::with_lookup(preset, mode, SmaaLookup::shared())
    }

    pub fn with_lookup(preset: SmaaPreset, mode: EdgeDetectionMode, lookup: Arc<SmaaLookup>) -> Self {
        let threshold = preset.settings().threshold;
        Self {
            name: "smaa".to_string(),
            preset,
            mode,
            lookup,
            lookup_surfaces: OnceLock::new(),
            uniforms: Uniforms::new([UniformDecl::new("threshold", UniformValue::F32(threshold))]),
            targets: Mutex::new(None),
        }
    }

    /// Build from lookup tables loaded by the asset loader.
    pub fn from_assets(bundle: &AssetBundle, preset: SmaaPreset, mode: EdgeDetectionMode) -> LumenResult<Self> {
        let search = bundle.require(SEARCH_ASSET, "smaa")?;
        let area = bundle.require(AREA_ASSET, "smaa")?;
        let lookup = SmaaLookup::from_surfaces(&search, &area)?;
        Ok(Self::with_lookup(preset, mode, Arc::new(lookup)))
    }

    /// Build from the `[smaa]` config section. Loaded tables win over the
    /// generated ones when the bundle has them.
    pub fn from_config(config: &SmaaConfig, bundle: &AssetBundle) -> LumenResult<Self> {
        let preset: SmaaPreset = config.preset.parse()?;
        let mode: EdgeDetectionMode = config.edge_detection.parse()?;
        let effect = if config.lookup_dir.is_some() {
            Self::from_assets(bundle, preset, mode)?
        } else {
            Self::new(preset, mode)
        };
        if let Some(threshold) = config.threshold {
            effect.set_threshold(threshold)?;
            effect.uniforms.commit();
        }
        Ok(effect)
    }

    pub fn preset(&self) -> SmaaPreset {
        self.preset
    }

    pub fn mode(&self) -> EdgeDetectionMode {
        self.mode
    }

    pub fn settings(&self) -> SmaaSettings {
        self.preset.settings()
    }

    pub fn lookup(&self) -> &Arc<SmaaLookup> {
        &self.lookup
    }

    /// Edge threshold in color units; depth mode scales it down.
    pub fn set_threshold(&self, threshold: f32) -> LumenResult<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(LumenError::InvalidArgument(format!(
                "SMAA threshold must be in [0, 1], got {threshold}"
            )));
        }
        self.uniforms.set("threshold", UniformValue::F32(threshold))
    }

    fn effective_threshold(&self) -> f32 {
        let threshold = self.uniforms.snapshot().f32("threshold");
        match self.mode {
            EdgeDetectionMode::Depth => threshold * DEPTH_THRESHOLD_SCALE,
            _ => threshold,
        }
    }

    fn edge_source<'a>(&self, input: &'a Surface, ctx: &FrameContext<'a>) -> LumenResult<&'a Surface> {
        match self.mode {
            EdgeDetectionMode::Depth => ctx.depth.ok_or_else(|| {
                LumenError::Render("SMAA depth edge detection needs a depth buffer".into())
            }),
            _ => Ok(input),
        }
    }

    fn stage_source(stage: SmaaStage) -> LumenResult<String> {
        shaders::source(stage)
            .map(str::to_string)
            .ok_or_else(|| LumenError::Render(format!("no shader for stage '{}'", stage.label())))
    }
}

impl MultiPassEffect for SmaaEffect {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain(&self) -> PassChain {
        PassChain::new(
            "smaa",
            vec![
                SubPassSpec::new(format!("smaa-edges-{}", self.mode)).with_input(self.mode.input()),
                SubPassSpec::new(format!("smaa-weights-{}", self.preset)),
                SubPassSpec::new("smaa-blend").with_input(InputBuffer::Color),
            ],
        )
    }

    fn uniforms(&self) -> &Uniforms {
        &self.uniforms
    }

    fn run(&self, input: &Surface, output: &mut Surface, ctx: &FrameContext<'_>) -> LumenResult<()> {
        if !input.same_size(output) {
            return Err(LumenError::InvalidArgument(format!(
                "SMAA output is {:?}, input is {:?}",
                output.size(),
                input.size()
            )));
        }
        let source = self.edge_source(input, ctx)?;
        if !source.same_size(input) {
            return Err(LumenError::InvalidArgument(format!(
                "SMAA depth buffer is {:?}, color is {:?}",
                source.size(),
                input.size()
            )));
        }
        let threshold = self.effective_threshold();
        let settings = self.settings();

        let mut guard = self.targets.lock();
        if guard.as_ref().is_some_and(|t| !t.edges.same_size(input)) {
            *guard = None;
        }
        let targets = guard.get_or_insert_with(|| Targets::new(input.width, input.height));

        let mut stage = SmaaStage::EdgeDetection;
        while stage != SmaaStage::Blended {
            match stage {
                SmaaStage::EdgeDetection => edges::detect(source, self.mode, threshold, &mut targets.edges),
                SmaaStage::BlendingWeights => {
                    weights::compute(&targets.edges, &self.lookup, &settings, &mut targets.weights)
                }
                SmaaStage::NeighborhoodBlending => blend::blend(input, &targets.weights, output),
                SmaaStage::Blended => {}
            }
            tracing::trace!(stage = stage.label(), "smaa stage complete");
            stage = stage.next();
        }
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) {
        *self.targets.lock() = Some(Targets::new(width, height));
    }

    fn gpu_stages(&self, ctx: &FrameContext<'_>) -> LumenResult<Vec<GpuStage>> {
        let edge_texture = match self.mode {
            EdgeDetectionMode::Depth if ctx.depth.is_none() => {
                return Err(LumenError::Render(
                    "SMAA depth edge detection needs a depth buffer".into(),
                ))
            }
            EdgeDetectionMode::Depth => StageTexture::Depth,
            _ => StageTexture::Input,
        };
        let (search, area) = self.lookup_surfaces.get_or_init(|| {
            let (search, area) = self.lookup.to_surfaces();
            (Arc::new(search), Arc::new(area))
        });
        let settings = self.settings();

        Ok(vec![
            GpuStage {
                name: SmaaStage::EdgeDetection.label().to_string(),
                source: Self::stage_source(SmaaStage::EdgeDetection)?,
                textures: vec![edge_texture],
                params: [
                    self.effective_threshold(),
                    edges::LOCAL_CONTRAST_FACTOR,
                    self.mode.shader_index(),
                    0.0,
                ],
            },
            GpuStage {
                name: SmaaStage::BlendingWeights.label().to_string(),
                source: Self::stage_source(SmaaStage::BlendingWeights)?,
                textures: vec![
                    StageTexture::Stage(0),
                    StageTexture::Lookup(search.clone()),
                    StageTexture::Lookup(area.clone()),
                ],
                params: [
                    settings.max_search_distance() as f32,
                    settings.corner_rounding.unwrap_or(0.0),
                    settings.corner_rounding.is_some() as u8 as f32,
                    0.0,
                ],
            },
            GpuStage {
                name: SmaaStage::NeighborhoodBlending.label().to_string(),
                source: Self::stage_source(SmaaStage::NeighborhoodBlending)?,
                textures: vec![StageTexture::Input, StageTexture::Stage(1)],
                params: [0.0; 4],
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(width: u32, height: u32, at: u32) -> Surface {
        Surface::from_fn(width, height, |x, _| {
            if x < at {
                [0.0, 0.0, 0.0, 1.0]
            } else {
                [1.0; 4]
            }
        })
    }

    #[test]
    fn test_preset_table() {
        assert_eq!(SmaaPreset::Low.settings().max_search_distance(), 8);
        assert_eq!(SmaaPreset::Medium.settings().max_search_distance(), 16);
        assert_eq!(SmaaPreset::High.settings().max_search_distance(), 32);
        assert_eq!(SmaaPreset::Ultra.settings().max_search_distance(), 64);
        assert_eq!(SmaaPreset::Ultra.settings().threshold, 0.05);
        assert!(SmaaPreset::Medium.settings().corner_rounding.is_none());
        assert_eq!("ULTRA".parse::<SmaaPreset>().unwrap(), SmaaPreset::Ultra);
        assert!("extreme".parse::<SmaaPreset>().is_err());
    }

    #[test]
    fn test_stages_advance_in_order() {
        let mut stage = SmaaStage::EdgeDetection;
        let mut seen = Vec::new();
        while stage != SmaaStage::Blended {
            seen.push(stage.label());
            stage = stage.next();
        }
        assert_eq!(seen, ["smaa-edges", "smaa-weights", "smaa-blend"]);
        assert_eq!(SmaaStage::Blended.next(), SmaaStage::Blended);
    }

    #[test]
    fn test_straight_edge_is_softened_on_both_sides() {
        let input = split(8, 8, 4);
        let mut output = Surface::new(8, 8);
        let smaa = SmaaEffect::new(SmaaPreset::High, EdgeDetectionMode::Luma);
        smaa.run(&input, &mut output, &FrameContext::default()).unwrap();

        for y in 0..8 {
            let dark = output.at(3, y)[0];
            let bright = output.at(4, y)[0];
            assert!((dark - STRAIGHT_EDGE_COVERAGE).abs() < 0.01, "row {y}: {dark}");
            assert!((bright - (1.0 - STRAIGHT_EDGE_COVERAGE)).abs() < 0.01, "row {y}: {bright}");
            assert_eq!(output.at(0, y), input.at(0, y));
            assert_eq!(output.at(7, y), input.at(7, y));
        }
    }

    #[test]
    fn test_high_threshold_leaves_image_untouched() {
        let input = Surface::from_fn(6, 6, |x, _| {
            let v = if x < 3 { 0.4 } else { 0.5 };
            [v, v, v, 1.0]
        });
        let mut output = Surface::new(6, 6);
        let smaa = SmaaEffect::new(SmaaPreset::Medium, EdgeDetectionMode::Luma);
        smaa.set_threshold(0.5).unwrap();
        smaa.uniforms().commit();
        smaa.run(&input, &mut output, &FrameContext::default()).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_flat_image_is_identity_at_low_threshold() {
        let input = Surface::filled(12, 9, [0.3, 0.6, 0.2, 1.0]);
        let mut output = Surface::new(12, 9);
        let smaa = SmaaEffect::new(SmaaPreset::Ultra, EdgeDetectionMode::Color);
        smaa.set_threshold(0.01).unwrap();
        smaa.uniforms().commit();
        smaa.run(&input, &mut output, &FrameContext::default()).unwrap();

        let targets = smaa.targets.lock();
        let targets = targets.as_ref().unwrap();
        assert!(targets.edges.data.iter().flatten().all(|c| *c == 0.0));
        assert!(targets.weights.data.iter().flatten().all(|c| *c == 0.0));
        assert_eq!(output, input);
    }

    #[test]
    fn test_depth_mode_requires_depth() {
        let smaa = SmaaEffect::new(SmaaPreset::Low, EdgeDetectionMode::Depth);
        let input = Surface::new(4, 4);
        let mut output = Surface::new(4, 4);
        let err = smaa.run(&input, &mut output, &FrameContext::default()).unwrap_err();
        assert!(matches!(err, LumenError::Render(_)));
        assert!(smaa.gpu_stages(&FrameContext::default()).is_err());
        assert!(smaa.chain().inputs().contains(&InputBuffer::Depth));
    }

    #[test]
    fn test_depth_mode_finds_depth_edges() {
        let input = Surface::filled(6, 4, [0.5, 0.5, 0.5, 1.0]);
        let depth = Surface::from_fn(6, 4, |x, _| [if x < 3 { 0.1 } else { 0.9 }, 0.0, 0.0, 1.0]);
        let ctx = FrameContext {
            depth: Some(&depth),
            ..FrameContext::default()
        };
        let mut output = Surface::new(6, 4);
        let smaa = SmaaEffect::new(SmaaPreset::High, EdgeDetectionMode::Depth);
        smaa.run(&input, &mut output, &ctx).unwrap();
        // flat color: blending along depth edges cannot change it
        assert!(output.max_abs_diff(&input) < 1e-6);
        let guard = smaa.targets.lock();
        let edges = &guard.as_ref().unwrap().edges;
        assert_eq!(edges.at(3, 1)[0], 1.0);
    }

    #[test]
    fn test_gpu_stage_layout() {
        let smaa = SmaaEffect::new(SmaaPreset::Ultra, EdgeDetectionMode::Color);
        let stages = smaa.gpu_stages(&FrameContext::default()).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].params[0], 0.05);
        assert_eq!(stages[0].params[2], 1.0);
        assert_eq!(stages[1].params[0], 64.0);
        assert_eq!(stages[1].textures.len(), 3);
        assert!(matches!(stages[2].textures[1], StageTexture::Stage(1)));
    }

    #[test]
    fn test_targets_follow_resize() {
        let smaa = SmaaEffect::new(SmaaPreset::Low, EdgeDetectionMode::Luma);
        smaa.resize(3, 2);
        assert_eq!(smaa.targets.lock().as_ref().unwrap().edges.size(), (3, 2));
        let input = Surface::new(5, 5);
        let mut output = Surface::new(5, 5);
        smaa.run(&input, &mut output, &FrameContext::default()).unwrap();
        assert_eq!(smaa.targets.lock().as_ref().unwrap().weights.size(), (5, 5));
    }
}
