//! The effect model: fusable fragments and dedicated multi-pass chains.

use std::sync::Arc;

use lumen_core::{LumenError, LumenResult, Surface, Wrap};
use lumen_fx::{EffectDescriptor, FragmentSpec, PassChain};

use crate::uniforms::{UniformValues, Uniforms};

/// Per-frame inputs shared by every pass of one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameContext<'a> {
    pub time: f32,
    pub frame_index: u32,
    pub depth: Option<&'a Surface>,
    pub velocity: Option<&'a Surface>,
}

/// What a fragment kernel sees for one pixel. Mirrors the helpers the fused
/// WGSL module exposes to effect bodies.
pub struct Fragment<'a> {
    pub x: u32,
    pub y: u32,
    pub uv: [f32; 2],
    pub resolution: [f32; 2],
    pub time: f32,
    pub frame_index: u32,
    input: &'a Surface,
    depth: Option<&'a Surface>,
    velocity: Option<&'a Surface>,
}

impl<'a> Fragment<'a> {
    pub fn new(x: u32, y: u32, input: &'a Surface, ctx: &FrameContext<'a>) -> Self {
        let (w, h) = (input.width.max(1) as f32, input.height.max(1) as f32);
        Self {
            x,
            y,
            uv: [(x as f32 + 0.5) / w, (y as f32 + 0.5) / h],
            resolution: [w, h],
            time: ctx.time,
            frame_index: ctx.frame_index,
            input,
            depth: ctx.depth,
            velocity: ctx.velocity,
        }
    }

    /// Bilinear, clamp-to-edge read of the pass input.
    pub fn sample_input(&self, uv: [f32; 2]) -> [f32; 4] {
        self.input.sample(uv, Wrap::Clamp)
    }

    pub fn read_depth(&self, uv: [f32; 2]) -> f32 {
        self.depth.map_or(0.0, |d| load_at_uv(d, uv)[0])
    }

    pub fn read_velocity(&self, uv: [f32; 2]) -> [f32; 2] {
        self.velocity.map_or([0.0; 2], |v| {
            let t = load_at_uv(v, uv);
            [t[0], t[1]]
        })
    }
}

fn load_at_uv(surface: &Surface, uv: [f32; 2]) -> [f32; 4] {
    let x = (uv[0] * surface.width as f32) as i64;
    let y = (uv[1] * surface.height as f32) as i64;
    surface.fetch(x, y)
}

/// A single-pass effect whose shader logic can be fused with others.
pub trait FragmentEffect: Send + Sync {
    fn name(&self) -> &str;

    fn fragment(&self) -> &FragmentSpec;

    fn uniforms(&self) -> &Uniforms;

    /// CPU evaluation of the fragment's `main_image`.
    fn shade(&self, input_color: [f32; 4], fragment: &Fragment<'_>, values: &UniformValues) -> [f32; 4];

    /// Textures bound under the names declared in [`FragmentEffect::fragment`].
    fn textures(&self) -> Vec<(String, Arc<Surface>)> {
        Vec::new()
    }

    fn describe(&self) -> EffectDescriptor {
        EffectDescriptor::fusable(self.name(), self.fragment().clone())
    }
}

/// A texture consumed by one stage of a dedicated chain on the GPU.
#[derive(Debug, Clone)]
pub enum StageTexture {
    /// The pass input color.
    Input,
    Depth,
    /// Output of an earlier stage of the same chain.
    Stage(usize),
    Lookup(Arc<Surface>),
}

/// One full-screen stage of a dedicated chain. Textures are bound to
/// group 0 in order, followed by a `vec4<f32>` uniform holding `params`.
#[derive(Debug, Clone)]
pub struct GpuStage {
    pub name: String,
    pub source: String,
    pub textures: Vec<StageTexture>,
    pub params: [f32; 4],
}

/// An effect that needs its own ordered sub-passes.
pub trait MultiPassEffect: Send + Sync {
    fn name(&self) -> &str;

    fn chain(&self) -> PassChain;

    fn uniforms(&self) -> &Uniforms;

    /// Run every stage on the CPU, writing the chain result into `output`.
    fn run(&self, input: &Surface, output: &mut Surface, ctx: &FrameContext<'_>) -> LumenResult<()>;

    /// Reallocate intermediate targets for a new frame size.
    fn resize(&self, width: u32, height: u32);

    /// The stages as GPU programs, in execution order.
    fn gpu_stages(&self, _ctx: &FrameContext<'_>) -> LumenResult<Vec<GpuStage>> {
        Err(LumenError::Render(format!(
            "effect '{}' has no GPU implementation",
            self.name()
        )))
    }

    fn describe(&self) -> EffectDescriptor {
        EffectDescriptor::multi_pass(self.name(), self.chain())
    }
}

/// An effect as handed to an [`crate::EffectPass`].
#[derive(Clone)]
pub enum Effect {
    Fusable(Arc<dyn FragmentEffect>),
    MultiPass(Arc<dyn MultiPassEffect>),
}

impl Effect {
    pub fn fusable(effect: impl FragmentEffect + 'static) -> Self {
        Effect::Fusable(Arc::new(effect))
    }

    pub fn multi_pass(effect: impl MultiPassEffect + 'static) -> Self {
        Effect::MultiPass(Arc::new(effect))
    }

    pub fn name(&self) -> &str {
        match self {
            Effect::Fusable(e) => e.name(),
            Effect::MultiPass(e) => e.name(),
        }
    }

    pub fn describe(&self) -> EffectDescriptor {
        match self {
            Effect::Fusable(e) => e.describe(),
            Effect::MultiPass(e) => e.describe(),
        }
    }

    pub fn uniforms(&self) -> &Uniforms {
        match self {
            Effect::Fusable(e) => e.uniforms(),
            Effect::MultiPass(e) => e.uniforms(),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Fusable(e) => write!(f, "Fusable({})", e.name()),
            Effect::MultiPass(e) => write!(f, "MultiPass({})", e.name()),
        }
    }
}

impl From<Arc<dyn FragmentEffect>> for Effect {
    fn from(effect: Arc<dyn FragmentEffect>) -> Self {
        Effect::Fusable(effect)
    }
}

impl From<Arc<dyn MultiPassEffect>> for Effect {
    fn from(effect: Arc<dyn MultiPassEffect>) -> Self {
        Effect::MultiPass(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_uv_is_texel_center() {
        let input = Surface::new(4, 2);
        let ctx = FrameContext::default();
        let frag = Fragment::new(1, 1, &input, &ctx);
        assert_eq!(frag.uv, [0.375, 0.75]);
        assert_eq!(frag.resolution, [4.0, 2.0]);
    }

    #[test]
    fn test_read_depth_matches_texel() {
        let input = Surface::new(2, 2);
        let depth = Surface::from_fn(2, 2, |x, y| [(x + 2 * y) as f32 * 0.25, 0.0, 0.0, 1.0]);
        let ctx = FrameContext {
            depth: Some(&depth),
            ..FrameContext::default()
        };
        let frag = Fragment::new(1, 1, &input, &ctx);
        assert_eq!(frag.read_depth(frag.uv), 0.75);
        assert_eq!(frag.read_depth([2.0, 2.0]), 0.75);
        assert_eq!(frag.read_velocity(frag.uv), [0.0, 0.0]);
    }
}
