//! The composer: ordered effect passes over ping-pong buffers.

use std::sync::Arc;

use lumen_core::{LumenError, LumenResult, Surface};

use crate::effect::FrameContext;
use crate::gpu::GpuRenderer;
use crate::pass::EffectPass;

/// Where passes execute.
#[derive(Clone, Default)]
pub enum Backend {
    #[default]
    Cpu,
    Gpu(Arc<GpuRenderer>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Cpu => f.write_str("Cpu"),
            Backend::Gpu(_) => f.write_str("Gpu"),
        }
    }
}

/// What the scene provides for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    pub color: &'a Surface,
    pub depth: Option<&'a Surface>,
    pub velocity: Option<&'a Surface>,
    pub time: f32,
    pub frame_index: u32,
}

impl<'a> FrameInputs<'a> {
    pub fn new(color: &'a Surface) -> Self {
        Self {
            color,
            depth: None,
            velocity: None,
            time: 0.0,
            frame_index: 0,
        }
    }

    pub fn with_depth(mut self, depth: &'a Surface) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_velocity(mut self, velocity: &'a Surface) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn at(mut self, time: f32, frame_index: u32) -> Self {
        self.time = time;
        self.frame_index = frame_index;
        self
    }

    fn context(&self) -> FrameContext<'a> {
        FrameContext {
            time: self.time,
            frame_index: self.frame_index,
            depth: self.depth,
            velocity: self.velocity,
        }
    }
}

#[derive(Debug)]
pub struct Composer {
    passes: Vec<EffectPass>,
    width: u32,
    height: u32,
    buffers: [Surface; 2],
    lost: Option<String>,
    backend: Backend,
}

impl Composer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            passes: Vec::new(),
            width,
            height,
            buffers: [Surface::new(width, height), Surface::new(width, height)],
            lost: None,
            backend: Backend::Cpu,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Append a pass. On the GPU backend its pipelines are built here, so a
    /// pass that cannot be compiled never joins the list.
    pub fn add_pass(&mut self, pass: EffectPass) -> LumenResult<()> {
        if let Backend::Gpu(gpu) = &self.backend {
            gpu.prepare(&pass)?;
        }
        pass.resize(self.width, self.height);
        tracing::debug!(pass = pass.name(), index = self.passes.len(), "added pass");
        self.passes.push(pass);
        Ok(())
    }

    pub fn passes(&self) -> &[EffectPass] {
        &self.passes
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reallocate every intermediate target for the new size.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.buffers = [Surface::new(width, height), Surface::new(width, height)];
        if let Backend::Gpu(gpu) = &self.backend {
            gpu.context().texture_pool.clear();
        }
        for pass in &self.passes {
            pass.resize(width, height);
        }
        tracing::info!(width, height, "composer resized");
    }

    pub fn is_lost(&self) -> bool {
        self.lost.is_some()
    }

    /// Refuse further frames until [`Composer::reinitialize`] succeeds.
    pub fn mark_context_lost(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::error!(%reason, "rendering context lost");
        self.lost = Some(reason);
    }

    /// Rebuild every pass from its effects on `backend`.
    pub fn reinitialize(&mut self, backend: Backend) -> LumenResult<()> {
        let mut passes = Vec::with_capacity(self.passes.len());
        for pass in &self.passes {
            let rebuilt = EffectPass::new(pass.effects().to_vec())?;
            if let Backend::Gpu(gpu) = &backend {
                gpu.prepare(&rebuilt)?;
            }
            rebuilt.resize(self.width, self.height);
            passes.push(rebuilt);
        }
        self.passes = passes;
        self.backend = backend;
        self.buffers = [
            Surface::new(self.width, self.height),
            Surface::new(self.width, self.height),
        ];
        self.lost = None;
        tracing::info!(passes = self.passes.len(), "composer reinitialized");
        Ok(())
    }

    /// Run every pass over `inputs.color` and return the final image.
    pub fn render(&mut self, inputs: &FrameInputs<'_>) -> LumenResult<&Surface> {
        if let Some(reason) = &self.lost {
            return Err(LumenError::ContextLost(reason.clone()));
        }
        if inputs.color.size() != (self.width, self.height) {
            return Err(LumenError::InvalidArgument(format!(
                "frame is {:?}, composer is {}x{}",
                inputs.color.size(),
                self.width,
                self.height
            )));
        }

        for pass in &self.passes {
            pass.commit_uniforms();
        }

        match self.run_passes(inputs) {
            Ok(index) => Ok(&self.buffers[index]),
            Err(e) => {
                if e.requires_reinitialization() {
                    self.mark_context_lost(e.to_string());
                } else {
                    tracing::warn!(frame = inputs.frame_index, "frame dropped: {e}");
                }
                Err(e)
            }
        }
    }

    /// Returns the index of the buffer holding the result.
    fn run_passes(&mut self, inputs: &FrameInputs<'_>) -> LumenResult<usize> {
        let ctx = inputs.context();
        let [first, second] = &mut self.buffers;
        first.data.copy_from_slice(&inputs.color.data);
        if self.passes.is_empty() {
            return Ok(0);
        }

        let mut read = 0;
        for pass in &self.passes {
            let (input, output) = if read == 0 {
                (&*first, &mut *second)
            } else {
                (&*second, &mut *first)
            };
            match &self.backend {
                Backend::Cpu => pass.execute(input, output, &ctx)?,
                Backend::Gpu(gpu) => {
                    let rendered = gpu.execute(pass, input, &ctx)?;
                    output.data.copy_from_slice(&rendered.data);
                }
            }
            read = 1 - read;
        }
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Effect;
    use crate::effects::ColorOverlayEffect;
    use lumen_core::{BlendFunction, BlendMode, Color};

    fn overlay_pass(color: Color, opacity: f32) -> EffectPass {
        EffectPass::new(vec![Effect::fusable(ColorOverlayEffect::new(
            color,
            BlendMode::new(BlendFunction::Normal, opacity),
        ))])
        .unwrap()
    }

    #[test]
    fn test_no_passes_copies_input() {
        let mut composer = Composer::new(2, 2);
        let input = Surface::filled(2, 2, [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(composer.render(&FrameInputs::new(&input)).unwrap(), &input);
    }

    #[test]
    fn test_passes_chain_in_order() {
        let mut composer = Composer::new(2, 1);
        composer.add_pass(overlay_pass(Color::RED, 1.0)).unwrap();
        composer.add_pass(overlay_pass(Color::BLUE, 0.5)).unwrap();
        let input = Surface::solid(2, 1, &Color::BLACK);
        let out = composer.render(&FrameInputs::new(&input)).unwrap();
        assert_eq!(out.at(0, 0), [0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_size_mismatch_is_rejected_until_resize() {
        let mut composer = Composer::new(4, 4);
        composer.add_pass(overlay_pass(Color::RED, 1.0)).unwrap();
        let input = Surface::new(8, 8);
        assert!(matches!(
            composer.render(&FrameInputs::new(&input)),
            Err(LumenError::InvalidArgument(_))
        ));
        composer.resize(8, 8);
        assert_eq!(composer.render(&FrameInputs::new(&input)).unwrap().size(), (8, 8));
    }

    #[test]
    fn test_lost_context_blocks_until_reinitialized() {
        let mut composer = Composer::new(2, 2);
        composer.add_pass(overlay_pass(Color::GREEN, 1.0)).unwrap();
        composer.mark_context_lost("device removed");
        let input = Surface::new(2, 2);
        assert!(matches!(
            composer.render(&FrameInputs::new(&input)),
            Err(LumenError::ContextLost(_))
        ));
        composer.reinitialize(Backend::Cpu).unwrap();
        assert!(!composer.is_lost());
        let out = composer.render(&FrameInputs::new(&input)).unwrap();
        assert_eq!(out.at(1, 1), Color::GREEN.to_array());
    }

    #[test]
    fn test_uniform_writes_land_at_frame_boundary() {
        let overlay = Arc::new(ColorOverlayEffect::new(Color::WHITE, BlendMode::new(BlendFunction::Normal, 0.0)));
        let mut composer = Composer::new(1, 1);
        composer
            .add_pass(EffectPass::new(vec![Effect::Fusable(overlay.clone())]).unwrap())
            .unwrap();
        let input = Surface::solid(1, 1, &Color::BLACK);
        overlay.set_opacity(1.0).unwrap();
        let out = composer.render(&FrameInputs::new(&input)).unwrap();
        assert_eq!(out.at(0, 0), [1.0; 4]);
    }
}
