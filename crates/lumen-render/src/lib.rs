//! # lumen-render
//!
//! The Lumen rendering engine. Effects are grouped into passes, each pass
//! fuses its fragment effects into one program, and the [`Composer`] runs
//! the passes in order over a pair of ping-pong buffers. Passes execute on
//! the CPU reference path or on a headless wgpu device.

pub mod assets;
pub mod builder;
pub mod composer;
pub mod effect;
pub mod effects;
pub mod gpu;
pub mod image_loader;
pub mod pass;
pub mod smaa;
pub mod uniforms;

pub use assets::{AssetBundle, AssetLoader};
pub use builder::{asset_requests, build_effect, build_passes};
pub use composer::{Backend, Composer, FrameInputs};
pub use effect::{Effect, FragmentEffect, FrameContext, MultiPassEffect};
pub use effects::{
    BrightnessContrastEffect, ColorOverlayEffect, DepthEffect, TextureEffect, VignetteEffect,
};
pub use gpu::{GpuContext, GpuRenderer};
pub use pass::{EffectPass, ProgramCache};
pub use smaa::{EdgeDetectionMode, SmaaEffect, SmaaLookup, SmaaPreset, SmaaSettings};
pub use uniforms::Uniforms;
