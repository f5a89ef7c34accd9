//! # lumen-core
//!
//! Core types shared across all Lumen crates: colors, frame buffers and
//! float surfaces, the blend function registry, UV transforms, content
//! hashing, configuration and error types.

pub mod blend;
pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod hash;
pub mod math;

pub use config::*;

pub use blend::{BlendFunction, BlendMode};
pub use color::Color;
pub use error::{LumenError, LumenResult};
pub use frame::{FrameBuffer, PixelFormat, Surface, Wrap};
pub use hash::ContentHash;
pub use math::{Mat3, UvTransform};
