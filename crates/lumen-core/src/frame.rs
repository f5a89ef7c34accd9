use serde::{Deserialize, Serialize};

use crate::Color;

/// Pixel format of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (4 bytes per pixel).
    Rgba8,
}

impl PixelFormat {
    /// Bytes per pixel for this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// An 8-bit frame as handed to and from image files and GPU readback.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Raw pixel data.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
}

impl FrameBuffer {
    /// Create a new frame buffer filled with zeros (transparent black).
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            data: vec![0u8; size],
            width,
            height,
            format,
        }
    }

    /// Create a frame buffer filled with a solid color.
    pub fn solid(width: u32, height: u32, color: &Color) -> Self {
        let pixel = color.to_rgba8();
        let pixel_count = (width as usize) * (height as usize);
        Self {
            data: pixel.repeat(pixel_count),
            width,
            height,
            format: PixelFormat::Rgba8,
        }
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Get the RGBA value at a pixel coordinate. Returns None if out of bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Set the RGBA value at a pixel coordinate. No-op if out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        self.data[offset..offset + 4].copy_from_slice(&rgba);
    }
}

/// Addressing mode for normalized-coordinate sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrap {
    #[default]
    Clamp,
    Repeat,
}

/// A float RGBA image, the working format of every CPU pass.
///
/// Texel `(x, y)` covers `[x, x + 1) x [y, y + 1)`; its center sits at
/// normalized coordinate `((x + 0.5) / width, (y + 0.5) / height)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[f32; 4]>,
}

impl Surface {
    /// A zero-filled surface.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; 4])
    }

    pub fn filled(width: u32, height: u32, value: [f32; 4]) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width as usize) * (height as usize)],
        }
    }

    pub fn solid(width: u32, height: u32, color: &Color) -> Self {
        Self::filled(width, height, color.to_array())
    }

    /// Build a surface by evaluating `f` at every texel.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [f32; 4]) -> Self {
        let mut data = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn same_size(&self, other: &Surface) -> bool {
        self.size() == other.size()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Texel at an in-bounds coordinate.
    pub fn at(&self, x: u32, y: u32) -> [f32; 4] {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: [f32; 4]) {
        let i = self.index(x, y);
        self.data[i] = value;
    }

    /// Texel fetch with clamp-to-edge addressing.
    pub fn fetch(&self, x: i64, y: i64) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.at(x, y)
    }

    /// Texel fetch that reads zero outside the surface.
    pub fn fetch_or_zero(&self, x: i64, y: i64) -> [f32; 4] {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return [0.0; 4];
        }
        self.at(x as u32, y as u32)
    }

    /// Bilinear sample at a normalized coordinate.
    pub fn sample(&self, uv: [f32; 2], wrap: Wrap) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let fx = uv[0] * self.width as f32 - 0.5;
        let fy = uv[1] * self.height as f32 - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;

        let texel = |x: i64, y: i64| match wrap {
            Wrap::Clamp => self.fetch(x, y),
            Wrap::Repeat => self.fetch(x.rem_euclid(w), y.rem_euclid(h)),
        };
        let (x0, y0) = (x0 as i64, y0 as i64);
        let top = lerp4(texel(x0, y0), texel(x0 + 1, y0), tx);
        let bottom = lerp4(texel(x0, y0 + 1), texel(x0 + 1, y0 + 1), tx);
        lerp4(top, bottom, ty)
    }

    /// Largest per-channel absolute difference to another surface of the same size.
    pub fn max_abs_diff(&self, other: &Surface) -> f32 {
        self.data
            .iter()
            .zip(&other.data)
            .flat_map(|(a, b)| (0..4).map(move |i| (a[i] - b[i]).abs()))
            .fold(0.0, f32::max)
    }

    pub fn from_frame_buffer(frame: &FrameBuffer) -> Self {
        let data = frame
            .data
            .chunks_exact(frame.format.bytes_per_pixel())
            .map(|p| Color::from_rgba8([p[0], p[1], p[2], p[3]]).to_array())
            .collect();
        Self {
            width: frame.width,
            height: frame.height,
            data,
        }
    }

    pub fn to_frame_buffer(&self) -> FrameBuffer {
        let mut data = Vec::with_capacity(self.data.len() * 4);
        for texel in &self.data {
            data.extend_from_slice(&Color::from_array(*texel).to_rgba8());
        }
        FrameBuffer {
            data,
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba8,
        }
    }
}

fn lerp4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}
