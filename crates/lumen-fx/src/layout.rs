//! Uniform buffer layout following WGSL address-space rules.

use serde::Serialize;

use crate::descriptor::{UniformType, UniformValue};

/// Per-frame values bound to every fused program as `frame`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub texel_size: [f32; 2],
    pub time: f32,
    pub frame_index: u32,
    pub _pad: [f32; 2],
}

impl FrameUniforms {
    pub fn new(width: u32, height: u32, time: f32, frame_index: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            texel_size: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
            time,
            frame_index,
            _pad: [0.0; 2],
        }
    }
}

pub const FRAME_UNIFORMS_WGSL: &str = "struct FrameUniforms {
    resolution: vec2<f32>,
    texel_size: vec2<f32>,
    time: f32,
    frame_index: u32,
}";

impl UniformType {
    /// Alignment in bytes in the uniform address space.
    pub fn align(self) -> u32 {
        match self {
            UniformType::F32 => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 | UniformType::Mat3 => 16,
        }
    }

    pub fn size(self) -> u32 {
        match self {
            UniformType::F32 => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 => 12,
            UniformType::Vec4 => 16,
            UniformType::Mat3 => 48,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformField {
    /// Namespaced member name in the generated struct.
    pub symbol: String,
    /// Index of the owning stage.
    pub stage: usize,
    /// Name as declared by the effect.
    pub local: String,
    pub ty: UniformType,
    pub offset: u32,
}

/// The merged uniform block of one fused program.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UniformLayout {
    fields: Vec<UniformField>,
    end: u32,
}

fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

impl UniformLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member, placing it at the next correctly aligned offset.
    pub fn push(&mut self, stage: usize, local: &str, symbol: String, ty: UniformType) -> u32 {
        let offset = round_up(self.end, ty.align());
        self.fields.push(UniformField {
            symbol,
            stage,
            local: local.to_string(),
            ty,
            offset,
        });
        self.end = offset + ty.size();
        offset
    }

    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, stage: usize, local: &str) -> Option<&UniformField> {
        self.fields
            .iter()
            .find(|f| f.stage == stage && f.local == local)
    }

    /// Struct size: the end of the last member rounded to the struct alignment.
    pub fn size(&self) -> u32 {
        let align = self
            .fields
            .iter()
            .map(|f| f.ty.align())
            .max()
            .unwrap_or(16);
        round_up(self.end, align).max(16)
    }

    /// WGSL declaration of the block as `struct {name}`.
    pub fn wgsl_struct(&self, name: &str) -> String {
        let mut s = format!("struct {name} {{\n");
        for field in &self.fields {
            s.push_str(&format!("    {}: {},\n", field.symbol, field.ty.wgsl()));
        }
        s.push('}');
        s
    }

    /// Pack current values into a buffer matching [`UniformLayout::size`].
    ///
    /// Fields whose value is missing or of the wrong type stay zeroed.
    pub fn pack(&self, value_of: impl Fn(&UniformField) -> Option<UniformValue>) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size() as usize];
        for field in &self.fields {
            let Some(value) = value_of(field).filter(|v| v.ty() == field.ty) else {
                continue;
            };
            let at = field.offset as usize;
            match value {
                UniformValue::F32(v) => write_floats(&mut bytes, at, &[v]),
                UniformValue::Vec2(v) => write_floats(&mut bytes, at, &v),
                UniformValue::Vec3(v) => write_floats(&mut bytes, at, &v),
                UniformValue::Vec4(v) => write_floats(&mut bytes, at, &v),
                UniformValue::Mat3(m) => {
                    // Each column occupies a 16-byte slot.
                    for (i, col) in m.cols.iter().enumerate() {
                        write_floats(&mut bytes, at + i * 16, col);
                    }
                }
            }
        }
        bytes
    }
}

fn write_floats(bytes: &mut [u8], at: usize, values: &[f32]) {
    let src: &[u8] = bytemuck::cast_slice(values);
    bytes[at..at + src.len()].copy_from_slice(src);
}
