use lumen_core::{LumenError, LumenResult};

use crate::descriptor::InputBuffer;
use crate::ir::{FusionIr, Resource};
use crate::layout::FRAME_UNIFORMS_WGSL;

/// Module-scope names owned by the generated program. Effects may not
/// declare uniforms or textures with these names.
pub const RESERVED_SYMBOLS: &[&str] = &[
    "frame",
    "effects",
    "input_buffer",
    "input_sampler",
    "depth_buffer",
    "velocity_buffer",
    "texture_sampler",
    "sample_input",
    "read_depth",
    "read_velocity",
    "saturate_rgb",
    "blend_cover",
    "FrameUniforms",
    "EffectUniforms",
    "VertexOutput",
    "vs_main",
    "fs_main",
];

pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";

/// Full-screen triangle shared by every generated module.
pub const FULLSCREEN_VERTEX: &str = "struct VertexOutput {
    @builtin(position) position: vec4<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);
    var result: VertexOutput;
    result.position = vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    return result;
}
";

const FOLD_HELPERS: &str = "fn saturate_rgb(c: vec3<f32>) -> vec3<f32> {
    return clamp(c, vec3<f32>(0.0), vec3<f32>(1.0));
}

fn blend_cover(base: vec4<f32>, blended: vec3<f32>, coverage: f32) -> vec4<f32> {
    let k = clamp(coverage, 0.0, 1.0);
    return vec4<f32>(mix(base.rgb, blended, k), base.a + (1.0 - base.a) * k);
}
";

const SAMPLE_INPUT: &str = "fn sample_input(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(input_buffer, input_sampler, uv, 0.0);
}
";

const READ_DEPTH: &str = "fn read_depth(uv: vec2<f32>) -> f32 {
    let size = vec2<i32>(textureDimensions(depth_buffer));
    let coord = clamp(vec2<i32>(uv * vec2<f32>(size)), vec2<i32>(0), size - vec2<i32>(1));
    return textureLoad(depth_buffer, coord, 0).r;
}
";

const READ_VELOCITY: &str = "fn read_velocity(uv: vec2<f32>) -> vec2<f32> {
    let size = vec2<i32>(textureDimensions(velocity_buffer));
    let coord = clamp(vec2<i32>(uv * vec2<f32>(size)), vec2<i32>(0), size - vec2<i32>(1));
    return textureLoad(velocity_buffer, coord, 0).rg;
}
";

/// Prints a [`FusionIr`] as one WGSL module with `vs_main` and `fs_main`.
pub struct Codegen {
    wgsl: String,
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}

impl Codegen {
    pub fn new() -> Self {
        Self {
            wgsl: String::new(),
        }
    }

    pub fn generate(&mut self, ir: &FusionIr) -> LumenResult<String> {
        self.wgsl.clear();
        self.header(ir);
        self.declarations(ir);
        self.helpers(ir)?;
        for stage in &ir.stages {
            self.line(&format!("// {} ({})", stage.effect, stage.blend));
            if !stage.declarations.trim().is_empty() {
                self.line(stage.declarations.trim_end());
                self.line("");
            }
            self.line(&format!(
                "fn {}(input_color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {{",
                stage.entry
            ));
            self.line(stage.body.trim_end());
            self.line("}");
            self.line("");
        }
        self.wgsl.push_str(FULLSCREEN_VERTEX);
        self.line("");
        self.fragment_entry(ir)?;
        Ok(std::mem::take(&mut self.wgsl))
    }

    fn line(&mut self, text: &str) {
        self.wgsl.push_str(text);
        self.wgsl.push('\n');
    }

    fn header(&mut self, ir: &FusionIr) {
        let names: Vec<&str> = ir.stages.iter().map(|s| s.effect.as_str()).collect();
        self.line(&format!("// lumen fused program: [{}]", names.join(", ")));
        if let Some(hoisted) = &ir.chain {
            self.line(&format!("// preceded by dedicated chain '{}'", hoisted.chain.id));
        }
        self.line("");
    }

    fn declarations(&mut self, ir: &FusionIr) {
        self.wgsl.push_str(FRAME_UNIFORMS_WGSL);
        self.line("\n");
        if !ir.uniforms.is_empty() {
            self.wgsl.push_str(&ir.uniforms.wgsl_struct("EffectUniforms"));
            self.line("\n");
        }
        for binding in ir.bindings() {
            let ty = match binding.resource {
                Resource::InputColor | Resource::Depth | Resource::Velocity | Resource::Texture(_) => {
                    "texture_2d<f32>"
                }
                Resource::InputSampler | Resource::TextureSampler => "sampler",
                Resource::FrameUniforms => {
                    self.binding_line(binding.group, binding.binding, "var<uniform>", &binding.name, "FrameUniforms");
                    continue;
                }
                Resource::EffectUniforms => {
                    self.binding_line(binding.group, binding.binding, "var<uniform>", &binding.name, "EffectUniforms");
                    continue;
                }
            };
            self.binding_line(binding.group, binding.binding, "var", &binding.name, ty);
        }
        self.line("");
    }

    fn binding_line(&mut self, group: u32, binding: u32, var: &str, name: &str, ty: &str) {
        self.line(&format!("@group({group}) @binding({binding}) {var} {name}: {ty};"));
    }

    fn helpers(&mut self, ir: &FusionIr) -> LumenResult<()> {
        if ir.requires(InputBuffer::Color) {
            self.line(SAMPLE_INPUT);
        }
        if ir.requires(InputBuffer::Depth) {
            self.line(READ_DEPTH);
        }
        if ir.requires(InputBuffer::Velocity) {
            self.line(READ_VELOCITY);
        }
        self.line(FOLD_HELPERS);
        for function in ir.blend_functions() {
            let source = function
                .wgsl_function()
                .ok_or_else(|| LumenError::UnsupportedBlendFunction(function.to_string()))?;
            self.line(&source);
        }
        Ok(())
    }

    fn fragment_entry(&mut self, ir: &FusionIr) -> LumenResult<()> {
        self.line("@fragment");
        self.line("fn fs_main(v: VertexOutput) -> @location(0) vec4<f32> {");
        self.line("    let coord = vec2<i32>(floor(v.position.xy));");
        self.line("    let uv = v.position.xy * frame.texel_size;");
        self.line("    var acc = textureLoad(input_buffer, coord, 0);");
        for stage in &ir.stages {
            let result = format!("c{}", stage.index);
            self.line(&format!("    let {result} = {}(acc, uv);", stage.entry));
            let Some(opacity) = stage.opacity_symbol() else {
                continue;
            };
            let helper = stage
                .blend
                .wgsl_name()
                .ok_or_else(|| LumenError::UnsupportedBlendFunction(stage.blend.to_string()))?;
            self.line(&format!(
                "    acc = blend_cover(acc, saturate_rgb({helper}(saturate_rgb(acc.rgb), saturate_rgb({result}.rgb))), {result}.a * effects.{opacity});"
            ));
        }
        self.line("    return acc;");
        self.line("}");
        Ok(())
    }
}
