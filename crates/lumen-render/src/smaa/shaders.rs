//! WGSL sources of the three SMAA stages.
//!
//! Every stage binds its textures at group 0, bindings `0..n`, followed by a
//! `vec4<f32>` parameter block at binding `n`. All reads are `textureLoad`
//! so the GPU results match the CPU stages texel for texel.

use std::sync::OnceLock;

use lumen_fx::codegen::FULLSCREEN_VERTEX;

use super::SmaaStage;

/// `params`: x threshold, y local contrast factor, z mode (0 luma, 1 color, 2 depth).
const EDGE_DETECTION: &str = "
@group(0) @binding(0) var source_tex: texture_2d<f32>;
@group(0) @binding(1) var<uniform> params: vec4<f32>;

fn fetch(p: vec2<i32>) -> vec4<f32> {
    let size = vec2<i32>(textureDimensions(source_tex));
    return textureLoad(source_tex, clamp(p, vec2<i32>(0), size - vec2<i32>(1)), 0);
}

fn delta(a: vec4<f32>, b: vec4<f32>) -> f32 {
    let mode = i32(params.z);
    if mode == 0 {
        let w = vec3<f32>(0.2126, 0.7152, 0.0722);
        return abs(dot(a.rgb, w) - dot(b.rgb, w));
    }
    if mode == 1 {
        let d = abs(a.rgb - b.rgb);
        return max(d.r, max(d.g, d.b));
    }
    return abs(a.r - b.r);
}

@fragment
fn fs_main(v: VertexOutput) -> @location(0) vec4<f32> {
    let p = vec2<i32>(v.position.xy);
    let center = fetch(p);
    let left = fetch(p + vec2<i32>(-1, 0));
    let top = fetch(p + vec2<i32>(0, -1));
    let d_left = delta(center, left);
    let d_top = delta(center, top);

    var edges = vec2<f32>(step(params.x, d_left), step(params.x, d_top));
    if edges.x + edges.y == 0.0 {
        return vec4<f32>(0.0);
    }
    if i32(params.z) != 2 {
        var max_delta = max(d_left, d_top);
        max_delta = max(max_delta, delta(center, fetch(p + vec2<i32>(1, 0))));
        max_delta = max(max_delta, delta(center, fetch(p + vec2<i32>(0, 1))));
        max_delta = max(max_delta, delta(left, fetch(p + vec2<i32>(-2, 0))));
        max_delta = max(max_delta, delta(top, fetch(p + vec2<i32>(0, -2))));
        edges = edges * step(vec2<f32>(max_delta), params.y * vec2<f32>(d_left, d_top));
    }
    return vec4<f32>(edges, 0.0, 0.0);
}
";

/// `params`: x max search distance, y corner rounding, z rounding enabled.
const BLENDING_WEIGHTS: &str = "
@group(0) @binding(0) var edges_tex: texture_2d<f32>;
@group(0) @binding(1) var search_tex: texture_2d<f32>;
@group(0) @binding(2) var area_tex: texture_2d<f32>;
@group(0) @binding(3) var<uniform> params: vec4<f32>;

const AREA_TILE: i32 = 65;
const AREA_MAX_DISTANCE: i32 = 64;

struct Line {
    base: vec2<i32>,
    axis: vec2<i32>,
    normal: vec2<i32>,
    vertical: bool,
}

fn edge_at(line: Line, t: i32, k: i32) -> vec4<f32> {
    let p = line.base + line.axis * t + line.normal * k;
    let size = vec2<i32>(textureDimensions(edges_tex));
    if any(p < vec2<i32>(0)) || any(p >= size) {
        return vec4<f32>(0.0);
    }
    return textureLoad(edges_tex, p, 0);
}

fn is_edge(line: Line, t: i32) -> bool {
    let e = edge_at(line, t, 0);
    return select(e.g, e.r, line.vertical) > 0.5;
}

fn crosses(line: Line, t: i32, k: i32) -> bool {
    let e = edge_at(line, t, k);
    return select(e.r, e.g, line.vertical) > 0.5;
}

fn crossing_any(line: Line, t: i32) -> bool {
    return crosses(line, t, -1) || crosses(line, t, 0);
}

fn flag(b: bool) -> i32 {
    return select(0, 1, b);
}

fn search_count(e1: bool, c1: bool, e2: bool, c2: bool) -> i32 {
    let code = flag(e1) | (flag(c1) << 1u) | (flag(e2) << 2u) | (flag(c2) << 3u);
    return i32(round(textureLoad(search_tex, vec2<i32>(code, 0), 0).r * 255.0));
}

fn search_back(line: Line, t0: i32, max_d: i32) -> i32 {
    var d = 0;
    var t = t0;
    loop {
        if d >= max_d {
            break;
        }
        let count = min(
            search_count(is_edge(line, t - 1), crossing_any(line, t), is_edge(line, t - 2), crossing_any(line, t - 1)),
            max_d - d,
        );
        d += count;
        t -= count;
        if count < 2 {
            break;
        }
    }
    return d;
}

fn search_fwd(line: Line, t0: i32, max_d: i32) -> i32 {
    var d = 0;
    var t = t0;
    loop {
        if d >= max_d {
            break;
        }
        let count = min(
            search_count(is_edge(line, t + 1), crossing_any(line, t + 1), is_edge(line, t + 2), crossing_any(line, t + 2)),
            max_d - d,
        );
        d += count;
        t += count;
        if count < 2 {
            break;
        }
    }
    return d;
}

fn area(pattern: i32, d1: i32, d2: i32) -> vec2<f32> {
    let texel = vec2<i32>(
        (pattern & 3) * AREA_TILE + min(d1, AREA_MAX_DISTANCE),
        (pattern >> 2u) * AREA_TILE + min(d2, AREA_MAX_DISTANCE),
    );
    return textureLoad(area_tex, texel, 0).rg;
}

fn line_weights(line: Line, t0: i32) -> vec2<f32> {
    let max_d = i32(params.x);
    let d1 = search_back(line, t0, max_d);
    let d2 = search_fwd(line, t0, max_d);
    let s = t0 - d1;
    let e = t0 + d2 + 1;

    let neg_start = crosses(line, s, -1);
    let pos_start = crosses(line, s, 0);
    let neg_end = crosses(line, e, -1);
    let pos_end = crosses(line, e, 0);
    let pattern = flag(neg_start) | (flag(neg_end) << 1u) | (flag(pos_start) << 2u) | (flag(pos_end) << 3u);

    var weights = area(pattern, d1, d2);
    if params.z > 0.5 {
        let start_corner = f32(flag((neg_start && crosses(line, s, -2)) || (pos_start && crosses(line, s, 1))));
        let end_corner = f32(flag((neg_end && crosses(line, e, -2)) || (pos_end && crosses(line, e, 1))));
        var presence = (start_corner + end_corner) * 0.5;
        if d1 < d2 {
            presence = start_corner;
        }
        if d1 > d2 {
            presence = end_corner;
        }
        weights = weights * (1.0 - (1.0 - params.y) * presence);
    }
    return weights;
}

@fragment
fn fs_main(v: VertexOutput) -> @location(0) vec4<f32> {
    let p = vec2<i32>(v.position.xy);
    let e = textureLoad(edges_tex, p, 0);
    var weights = vec4<f32>(0.0);
    if e.g > 0.5 {
        let h = line_weights(Line(vec2<i32>(0, p.y), vec2<i32>(1, 0), vec2<i32>(0, 1), false), p.x);
        weights = vec4<f32>(h, weights.zw);
    }
    if e.r > 0.5 {
        let w = line_weights(Line(vec2<i32>(p.x, 0), vec2<i32>(0, 1), vec2<i32>(1, 0), true), p.y);
        weights = vec4<f32>(weights.xy, w);
    }
    return weights;
}
";

/// `params` is unused by this stage.
const NEIGHBORHOOD_BLENDING: &str = "
@group(0) @binding(0) var color_tex: texture_2d<f32>;
@group(0) @binding(1) var weights_tex: texture_2d<f32>;
@group(0) @binding(2) var<uniform> params: vec4<f32>;

fn fetch_color(p: vec2<i32>) -> vec4<f32> {
    let size = vec2<i32>(textureDimensions(color_tex));
    return textureLoad(color_tex, clamp(p, vec2<i32>(0), size - vec2<i32>(1)), 0);
}

fn fetch_weights(p: vec2<i32>) -> vec4<f32> {
    let size = vec2<i32>(textureDimensions(weights_tex));
    if any(p < vec2<i32>(0)) || any(p >= size) {
        return vec4<f32>(0.0);
    }
    return textureLoad(weights_tex, p, 0);
}

@fragment
fn fs_main(v: VertexOutput) -> @location(0) vec4<f32> {
    let p = vec2<i32>(v.position.xy);
    let c = fetch_color(p);
    let own = fetch_weights(p);
    let w = vec4<f32>(
        own.b,
        fetch_weights(p + vec2<i32>(1, 0)).a,
        own.r,
        fetch_weights(p + vec2<i32>(0, 1)).g,
    );
    let sum = w.x + w.y + w.z + w.w;
    if sum <= 0.0 {
        return c;
    }
    let l = fetch_color(p + vec2<i32>(-1, 0));
    let r = fetch_color(p + vec2<i32>(1, 0));
    let t = fetch_color(p + vec2<i32>(0, -1));
    let b = fetch_color(p + vec2<i32>(0, 1));
    if sum <= 1.0 {
        return c + w.x * (l - c) + w.y * (r - c) + w.z * (t - c) + w.w * (b - c);
    }
    return (w.x * l + w.y * r + w.z * t + w.w * b) / sum;
}
";

static SOURCES: OnceLock<[String; 3]> = OnceLock::new();

fn sources() -> &'static [String; 3] {
    SOURCES.get_or_init(|| {
        [EDGE_DETECTION, BLENDING_WEIGHTS, NEIGHBORHOOD_BLENDING]
            .map(|body| format!("{FULLSCREEN_VERTEX}{body}"))
    })
}

/// The full module of one stage, `None` once blending is done.
pub fn source(stage: SmaaStage) -> Option<&'static str> {
    let index = match stage {
        SmaaStage::EdgeDetection => 0,
        SmaaStage::BlendingWeights => 1,
        SmaaStage::NeighborhoodBlending => 2,
        SmaaStage::Blended => return None,
    };
    Some(sources()[index].as_str())
}
