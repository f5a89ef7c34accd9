//! Precomputed SMAA lookup tables.
//!
//! `search` maps the four edge/crossing bits sampled two texels ahead of a
//! search position to how many texels the search may advance. `area` maps a
//! crossing pattern and the distances to both ends of an edge to the
//! coverage of the current pixel on each side of the edge.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use lumen_core::{LumenError, LumenResult, Surface};

pub const SEARCH_WIDTH: u32 = 16;
/// Largest end distance the area table resolves.
pub const AREA_MAX_DISTANCE: u32 = 64;
/// Side of one pattern tile of the area table.
pub const AREA_TILE: u32 = AREA_MAX_DISTANCE + 1;
pub const AREA_SIZE: u32 = AREA_TILE * 4;
/// Coverage given to both sides of an edge that no crossing edge terminates.
pub const STRAIGHT_EDGE_COVERAGE: f32 = 0.25;

pub const SEARCH_FILE: &str = "smaa-search.png";
pub const AREA_FILE: &str = "smaa-area.png";
pub const SEARCH_ASSET: &str = "smaa-search";
pub const AREA_ASSET: &str = "smaa-area";

/// Crossing pattern bits.
pub const NEG_START: u8 = 1;
pub const NEG_END: u8 = 2;
pub const POS_START: u8 = 4;
pub const POS_END: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmaaLookup {
    search: Vec<u8>,
    /// `(positive, negative)` coverage, row-major `AREA_SIZE x AREA_SIZE`.
    area: Vec<[u8; 2]>,
}

static SHARED: OnceLock<Arc<SmaaLookup>> = OnceLock::new();

/// Search-table code: `e1 | c1 << 1 | e2 << 2 | c2 << 3`, where `e1`/`e2`
/// are the edge bits one and two texels ahead and `c1`/`c2` the crossings
/// that would stop the search before reaching them.
pub fn search_code(e1: bool, c1: bool, e2: bool, c2: bool) -> u8 {
    e1 as u8 | (c1 as u8) << 1 | (e2 as u8) << 2 | (c2 as u8) << 3
}

fn search_advance(code: u8) -> u8 {
    let first = code & 1 != 0 && code & 2 == 0;
    let second = code & 4 != 0 && code & 8 == 0;
    match (first, second) {
        (true, true) => 2,
        (true, false) => 1,
        _ => 0,
    }
}

/// Height of the anti-aliasing line at one end of an edge.
fn end_height(negative: bool, positive: bool) -> Option<f32> {
    match (negative, positive) {
        (true, false) => Some(-0.5),
        (false, true) => Some(0.5),
        _ => None,
    }
}

/// Area between the line through `p0` and `p1` and the edge axis, over
/// `[a, b]`, split into `(positive, negative)` parts.
fn segment_area(p0: (f32, f32), p1: (f32, f32), a: f32, b: f32) -> (f32, f32) {
    let lo = a.max(p0.0);
    let hi = b.min(p1.0);
    if hi <= lo || p1.0 <= p0.0 {
        return (0.0, 0.0);
    }
    let at = |t: f32| p0.1 + (p1.1 - p0.1) * (t - p0.0) / (p1.0 - p0.0);
    let (ya, yb) = (at(lo), at(hi));
    let split = |y: f32, area: f32| if y >= 0.0 { (area, 0.0) } else { (0.0, area) };

    if ya * yb >= 0.0 {
        let area = (ya.abs() + yb.abs()) * 0.5 * (hi - lo);
        return split(ya + yb, area);
    }
    let tz = lo + (hi - lo) * ya / (ya - yb);
    let first = split(ya, ya.abs() * (tz - lo) * 0.5);
    let second = split(yb, yb.abs() * (hi - tz) * 0.5);
    (first.0 + second.0, first.1 + second.1)
}

/// Exact coverage of the pixel `d1` texels past the start of an edge that
/// is `d1 + d2 + 1` texels long.
pub fn coverage(pattern: u8, d1: u32, d2: u32) -> (f32, f32) {
    if pattern == 0 {
        return (STRAIGHT_EDGE_COVERAGE, STRAIGHT_EDGE_COVERAGE);
    }
    let h1 = end_height(pattern & NEG_START != 0, pattern & POS_START != 0);
    let h2 = end_height(pattern & NEG_END != 0, pattern & POS_END != 0);
    let length = (d1 + d2 + 1) as f32;
    let (a, b) = (d1 as f32, d1 as f32 + 1.0);

    match (h1, h2) {
        (None, None) => (0.0, 0.0),
        // Z shape: one line across the whole edge
        (Some(p), Some(q)) if p * q < 0.0 => segment_area((0.0, p), (length, q), a, b),
        _ => {
            let p = h1.unwrap_or(0.0);
            let q = h2.unwrap_or(0.0);
            let mid = length * 0.5;
            let first = segment_area((0.0, p), (mid, 0.0), a, b);
            let second = segment_area((mid, 0.0), (length, q), a, b);
            (first.0 + second.0, first.1 + second.1)
        }
    }
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl SmaaLookup {
    pub fn generate() -> Self {
        let search = (0..SEARCH_WIDTH as u8).map(search_advance).collect();
        let mut area = vec![[0u8; 2]; (AREA_SIZE * AREA_SIZE) as usize];
        for pattern in 0..16u8 {
            let tile_x = (pattern & 3) as u32 * AREA_TILE;
            let tile_y = (pattern >> 2) as u32 * AREA_TILE;
            for d2 in 0..AREA_TILE {
                for d1 in 0..AREA_TILE {
                    let (pos, neg) = coverage(pattern, d1, d2);
                    let index = ((tile_y + d2) * AREA_SIZE + tile_x + d1) as usize;
                    area[index] = [quantize(pos), quantize(neg)];
                }
            }
        }
        Self { search, area }
    }

    /// Tables generated once per process and shared by every SMAA effect.
    pub fn shared() -> Arc<SmaaLookup> {
        SHARED
            .get_or_init(|| {
                tracing::debug!("generating SMAA lookup tables");
                Arc::new(SmaaLookup::generate())
            })
            .clone()
    }

    /// How many texels a search may advance for `code`.
    pub fn search_advance(&self, code: u8) -> u32 {
        self.search.get(code as usize).copied().unwrap_or(0) as u32
    }

    /// `(positive, negative)` coverage for a pattern and end distances.
    pub fn area(&self, pattern: u8, d1: u32, d2: u32) -> [f32; 2] {
        let x = (pattern & 3) as u32 * AREA_TILE + d1.min(AREA_MAX_DISTANCE);
        let y = (pattern >> 2) as u32 * AREA_TILE + d2.min(AREA_MAX_DISTANCE);
        let [pos, neg] = self.area[(y * AREA_SIZE + x) as usize];
        [pos as f32 / 255.0, neg as f32 / 255.0]
    }

    /// The tables as surfaces (`search` in red, `area` in red/green).
    pub fn to_surfaces(&self) -> (Surface, Surface) {
        let search = Surface::from_fn(SEARCH_WIDTH, 1, |x, _| {
            let v = self.search[x as usize] as f32 / 255.0;
            [v, v, v, 1.0]
        });
        let area = Surface::from_fn(AREA_SIZE, AREA_SIZE, |x, y| {
            let [pos, neg] = self.area[(y * AREA_SIZE + x) as usize];
            [pos as f32 / 255.0, neg as f32 / 255.0, 0.0, 1.0]
        });
        (search, area)
    }

    /// Rebuild the tables from loaded images.
    pub fn from_surfaces(search: &Surface, area: &Surface) -> LumenResult<Self> {
        if search.size() != (SEARCH_WIDTH, 1) {
            return Err(LumenError::InvalidArgument(format!(
                "search table must be {SEARCH_WIDTH}x1, got {:?}",
                search.size()
            )));
        }
        if area.size() != (AREA_SIZE, AREA_SIZE) {
            return Err(LumenError::InvalidArgument(format!(
                "area table must be {AREA_SIZE}x{AREA_SIZE}, got {:?}",
                area.size()
            )));
        }
        Ok(Self {
            search: search.data.iter().map(|t| quantize(t[0])).collect(),
            area: area.data.iter().map(|t| [quantize(t[0]), quantize(t[1])]).collect(),
        })
    }

    /// Write `smaa-search.png` (8-bit grey) and `smaa-area.png` (8-bit RGB).
    pub fn save_png(&self, dir: &Path) -> LumenResult<()> {
        std::fs::create_dir_all(dir)?;
        let search = image::GrayImage::from_raw(SEARCH_WIDTH, 1, self.search.clone())
            .ok_or_else(|| LumenError::Render("search table has the wrong length".into()))?;
        let search_path = dir.join(SEARCH_FILE);
        search
            .save(&search_path)
            .map_err(|e| LumenError::asset(e.to_string(), &search_path))?;

        let rgb: Vec<u8> = self.area.iter().flat_map(|[p, n]| [*p, *n, 0]).collect();
        let area = image::RgbImage::from_raw(AREA_SIZE, AREA_SIZE, rgb)
            .ok_or_else(|| LumenError::Render("area table has the wrong length".into()))?;
        let area_path = dir.join(AREA_FILE);
        area.save(&area_path)
            .map_err(|e| LumenError::asset(e.to_string(), &area_path))?;

        tracing::info!(dir = %dir.display(), "wrote SMAA lookup tables");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_table_values() {
        let lookup = SmaaLookup::generate();
        assert_eq!(lookup.search_advance(search_code(true, false, true, false)), 2);
        assert_eq!(lookup.search_advance(search_code(true, false, false, false)), 1);
        assert_eq!(lookup.search_advance(search_code(true, false, true, true)), 1);
        assert_eq!(lookup.search_advance(search_code(true, true, true, false)), 0);
        assert_eq!(lookup.search_advance(search_code(false, false, true, false)), 0);
    }

    #[test]
    fn test_straight_edges_get_fixed_coverage() {
        let lookup = SmaaLookup::generate();
        let [pos, neg] = lookup.area(0, 10, 3);
        assert!((pos - STRAIGHT_EDGE_COVERAGE).abs() < 1.0 / 255.0);
        assert!((neg - STRAIGHT_EDGE_COVERAGE).abs() < 1.0 / 255.0);
    }

    #[test]
    fn test_z_pattern_is_antisymmetric() {
        // line from -0.5 at the start to +0.5 at the end
        let pattern = NEG_START | POS_END;
        let (pos_first, neg_first) = coverage(pattern, 0, 4);
        let (pos_last, neg_last) = coverage(pattern, 4, 0);
        assert_eq!(pos_first, 0.0);
        assert!(neg_first > 0.0);
        assert!((pos_last - neg_first).abs() < 1e-6);
        assert_eq!(neg_last, 0.0);
    }

    #[test]
    fn test_single_pixel_z_splits_evenly() {
        let (pos, neg) = coverage(NEG_START | POS_END, 0, 0);
        assert!((pos - 0.125).abs() < 1e-6);
        assert!((neg - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_l_pattern_fades_toward_the_middle() {
        let near = coverage(POS_START, 0, 6).0;
        let far = coverage(POS_START, 3, 3).0;
        assert!(near > far);
        assert_eq!(coverage(POS_START, 0, 6).1, 0.0);
    }

    #[test]
    fn test_ambiguous_ends_give_no_coverage() {
        assert_eq!(coverage(NEG_START | POS_START, 2, 2), (0.0, 0.0));
    }

    #[test]
    fn test_surface_round_trip() {
        let lookup = SmaaLookup::generate();
        let (search, area) = lookup.to_surfaces();
        assert_eq!(SmaaLookup::from_surfaces(&search, &area).unwrap(), lookup);
        assert!(SmaaLookup::from_surfaces(&area, &search).is_err());
    }

    #[test]
    fn test_shared_is_generated_once() {
        assert!(Arc::ptr_eq(&SmaaLookup::shared(), &SmaaLookup::shared()));
    }
}
