//! Blending-weight calculation: the second SMAA stage.
//!
//! For every edge texel the edge line is followed in both directions with
//! the search table, the crossing edges found at both ends select one of the
//! 16 patterns, and the area table turns pattern and distances into the
//! coverage of the pixels on each side.

use rayon::prelude::*;

use lumen_core::Surface;

use super::lookup::{search_code, SmaaLookup, NEG_END, NEG_START, POS_END, POS_START};
use super::SmaaSettings;

/// Read position along one edge line.
///
/// `t` runs along the edge, `k` across it: `-1` is the texel column (or row)
/// on the negative side, `0` the positive side, `-2` and `1` one further out.
struct Line<'a> {
    edges: &'a Surface,
    base: (i64, i64),
    axis: (i64, i64),
    normal: (i64, i64),
    vertical: bool,
}

impl<'a> Line<'a> {
    /// The edge between columns `x - 1` and `x`.
    fn vertical(edges: &'a Surface, x: i64) -> Self {
        Self {
            edges,
            base: (x, 0),
            axis: (0, 1),
            normal: (1, 0),
            vertical: true,
        }
    }

    /// The edge between rows `y - 1` and `y`.
    fn horizontal(edges: &'a Surface, y: i64) -> Self {
        Self {
            edges,
            base: (0, y),
            axis: (1, 0),
            normal: (0, 1),
            vertical: false,
        }
    }

    fn edge_at(&self, t: i64, k: i64) -> [f32; 4] {
        self.edges.fetch_or_zero(
            self.base.0 + self.axis.0 * t + self.normal.0 * k,
            self.base.1 + self.axis.1 * t + self.normal.1 * k,
        )
    }

    fn is_edge(&self, t: i64) -> bool {
        let e = self.edge_at(t, 0);
        (if self.vertical { e[0] } else { e[1] }) > 0.5
    }

    fn cross(&self, t: i64, k: i64) -> bool {
        let e = self.edge_at(t, k);
        (if self.vertical { e[1] } else { e[0] }) > 0.5
    }

    fn crossing_any(&self, t: i64) -> bool {
        self.cross(t, -1) || self.cross(t, 0)
    }
}

/// Texels the edge continues before `t0`.
fn search_back(line: &Line<'_>, lookup: &SmaaLookup, t0: i64, max: u32) -> u32 {
    let mut d = 0;
    let mut t = t0;
    while d < max {
        let code = search_code(
            line.is_edge(t - 1),
            line.crossing_any(t),
            line.is_edge(t - 2),
            line.crossing_any(t - 1),
        );
        let count = lookup.search_advance(code).min(max - d);
        d += count;
        t -= count as i64;
        if count < 2 {
            break;
        }
    }
    d
}

/// Texels the edge continues after `t0`.
fn search_fwd(line: &Line<'_>, lookup: &SmaaLookup, t0: i64, max: u32) -> u32 {
    let mut d = 0;
    let mut t = t0;
    while d < max {
        let code = search_code(
            line.is_edge(t + 1),
            line.crossing_any(t + 1),
            line.is_edge(t + 2),
            line.crossing_any(t + 2),
        );
        let count = lookup.search_advance(code).min(max - d);
        d += count;
        t += count as i64;
        if count < 2 {
            break;
        }
    }
    d
}

/// `(positive, negative)` coverage of the pixels beside the edge texel `t0`.
fn line_weights(line: &Line<'_>, lookup: &SmaaLookup, settings: &SmaaSettings, t0: i64) -> [f32; 2] {
    let max = settings.max_search_distance();
    let d1 = search_back(line, lookup, t0, max);
    let d2 = search_fwd(line, lookup, t0, max);
    let start = t0 - d1 as i64;
    let end = t0 + d2 as i64 + 1;

    let (neg_start, pos_start) = (line.cross(start, -1), line.cross(start, 0));
    let (neg_end, pos_end) = (line.cross(end, -1), line.cross(end, 0));
    let mut pattern = 0;
    for (set, bit) in [
        (neg_start, NEG_START),
        (neg_end, NEG_END),
        (pos_start, POS_START),
        (pos_end, POS_END),
    ] {
        if set {
            pattern |= bit;
        }
    }

    let [pos, neg] = lookup.area(pattern, d1, d2);
    let factor = match settings.corner_rounding {
        Some(rounding) => {
            let corner = |t: i64, neg: bool, pos: bool| {
                let sharp = (neg && line.cross(t, -2)) || (pos && line.cross(t, 1));
                sharp as u8 as f32
            };
            let start_corner = corner(start, neg_start, pos_start);
            let end_corner = corner(end, neg_end, pos_end);
            let presence = match d1.cmp(&d2) {
                std::cmp::Ordering::Less => start_corner,
                std::cmp::Ordering::Greater => end_corner,
                std::cmp::Ordering::Equal => (start_corner + end_corner) * 0.5,
            };
            1.0 - (1.0 - rounding) * presence
        }
        None => 1.0,
    };
    [pos * factor, neg * factor]
}

/// Weights of one texel: `r` pull from above, `g` pull of the upper pixel
/// from below, `b` pull from the left, `a` pull of the left pixel from the
/// right.
pub fn weights_at(edges: &Surface, lookup: &SmaaLookup, settings: &SmaaSettings, x: i64, y: i64) -> [f32; 4] {
    let e = edges.fetch_or_zero(x, y);
    let mut out = [0.0; 4];
    if e[1] > 0.5 {
        let [pos, neg] = line_weights(&Line::horizontal(edges, y), lookup, settings, x);
        out[0] = pos;
        out[1] = neg;
    }
    if e[0] > 0.5 {
        let [pos, neg] = line_weights(&Line::vertical(edges, x), lookup, settings, y);
        out[2] = pos;
        out[3] = neg;
    }
    out
}

/// Run the weight stage over an edge mask.
pub fn compute(edges: &Surface, lookup: &SmaaLookup, settings: &SmaaSettings, output: &mut Surface) {
    let width = output.width as usize;
    if width == 0 {
        return;
    }
    output
        .data
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                *texel = weights_at(edges, lookup, settings, x as i64, y as i64);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smaa::{SmaaPreset, STRAIGHT_EDGE_COVERAGE};

    fn mask(width: u32, height: u32, f: impl Fn(u32, u32) -> (bool, bool)) -> Surface {
        Surface::from_fn(width, height, |x, y| {
            let (left, top) = f(x, y);
            [left as u8 as f32, top as u8 as f32, 0.0, 0.0]
        })
    }

    #[test]
    fn test_unterminated_edge_gets_straight_coverage() {
        let edges = mask(6, 8, |x, _| (x == 3, false));
        let settings = SmaaPreset::High.settings();
        let w = weights_at(&edges, &SmaaLookup::shared(), &settings, 3, 4);
        assert!((w[2] - STRAIGHT_EDGE_COVERAGE).abs() < 1.0 / 255.0);
        assert!((w[3] - STRAIGHT_EDGE_COVERAGE).abs() < 1.0 / 255.0);
        assert_eq!(w[0], 0.0);
    }

    #[test]
    fn test_search_is_bounded_by_preset_distance() {
        let edges = mask(4, 200, |x, _| (x == 1, false));
        let lookup = SmaaLookup::shared();
        let line = Line::vertical(&edges, 1);
        let low = SmaaPreset::Low.settings().max_search_distance();
        assert_eq!(search_back(&line, &lookup, 100, low), low);
        assert_eq!(search_fwd(&line, &lookup, 100, low), low);
        assert_eq!(search_back(&line, &lookup, 3, low), 3);
    }

    #[test]
    fn test_search_stops_at_crossing() {
        // vertical edge at x = 2, crossed by a horizontal edge at row 5
        let edges = mask(5, 12, |x, y| (x == 2, y == 5 && x == 1));
        let lookup = SmaaLookup::shared();
        let line = Line::vertical(&edges, 2);
        assert_eq!(search_back(&line, &lookup, 8, 32), 3);
        assert_eq!(search_fwd(&line, &lookup, 2, 32), 2);
    }

    #[test]
    fn test_staircase_produces_opposite_side_weights() {
        // the boundary steps one column right at row 4
        let edges = mask(8, 8, |x, y| {
            let column = if y < 4 { 3 } else { 4 };
            (x == column, y == 4 && x == 3)
        });
        let settings = SmaaPreset::Medium.settings();
        let lookup = SmaaLookup::shared();
        let upper = weights_at(&edges, &lookup, &settings, 3, 3);
        let lower = weights_at(&edges, &lookup, &settings, 4, 4);
        assert!(upper[2] + upper[3] > 0.0);
        assert!(lower[2] + lower[3] > 0.0);
        assert!(upper[2] != STRAIGHT_EDGE_COVERAGE || upper[3] != STRAIGHT_EDGE_COVERAGE);
    }

    #[test]
    fn test_no_edge_no_weight() {
        let edges = Surface::new(4, 4);
        let settings = SmaaPreset::Ultra.settings();
        let mut out = Surface::filled(4, 4, [1.0; 4]);
        compute(&edges, &SmaaLookup::shared(), &settings, &mut out);
        assert!(out.data.iter().all(|t| *t == [0.0; 4]));
    }
}
