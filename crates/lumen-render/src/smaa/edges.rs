//! Edge detection: the first SMAA stage.
//!
//! Output texel `[r, g, 0, 0]`: `r` marks an edge between the pixel and its
//! left neighbour, `g` one between the pixel and its top neighbour.

use rayon::prelude::*;

use lumen_core::color::luma;
use lumen_core::Surface;

use super::EdgeDetectionMode;

/// An edge survives local contrast adaptation when its delta is at least
/// `1 / LOCAL_CONTRAST_FACTOR` of the strongest neighbouring delta.
pub const LOCAL_CONTRAST_FACTOR: f32 = 2.0;

fn delta(mode: EdgeDetectionMode, a: [f32; 4], b: [f32; 4]) -> f32 {
    match mode {
        EdgeDetectionMode::Luma => (luma(a) - luma(b)).abs(),
        EdgeDetectionMode::Color => (0..3).map(|i| (a[i] - b[i]).abs()).fold(0.0, f32::max),
        EdgeDetectionMode::Depth => (a[0] - b[0]).abs(),
    }
}

/// Edge mask of one texel.
pub fn detect_at(source: &Surface, mode: EdgeDetectionMode, threshold: f32, x: i64, y: i64) -> [f32; 4] {
    let center = source.fetch(x, y);
    let left = source.fetch(x - 1, y);
    let top = source.fetch(x, y - 1);
    let d_left = delta(mode, center, left);
    let d_top = delta(mode, center, top);

    let mut edge_left = d_left >= threshold;
    let mut edge_top = d_top >= threshold;
    if !edge_left && !edge_top {
        return [0.0; 4];
    }

    // depth discontinuities are geometric, no adaptation
    if mode != EdgeDetectionMode::Depth {
        let max_delta = [
            d_left,
            d_top,
            delta(mode, center, source.fetch(x + 1, y)),
            delta(mode, center, source.fetch(x, y + 1)),
            delta(mode, left, source.fetch(x - 2, y)),
            delta(mode, top, source.fetch(x, y - 2)),
        ]
        .into_iter()
        .fold(0.0, f32::max);
        edge_left &= LOCAL_CONTRAST_FACTOR * d_left >= max_delta;
        edge_top &= LOCAL_CONTRAST_FACTOR * d_top >= max_delta;
    }

    [edge_left as u8 as f32, edge_top as u8 as f32, 0.0, 0.0]
}

/// Run edge detection over `source` into `output`.
pub fn detect(source: &Surface, mode: EdgeDetectionMode, threshold: f32, output: &mut Surface) {
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
                *texel = detect_at(source, mode, threshold, x as i64, y as i64);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(width: u32, height: u32, at: u32) -> Surface {
        Surface::from_fn(width, height, |x, _| {
            if x < at {
                [0.0, 0.0, 0.0, 1.0]
            } else {
                [1.0, 1.0, 1.0, 1.0]
            }
        })
    }

    #[test]
    fn test_vertical_boundary_marks_left_edges() {
        let source = split(6, 4, 3);
        let mut edges = Surface::new(6, 4);
        detect(&source, EdgeDetectionMode::Luma, 0.1, &mut edges);
        for y in 0..4 {
            for x in 0..6 {
                let expected = if x == 3 { 1.0 } else { 0.0 };
                assert_eq!(edges.at(x, y), [expected, 0.0, 0.0, 0.0], "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_flat_image_has_no_edges() {
        let source = Surface::filled(4, 4, [0.3, 0.6, 0.1, 1.0]);
        let mut edges = Surface::new(4, 4);
        detect(&source, EdgeDetectionMode::Color, 0.05, &mut edges);
        assert!(edges.data.iter().all(|t| *t == [0.0; 4]));
    }

    #[test]
    fn test_weak_edge_next_to_strong_one_is_dropped() {
        // luma 0.0 | 0.12 | 1.0: the 0.12 step is dominated by its right neighbour
        let values = [0.0, 0.0, 0.12, 1.0, 1.0];
        let source = Surface::from_fn(5, 1, |x, _| {
            let v = values[x as usize];
            [v, v, v, 1.0]
        });
        let mut edges = Surface::new(5, 1);
        detect(&source, EdgeDetectionMode::Luma, 0.1, &mut edges);
        assert_eq!(edges.at(2, 0)[0], 0.0);
        assert_eq!(edges.at(3, 0)[0], 1.0);
    }

    #[test]
    fn test_depth_mode_reads_red_channel() {
        let depth = Surface::from_fn(4, 4, |_, y| [if y < 2 { 0.2 } else { 0.5 }, 0.0, 0.0, 1.0]);
        let mut edges = Surface::new(4, 4);
        detect(&depth, EdgeDetectionMode::Depth, 0.01, &mut edges);
        assert_eq!(edges.at(1, 2), [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(edges.at(1, 1), [0.0; 4]);
    }
}
