//! Neighborhood blending: the last SMAA stage.

use rayon::prelude::*;

use lumen_core::Surface;

/// Blend one pixel with its neighbours using the weight map.
pub fn blend_at(color: &Surface, weights: &Surface, x: i64, y: i64) -> [f32; 4] {
    let c = color.fetch(x, y);
    let own = weights.fetch_or_zero(x, y);
    let pulls = [
        (own[2], color.fetch(x - 1, y)),
        (weights.fetch_or_zero(x + 1, y)[3], color.fetch(x + 1, y)),
        (own[0], color.fetch(x, y - 1)),
        (weights.fetch_or_zero(x, y + 1)[1], color.fetch(x, y + 1)),
    ];
    let sum: f32 = pulls.iter().map(|(w, _)| w).sum();
    if sum <= 0.0 {
        return c;
    }

    let mut result = c;
    if sum <= 1.0 {
        for (w, n) in pulls {
            for i in 0..4 {
                result[i] += w * (n[i] - c[i]);
            }
        }
    } else {
        result = [0.0; 4];
        for (w, n) in pulls {
            for i in 0..4 {
                result[i] += w / sum * n[i];
            }
        }
    }
    result
}

pub fn blend(color: &Surface, weights: &Surface, output: &mut Surface) {
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
                *texel = blend_at(color, weights, x as i64, y as i64);
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_weights_reproduce_input() {
        let color = Surface::from_fn(5, 3, |x, y| [x as f32 * 0.2, y as f32 * 0.3, 0.5, 1.0]);
        let weights = Surface::new(5, 3);
        let mut out = Surface::new(5, 3);
        blend(&color, &weights, &mut out);
        assert_eq!(out, color);
    }

    #[test]
    fn test_left_pull_mixes_toward_left_neighbour() {
        let color = Surface::from_fn(2, 1, |x, _| if x == 0 { [0.0, 0.0, 0.0, 1.0] } else { [1.0; 4] });
        let mut weights = Surface::new(2, 1);
        weights.set(1, 0, [0.0, 0.0, 0.25, 0.25]);
        let right = blend_at(&color, &weights, 1, 0);
        let left = blend_at(&color, &weights, 0, 0);
        assert!((right[0] - 0.75).abs() < 1e-6);
        assert!((left[0] - 0.25).abs() < 1e-6);
        assert_eq!(right[3], 1.0);
    }

    #[test]
    fn test_weights_above_one_are_normalized() {
        let color = Surface::from_fn(3, 1, |x, _| [x as f32 * 0.5, 0.0, 0.0, 1.0]);
        let mut weights = Surface::new(3, 1);
        weights.set(1, 0, [0.0, 0.0, 1.0, 0.0]);
        weights.set(2, 0, [0.0, 0.0, 0.0, 1.0]);
        let mid = blend_at(&color, &weights, 1, 0);
        assert!((mid[0] - 0.5).abs() < 1e-6);
    }
}
