use serde::{Deserialize, Serialize};

/// A 3x3 matrix stored column-major, matching WGSL `mat3x3<f32>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat3 {
    pub cols: [[f32; 3]; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        cols: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Build from row-major entries, the order matrices are usually written in.
    pub fn from_rows(rows: [[f32; 3]; 3]) -> Self {
        let mut cols = [[0.0; 3]; 3];
        for (r, row) in rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                cols[c][r] = *v;
            }
        }
        Self { cols }
    }

    /// Transform a 2D point with an implicit `w = 1`.
    pub fn transform_point(&self, p: [f32; 2]) -> [f32; 2] {
        let c = &self.cols;
        [
            c[0][0] * p[0] + c[1][0] * p[1] + c[2][0],
            c[0][1] * p[0] + c[1][1] * p[1] + c[2][1],
        ]
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Texture coordinate transform: offset, repeat, rotation (radians) about a center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvTransform {
    pub offset: [f32; 2],
    pub repeat: [f32; 2],
    pub rotation: f32,
    pub center: [f32; 2],
}

impl UvTransform {
    pub fn identity() -> Self {
        Self {
            offset: [0.0, 0.0],
            repeat: [1.0, 1.0],
            rotation: 0.0,
            center: [0.0, 0.0],
        }
    }

    /// The matrix mapping screen UVs to texture UVs.
    pub fn matrix(&self) -> Mat3 {
        let (s, c) = self.rotation.sin_cos();
        let [sx, sy] = self.repeat;
        let [cx, cy] = self.center;
        let [tx, ty] = self.offset;
        Mat3::from_rows([
            [sx * c, sx * s, -sx * (c * cx + s * cy) + cx + tx],
            [-sy * s, sy * c, -sy * (-s * cx + c * cy) + cy + ty],
            [0.0, 0.0, 1.0],
        ])
    }

    pub fn apply(&self, uv: [f32; 2]) -> [f32; 2] {
        self.matrix().transform_point(uv)
    }
}

impl Default for UvTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 2], b: [f32; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn test_identity_transform() {
        assert_eq!(UvTransform::identity().matrix(), Mat3::IDENTITY);
        assert!(close(UvTransform::identity().apply([0.3, 0.7]), [0.3, 0.7]));
    }

    #[test]
    fn test_offset_and_repeat() {
        let t = UvTransform {
            offset: [0.5, 0.0],
            repeat: [2.0, 2.0],
            ..UvTransform::identity()
        };
        assert!(close(t.apply([0.25, 0.25]), [1.0, 0.5]));
    }

    #[test]
    fn test_rotation_about_center_keeps_center_fixed() {
        let t = UvTransform {
            rotation: std::f32::consts::FRAC_PI_2,
            center: [0.5, 0.5],
            ..UvTransform::identity()
        };
        assert!(close(t.apply([0.5, 0.5]), [0.5, 0.5]));
        assert!(!close(t.apply([1.0, 0.5]), [1.0, 0.5]));
    }

    #[test]
    fn test_from_rows_is_column_major() {
        let m = Mat3::from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(m.cols[0], [1.0, 4.0, 7.0]);
        assert_eq!(m.transform_point([0.0, 0.0]), [3.0, 6.0]);
    }
}
