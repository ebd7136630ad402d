use nalgebra::{Matrix3, Point2};

/// Represents the shape-to-canvas transform of a tile group as a 3×3 homogeneous
/// matrix. The top two rows hold a 2×2 rotation and a translation column; the bottom
/// row is always `[0, 0, 1]`.
///
/// A point `(x, y)` in shape space is mapped to canvas space by:
///
/// ```text
///   X = x * cos(a) - y * sin(a) + tx;
///   Y = x * sin(a) + y * cos(a) + ty;
/// ```
///
/// The rotation pivots around the canvas origin, not around the tile.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CanvasTransform {
    matrix: Matrix3<f32>,
}

impl CanvasTransform {
    /// The transform that leaves every point in place.
    pub fn identity() -> Self {
        CanvasTransform {
            matrix: Matrix3::identity(),
        }
    }

    /// Builds a rotation by `angle` radians composed with a translation by
    /// `(translate_x, translate_y)`.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::canvas_transform::CanvasTransform;
    /// let t = CanvasTransform::from_rotation_translation(0.0, 0.0, 0.0);
    /// assert_eq!(t, CanvasTransform::identity());
    ///
    /// let t = CanvasTransform::from_rotation_translation(std::f32::consts::FRAC_PI_2, 5.0, 0.0);
    /// let (x, y) = t.apply(1.0, 0.0);
    /// assert!((x - 5.0).abs() < 1e-6 && (y - 1.0).abs() < 1e-6);
    /// ```
    pub fn from_rotation_translation(angle: f32, translate_x: f32, translate_y: f32) -> Self {
        let (s, c) = angle.sin_cos();
        CanvasTransform {
            matrix: Matrix3::new(
                c, -s, translate_x,
                s, c, translate_y,
                0.0, 0.0, 1.0,
            ),
        }
    }

    /// Full 3×3 homogeneous matrix.
    pub fn matrix(&self) -> &Matrix3<f32> {
        &self.matrix
    }

    /// Transform a point (x, y) from shape space to canvas space.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.matrix;
        (
            m[(0, 0)] * x + m[(0, 1)] * y + m[(0, 2)],
            m[(1, 0)] * x + m[(1, 1)] * y + m[(1, 2)],
        )
    }

    /// Same as [`CanvasTransform::apply`] on an nalgebra point.
    pub fn apply_point(&self, p: &Point2<f32>) -> Point2<f32> {
        let (x, y) = self.apply(p.x, p.y);
        Point2::new(x, y)
    }

    /// The inverse transform, or `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<CanvasTransform> {
        self.matrix
            .try_inverse()
            .map(|matrix| CanvasTransform { matrix })
    }

    /// Rotation angle encoded in the linear part, in degrees.
    pub fn rotation_degrees(&self) -> f32 {
        self.matrix[(1, 0)].atan2(self.matrix[(0, 0)]).to_degrees()
    }

    /// Translation column of the matrix.
    pub fn translation(&self) -> (f32, f32) {
        (self.matrix[(0, 2)], self.matrix[(1, 2)])
    }
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self::identity()
    }
}
