use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Permanent identifier of a [`Tile`]. Ids are assigned once at creation and never
/// reused or renumbered, so group memberships stay valid while tiles are removed and
/// reinserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u32);

/// A deformable rectangle anchored at its upper-left corner.
///
/// Only `delta` is learnable. The effective size of the tile is
/// `base_size + delta * delta_coe`, applied per axis, and the rectangle grows or
/// shrinks away from `upper_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    pub id: TileId,
    /// Anchor of the tile in canvas pixels.
    pub upper_left: [f32; 2],
    /// Width and height at zero delta.
    pub base_size: [f32; 2],
    /// Learnable size offset, zero at creation.
    pub delta: [f32; 2],
    /// Fixed per-axis scale applied to `delta`.
    pub delta_coe: [f32; 2],
}

impl Tile {
    /// Creates a tile with zero delta and unit delta coefficients.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::tile::{Tile, TileId};
    /// let tile = Tile::new(TileId(0), [16.0, 32.0], [14.0, 14.0]);
    /// assert_eq!(tile.delta, [0.0, 0.0]);
    /// assert_eq!(tile.effective_size(), [14.0, 14.0]);
    /// ```
    pub fn new(id: TileId, upper_left: [f32; 2], base_size: [f32; 2]) -> Self {
        Tile {
            id,
            upper_left,
            base_size,
            delta: [0.0, 0.0],
            delta_coe: [1.0, 1.0],
        }
    }

    /// Same as [`Tile::new`] with an explicit delta coefficient.
    pub fn with_delta_coe(id: TileId, upper_left: [f32; 2], base_size: [f32; 2], delta_coe: [f32; 2]) -> Self {
        Tile {
            delta_coe,
            ..Tile::new(id, upper_left, base_size)
        }
    }

    /// The size offset after scaling by `delta_coe`.
    pub fn scaled_delta(&self) -> [f32; 2] {
        [self.delta[0] * self.delta_coe[0], self.delta[1] * self.delta_coe[1]]
    }

    /// Width and height of the deformed rectangle.
    pub fn effective_size(&self) -> [f32; 2] {
        let d = self.scaled_delta();
        [self.base_size[0] + d[0], self.base_size[1] + d[1]]
    }

    /// The four corners of the deformed rectangle in shape space, clockwise from the
    /// upper-left anchor. The anchor itself never moves; the right edge follows the
    /// x delta and the bottom edge follows the y delta.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::tile::{Tile, TileId};
    /// let mut tile = Tile::with_delta_coe(TileId(3), [10.0, 20.0], [14.0, 14.0], [2.0, 1.0]);
    /// tile.delta = [1.0, -4.0];
    /// let p = tile.corner_points();
    /// assert_eq!((p[0].x, p[0].y), (10.0, 20.0));
    /// assert_eq!((p[2].x, p[2].y), (26.0, 30.0));
    /// ```
    pub fn corner_points(&self) -> [Point2<f32>; 4] {
        let [x, y] = self.upper_left;
        let [w, h] = self.effective_size();
        [
            Point2::new(x, y),
            Point2::new(x + w, y),
            Point2::new(x + w, y + h),
            Point2::new(x, y + h),
        ]
    }

    /// Center of the deformed rectangle in shape space.
    pub fn center(&self) -> Point2<f32> {
        let [w, h] = self.effective_size();
        Point2::new(self.upper_left[0], self.upper_left[1]) + Vector2::new(w * 0.5, h * 0.5)
    }

    /// Center of the undeformed rectangle.
    pub fn rest_center(&self) -> Point2<f32> {
        Point2::new(
            self.upper_left[0] + self.base_size[0] * 0.5,
            self.upper_left[1] + self.base_size[1] * 0.5,
        )
    }
}
