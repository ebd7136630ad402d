use crate::canvas_transform::CanvasTransform;
use crate::tile::TileId;
use serde::{Deserialize, Serialize};

/// Permanent identifier of a [`TileGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Rigid transform and fill color shared by one or more tiles.
///
/// The learnable parameters are `angle`, `translation` and `color`. For opaque groups
/// only the RGB channels of `color` are learnable and the fill alpha is always 1; for
/// transparent groups all four channels are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGroup {
    pub id: GroupId,
    /// Tiles transformed and colored by this group, in paint order.
    pub members: Vec<TileId>,
    /// Learnable rotation in radians, before scaling by `angle_coe`.
    pub angle: f32,
    /// Learnable translation, before scaling by `translation_coe`.
    pub translation: [f32; 2],
    pub angle_coe: f32,
    pub translation_coe: [f32; 2],
    /// RGBA fill in `[0, 1]`. The alpha slot is ignored for opaque groups.
    pub color: [f32; 4],
    pub transparent: bool,
}

impl TileGroup {
    /// Creates an untransformed group.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::tile::TileId;
    /// # use tilemosaic::tile_group::{GroupId, TileGroup};
    /// # use tilemosaic::canvas_transform::CanvasTransform;
    /// let group = TileGroup::new(GroupId(0), vec![TileId(0)], [0.2, 0.4, 0.6, 0.5], false);
    /// assert_eq!(group.canvas_transform(), CanvasTransform::identity());
    /// assert_eq!(group.fill_color(), [0.2, 0.4, 0.6, 1.0]);
    /// ```
    pub fn new(id: GroupId, members: Vec<TileId>, color: [f32; 4], transparent: bool) -> Self {
        TileGroup {
            id,
            members,
            angle: 0.0,
            translation: [0.0, 0.0],
            angle_coe: 1.0,
            translation_coe: [1.0, 1.0],
            color,
            transparent,
        }
    }

    /// Sets the fixed scaling of the learnable angle and translation.
    pub fn with_coefficients(mut self, angle_coe: f32, translation_coe: [f32; 2]) -> Self {
        self.angle_coe = angle_coe;
        self.translation_coe = translation_coe;
        self
    }

    /// Angle actually applied to the shapes, in radians.
    pub fn scaled_angle(&self) -> f32 {
        self.angle * self.angle_coe
    }

    /// Translation actually applied to the shapes, in canvas pixels.
    pub fn scaled_translation(&self) -> [f32; 2] {
        [
            self.translation[0] * self.translation_coe[0],
            self.translation[1] * self.translation_coe[1],
        ]
    }

    /// Shape-to-canvas transform derived from the current angle and translation.
    pub fn canvas_transform(&self) -> CanvasTransform {
        let [tx, ty] = self.scaled_translation();
        CanvasTransform::from_rotation_translation(self.scaled_angle(), tx, ty)
    }

    /// Fill color handed to the renderer.
    pub fn fill_color(&self) -> [f32; 4] {
        if self.transparent {
            self.color
        } else {
            [self.color[0], self.color[1], self.color[2], 1.0]
        }
    }

    /// Number of learnable color channels.
    pub fn color_channels(&self) -> usize {
        if self.transparent {
            4
        } else {
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parameters_give_identity_for_any_coefficients() {
        let group = TileGroup::new(GroupId(7), vec![TileId(7)], [1.0, 0.0, 0.0, 1.0], false)
            .with_coefficients(3.0, [224.0, 224.0]);
        let m = group.canvas_transform();
        assert_eq!(*m.matrix(), nalgebra::Matrix3::identity());
    }

    #[test]
    fn coefficients_scale_angle_and_translation() {
        let mut group = TileGroup::new(GroupId(0), vec![TileId(0)], [0.0; 4], false)
            .with_coefficients(2.0, [224.0, 100.0]);
        group.angle = 0.25;
        group.translation = [0.5, -0.1];
        assert_eq!(group.scaled_angle(), 0.5);
        assert_eq!(group.scaled_translation(), [112.0, -10.0]);
        let (tx, ty) = group.canvas_transform().translation();
        assert_eq!((tx, ty), (112.0, -10.0));
    }

    #[test]
    fn transparent_groups_keep_alpha() {
        let group = TileGroup::new(GroupId(0), vec![], [0.1, 0.2, 0.3, 0.4], true);
        assert_eq!(group.fill_color(), [0.1, 0.2, 0.3, 0.4]);
        assert_eq!(group.color_channels(), 4);
    }
}
