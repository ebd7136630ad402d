use crate::scene::Scene;
use crate::tile::{Tile, TileId};
use crate::tile_group::{GroupId, TileGroup};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A regular layout of tiles over a canvas, used to build the initial [`Scene`].
///
/// Tile anchors are placed every `spacing` pixels starting at the canvas origin; each
/// tile is `tile_size` pixels large, so `spacing - tile_size` is the gap between
/// neighbors. Tiles are emitted column by column (all rows of column 0 first).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGrid {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Distance between the anchors of adjacent tiles.
    pub spacing: u32,
    /// Width and height of every tile.
    pub tile_size: f32,
}

impl TileGrid {
    /// Creates a grid description.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::tile_grid::TileGrid;
    /// let grid = TileGrid::new(224, 224, 16, 14.0);
    /// assert_eq!(grid.get_grid_width(), 14);
    /// assert_eq!(grid.get_grid_height(), 14);
    /// ```
    pub fn new(width: u32, height: u32, spacing: u32, tile_size: f32) -> Self {
        TileGrid {
            width,
            height,
            spacing: spacing.max(1),
            tile_size,
        }
    }

    /// 16 px spacing with 14 px tiles, the layout used for prompt fitting.
    pub fn similarity_layout(width: u32, height: u32) -> Self {
        Self::new(width, height, 16, 14.0)
    }

    /// Ten touching cells per axis, the layout used for target fitting.
    pub fn pixel_layout(width: u32, height: u32) -> Self {
        let spacing = (width / 10).max(1);
        Self::new(width, height, spacing, spacing as f32)
    }

    /// Returns the number of columns.
    pub fn get_grid_width(&self) -> usize {
        self.width.div_ceil(self.spacing) as usize
    }

    /// Returns the number of rows.
    pub fn get_grid_height(&self) -> usize {
        self.height.div_ceil(self.spacing) as usize
    }

    /// Anchors of every tile in emission order.
    pub fn anchors(&self) -> Vec<[f32; 2]> {
        let mut anchors = Vec::with_capacity(self.get_grid_width() * self.get_grid_height());
        for x in (0..self.width).step_by(self.spacing as usize) {
            for y in (0..self.height).step_by(self.spacing as usize) {
                anchors.push([x as f32, y as f32]);
            }
        }
        anchors
    }

    /// Builds a scene with one opaque group per tile. Colors are drawn uniformly from
    /// `[0, 1)` with a generator seeded by `seed`; translations are scaled by the canvas
    /// size so that a unit translation moves a tile across the whole canvas.
    pub fn build_scene(&self, seed: u64) -> Scene {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_scene_with(|_| [rng.gen(), rng.gen(), rng.gen()])
    }

    /// Builds a scene with colors chosen by `color_at(anchor)`.
    pub fn build_scene_with(&self, mut color_at: impl FnMut([f32; 2]) -> [f32; 3]) -> Scene {
        let mut scene = Scene::new(self.width, self.height);
        let translation_coe = [self.width as f32, self.height as f32];
        for anchor in self.anchors() {
            let [r, g, b] = color_at(anchor);
            let tile = Tile::new(TileId(0), anchor, [self.tile_size, self.tile_size]);
            let group = TileGroup::new(GroupId(0), vec![], [r, g, b, 1.0], false)
                .with_coefficients(1.0, translation_coe);
            scene.push(tile, group);
        }
        scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_layout_is_fourteen_by_fourteen() {
        let grid = TileGrid::similarity_layout(224, 224);
        let scene = grid.build_scene(1);
        assert_eq!(scene.len(), 196);
        assert_eq!(scene.tiles()[0].upper_left, [0.0, 0.0]);
        assert_eq!(scene.tiles()[1].upper_left, [0.0, 16.0]);
        assert_eq!(scene.tiles()[14].upper_left, [16.0, 0.0]);
        assert_eq!(scene.tiles()[195].upper_left, [208.0, 208.0]);
        assert_eq!(scene.groups()[0].translation_coe, [224.0, 224.0]);
    }

    #[test]
    fn pixel_layout_cells_touch() {
        let grid = TileGrid::pixel_layout(100, 100);
        let scene = grid.build_scene(0);
        assert_eq!(scene.len(), 100);
        assert_eq!(scene.tiles()[0].base_size, [10.0, 10.0]);
    }

    #[test]
    fn same_seed_same_colors() {
        let a = TileGrid::similarity_layout(64, 64).build_scene(42);
        let b = TileGrid::similarity_layout(64, 64).build_scene(42);
        let c = TileGrid::similarity_layout(64, 64).build_scene(43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.groups().iter().all(|g| g.color.iter().all(|c| (0.0..=1.0).contains(c))));
    }
}
