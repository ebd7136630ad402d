use crate::canvas_transform::CanvasTransform;
use crate::error::{MosaicError, Result};
use crate::tile::{Tile, TileId};
use crate::tile_group::{GroupId, TileGroup};
use nalgebra::Point2;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// The four families of learnable parameters. Each family has its own optimizer and
/// learning rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamFamily {
    Color,
    Delta,
    Angle,
    Translation,
}

impl ParamFamily {
    pub const ALL: [ParamFamily; 4] = [
        ParamFamily::Color,
        ParamFamily::Delta,
        ParamFamily::Angle,
        ParamFamily::Translation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamFamily::Color => "color",
            ParamFamily::Delta => "delta",
            ParamFamily::Angle => "angle",
            ParamFamily::Translation => "translation",
        }
    }
}

impl fmt::Display for ParamFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Materialized geometry of one tile, ready for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeArgs {
    pub id: TileId,
    pub points: [Point2<f32>; 4],
}

/// Materialized appearance of one group, ready for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupArgs {
    pub id: GroupId,
    /// Positions into [`SceneArgs::shapes`].
    pub shape_indices: Vec<usize>,
    pub fill: [f32; 4],
    pub shape_to_canvas: CanvasTransform,
}

/// Renderer input derived from a [`Scene`]. It holds no learnable state; it is rebuilt
/// from the current parameter values for every render.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneArgs {
    pub width: u32,
    pub height: u32,
    pub shapes: Vec<ShapeArgs>,
    pub groups: Vec<GroupArgs>,
}

/// Ordered tiles and their groups on a fixed-size canvas.
///
/// In this application every group colors exactly one tile and `tiles[i]` pairs with
/// `groups[i]`. Memberships reference permanent [`TileId`]s, so taking a tile out and
/// putting it back never requires renumbering the other groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    tiles: Vec<Tile>,
    groups: Vec<TileGroup>,
    next_tile_id: u32,
    next_group_id: u32,
}

impl Scene {
    /// Creates an empty scene.
    pub fn new(width: u32, height: u32) -> Self {
        Scene {
            width,
            height,
            tiles: Vec::new(),
            groups: Vec::new(),
            next_tile_id: 0,
            next_group_id: 0,
        }
    }

    /// Builds a scene from existing tiles and groups, e.g. after loading them from disk.
    pub fn from_parts(width: u32, height: u32, tiles: Vec<Tile>, groups: Vec<TileGroup>) -> Result<Self> {
        if tiles.len() != groups.len() {
            return Err(MosaicError::SceneMismatch {
                tiles: tiles.len(),
                groups: groups.len(),
            });
        }
        let next_tile_id = tiles.iter().map(|t| t.id.0 + 1).max().unwrap_or(0);
        let next_group_id = groups.iter().map(|g| g.id.0 + 1).max().unwrap_or(0);
        Ok(Scene {
            width,
            height,
            tiles,
            groups,
            next_tile_id,
            next_group_id,
        })
    }

    /// Appends a tile together with the single-member group that colors it, assigning
    /// fresh ids to both. The `id` and `members` passed in are overwritten.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::scene::Scene;
    /// # use tilemosaic::tile::{Tile, TileId};
    /// # use tilemosaic::tile_group::{GroupId, TileGroup};
    /// let mut scene = Scene::new(32, 32);
    /// let tile = Tile::new(TileId(0), [0.0, 0.0], [8.0, 8.0]);
    /// let group = TileGroup::new(GroupId(0), vec![], [1.0, 0.0, 0.0, 1.0], false);
    /// let (a, _) = scene.push(tile.clone(), group.clone());
    /// let (b, _) = scene.push(tile, group);
    /// assert_ne!(a, b);
    /// assert_eq!(scene.groups()[1].members, vec![b]);
    /// ```
    pub fn push(&mut self, mut tile: Tile, mut group: TileGroup) -> (TileId, GroupId) {
        let tile_id = TileId(self.next_tile_id);
        let group_id = GroupId(self.next_group_id);
        self.next_tile_id += 1;
        self.next_group_id += 1;
        tile.id = tile_id;
        group.id = group_id;
        group.members = vec![tile_id];
        self.tiles.push(tile);
        self.groups.push(group);
        (tile_id, group_id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn groups(&self) -> &[TileGroup] {
        &self.groups
    }

    pub fn tile_mut(&mut self, index: usize) -> &mut Tile {
        &mut self.tiles[index]
    }

    pub fn group_mut(&mut self, index: usize) -> &mut TileGroup {
        &mut self.groups[index]
    }

    /// Takes the tile and group at `index` out of the scene. Memberships of the
    /// remaining groups are untouched.
    pub fn remove_at(&mut self, index: usize) -> (Tile, TileGroup) {
        let tile = self.tiles.remove(index);
        let group = self.groups.remove(index);
        (tile, group)
    }

    /// Puts a tile and group back at `index`, the exact inverse of [`Scene::remove_at`].
    pub fn insert_at(&mut self, index: usize, tile: Tile, group: TileGroup) {
        self.tiles.insert(index, tile);
        self.groups.insert(index, group);
    }

    /// Derives renderer input from the current parameters.
    ///
    /// Member ids that no longer refer to a tile in the scene are dropped, and groups
    /// left without any member are skipped.
    pub fn assemble(&self) -> SceneArgs {
        let positions: HashMap<TileId, usize> = self
            .tiles
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, i))
            .collect();

        let shapes = self
            .tiles
            .iter()
            .map(|t| ShapeArgs {
                id: t.id,
                points: t.corner_points(),
            })
            .collect();

        let groups = self
            .groups
            .iter()
            .filter_map(|g| {
                let shape_indices: Vec<usize> = g
                    .members
                    .iter()
                    .filter_map(|id| positions.get(id).copied())
                    .collect();
                if shape_indices.is_empty() {
                    return None;
                }
                Some(GroupArgs {
                    id: g.id,
                    shape_indices,
                    fill: g.fill_color(),
                    shape_to_canvas: g.canvas_transform(),
                })
            })
            .collect();

        SceneArgs {
            width: self.width,
            height: self.height,
            shapes,
            groups,
        }
    }

    /// Number of scalar parameters in `family`.
    pub fn param_count(&self, family: ParamFamily) -> usize {
        match family {
            ParamFamily::Color => self.groups.iter().map(|g| g.color_channels()).sum(),
            ParamFamily::Delta => self.tiles.len() * 2,
            ParamFamily::Angle => self.groups.len(),
            ParamFamily::Translation => self.groups.len() * 2,
        }
    }

    /// Flattens the parameters of `family` in scene order.
    pub fn parameters(&self, family: ParamFamily) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.param_count(family));
        match family {
            ParamFamily::Color => {
                for g in &self.groups {
                    out.extend_from_slice(&g.color[..g.color_channels()]);
                }
            }
            ParamFamily::Delta => {
                for t in &self.tiles {
                    out.extend_from_slice(&t.delta);
                }
            }
            ParamFamily::Angle => out.extend(self.groups.iter().map(|g| g.angle)),
            ParamFamily::Translation => {
                for g in &self.groups {
                    out.extend_from_slice(&g.translation);
                }
            }
        }
        out
    }

    /// Writes back a flattened parameter vector produced by [`Scene::parameters`].
    pub fn set_parameters(&mut self, family: ParamFamily, values: &[f32]) -> Result<()> {
        let expected = self.param_count(family);
        if values.len() != expected {
            return Err(MosaicError::ParameterLength {
                family: family.name(),
                expected,
                actual: values.len(),
            });
        }
        match family {
            ParamFamily::Color => {
                let mut offset = 0;
                for g in &mut self.groups {
                    let n = g.color_channels();
                    g.color[..n].copy_from_slice(&values[offset..offset + n]);
                    offset += n;
                }
            }
            ParamFamily::Delta => {
                for (t, v) in self.tiles.iter_mut().zip(values.chunks_exact(2)) {
                    t.delta = [v[0], v[1]];
                }
            }
            ParamFamily::Angle => {
                for (g, v) in self.groups.iter_mut().zip(values) {
                    g.angle = *v;
                }
            }
            ParamFamily::Translation => {
                for (g, v) in self.groups.iter_mut().zip(values.chunks_exact(2)) {
                    g.translation = [v[0], v[1]];
                }
            }
        }
        Ok(())
    }

    /// Sets a single scalar of `family` at its flat `index`.
    pub fn set_parameter(&mut self, family: ParamFamily, index: usize, value: f32) {
        match family {
            ParamFamily::Color => {
                let mut offset = 0;
                for g in &mut self.groups {
                    let n = g.color_channels();
                    if index < offset + n {
                        g.color[index - offset] = value;
                        return;
                    }
                    offset += n;
                }
            }
            ParamFamily::Delta => self.tiles[index / 2].delta[index % 2] = value,
            ParamFamily::Angle => self.groups[index].angle = value,
            ParamFamily::Translation => self.groups[index / 2].translation[index % 2] = value,
        }
    }

    /// Persists tiles and groups to two JSON files.
    pub fn save(&self, tiles_path: impl AsRef<Path>, groups_path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer(BufWriter::new(File::create(tiles_path)?), &self.tiles)?;
        serde_json::to_writer(BufWriter::new(File::create(groups_path)?), &self.groups)?;
        Ok(())
    }

    /// Reads tiles and groups written by [`Scene::save`].
    pub fn load(
        width: u32,
        height: u32,
        tiles_path: impl AsRef<Path>,
        groups_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let tiles: Vec<Tile> = serde_json::from_reader(BufReader::new(File::open(tiles_path)?))?;
        let groups: Vec<TileGroup> = serde_json::from_reader(BufReader::new(File::open(groups_path)?))?;
        Scene::from_parts(width, height, tiles, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_tile_scene() -> Scene {
        let mut scene = Scene::new(64, 64);
        for i in 0..3 {
            let tile = Tile::new(TileId(0), [i as f32 * 16.0, 0.0], [14.0, 14.0]);
            let group = TileGroup::new(GroupId(0), vec![], [0.1 * i as f32, 0.5, 0.5, 1.0], false);
            scene.push(tile, group);
        }
        scene
    }

    #[test]
    fn remove_and_insert_restore_scene_exactly() {
        let mut scene = three_tile_scene();
        scene.tile_mut(1).delta = [0.25, -0.5];
        let before = scene.clone();
        for i in 0..scene.len() {
            let (tile, group) = scene.remove_at(i);
            assert_eq!(scene.len(), 2);
            scene.insert_at(i, tile, group);
            assert_eq!(scene, before);
        }
    }

    #[test]
    fn assemble_resolves_members_to_current_positions() {
        let mut scene = three_tile_scene();
        let (_tile, _group) = scene.remove_at(0);
        let args = scene.assemble();
        assert_eq!(args.shapes.len(), 2);
        assert_eq!(args.groups[0].shape_indices, vec![0]);
        assert_eq!(args.groups[1].shape_indices, vec![1]);
        assert_eq!(args.groups[1].id, GroupId(2));
    }

    #[test]
    fn groups_without_members_are_not_rendered() {
        let mut scene = three_tile_scene();
        scene.group_mut(2).members = vec![TileId(99)];
        assert_eq!(scene.assemble().groups.len(), 2);
    }

    #[test]
    fn parameters_round_trip_through_flat_vectors() {
        let mut scene = three_tile_scene();
        scene.group_mut(1).transparent = true;
        for family in ParamFamily::ALL {
            let mut values = scene.parameters(family);
            assert_eq!(values.len(), scene.param_count(family));
            for (i, v) in values.iter_mut().enumerate() {
                *v = i as f32 * 0.01;
            }
            scene.set_parameters(family, &values).unwrap();
            assert_eq!(scene.parameters(family), values);
        }
        assert_eq!(scene.param_count(ParamFamily::Color), 10);
        assert_eq!(scene.groups()[1].color[3], 6.0f32 * 0.01);
    }

    #[test]
    fn set_parameter_matches_flat_layout() {
        let mut scene = three_tile_scene();
        scene.group_mut(0).transparent = true;
        scene.set_parameter(ParamFamily::Color, 4, 0.9);
        assert_eq!(scene.groups()[1].color[0], 0.9);
        scene.set_parameter(ParamFamily::Delta, 3, 2.0);
        assert_eq!(scene.tiles()[1].delta, [0.0, 2.0]);
        scene.set_parameter(ParamFamily::Translation, 5, -1.0);
        assert_eq!(scene.groups()[2].translation, [0.0, -1.0]);
    }

    #[test]
    fn wrong_parameter_length_is_rejected() {
        let mut scene = three_tile_scene();
        assert!(scene.set_parameters(ParamFamily::Angle, &[0.0; 2]).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let mut scene = three_tile_scene();
        scene.tile_mut(0).delta = [1.5, -0.125];
        scene.group_mut(2).angle = 0.3;
        scene.group_mut(2).translation = [0.01, 0.02];
        scene.group_mut(1).color = [0.123456, 0.5, 0.75, 1.0];
        scene.remove_at(1);

        let dir = std::env::temp_dir();
        let tiles_path = dir.join("tilemosaic_scene_tiles.json");
        let groups_path = dir.join("tilemosaic_scene_groups.json");
        scene.save(&tiles_path, &groups_path).unwrap();
        let loaded = Scene::load(64, 64, &tiles_path, &groups_path).unwrap();
        assert_eq!(loaded, scene);

        std::fs::remove_file(tiles_path).unwrap();
        std::fs::remove_file(groups_path).unwrap();
    }
}
