use crate::coefficients::CoefficientBundle;
use crate::scene::Scene;
use image::Rgb32FImage;
use nalgebra::Point2;

/// Weighted values of every regularization term.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RegularizationTerms {
    pub delta: f32,
    pub displacement: f32,
    pub angle: f32,
    pub neighbor: f32,
    pub overlap: f32,
    pub joint: f32,
    pub image: f32,
}

impl RegularizationTerms {
    pub fn total(&self) -> f32 {
        self.delta + self.displacement + self.angle + self.neighbor + self.overlap + self.joint + self.image
    }
}

/// The `k` nearest tiles of every tile, by anchor position.
///
/// Pairs are directed: `(i, j)` is listed when `j` is among the nearest tiles of `i`.
/// A tile is never its own neighbor. Tiles at equal distance are taken in scene order.
#[derive(Debug, Clone, PartialEq)]
pub struct TileNeighborhood {
    pairs: Vec<(usize, usize)>,
}

impl TileNeighborhood {
    /// Builds the neighborhood of the current scene order.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::tile_grid::TileGrid;
    /// # use tilemosaic::regularization::TileNeighborhood;
    /// let scene = TileGrid::new(48, 16, 16, 14.0).build_scene(0);
    /// let hood = TileNeighborhood::build(&scene, 1);
    /// assert_eq!(hood.neighbors_of(0).collect::<Vec<_>>(), vec![1]);
    /// assert_eq!(hood.pairs().len(), 3);
    /// ```
    pub fn build(scene: &Scene, k: usize) -> Self {
        if k == 0 || scene.len() < 2 {
            return TileNeighborhood { pairs: Vec::new() };
        }
        let anchors: Vec<[f32; 2]> = scene.tiles().iter().map(|t| t.upper_left).collect();

        let mut pairs = Vec::with_capacity(anchors.len() * k.min(anchors.len() - 1));
        let mut candidates: Vec<(f32, usize)> = Vec::with_capacity(anchors.len());
        for (i, a) in anchors.iter().enumerate() {
            candidates.clear();
            candidates.extend(anchors.iter().enumerate().filter(|&(j, _)| j != i).map(|(j, b)| {
                let dx = b[0] - a[0];
                let dy = b[1] - a[1];
                (dx * dx + dy * dy, j)
            }));
            candidates.sort_by(|x, y| x.0.total_cmp(&y.0).then(x.1.cmp(&y.1)));
            pairs.extend(candidates.iter().take(k).map(|&(_, j)| (i, j)));
        }
        TileNeighborhood { pairs }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn neighbors_of(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.pairs.iter().filter(move |(i, _)| *i == index).map(|(_, j)| *j)
    }
}

/// `Σ_tiles Σ_axis reg_delta_coe[axis] · delta[axis]²`
pub fn delta_term(scene: &Scene, coe: &CoefficientBundle) -> f32 {
    scene
        .tiles()
        .iter()
        .map(|t| coe.reg_delta_coe[0] * t.delta[0].powi(2) + coe.reg_delta_coe[1] * t.delta[1].powi(2))
        .sum()
}

/// `Σ_groups Σ_axis reg_displacement_coe[axis] · translation[axis]²`
pub fn displacement_term(scene: &Scene, coe: &CoefficientBundle) -> f32 {
    scene
        .groups()
        .iter()
        .map(|g| {
            coe.reg_displacement_coe[0] * g.translation[0].powi(2)
                + coe.reg_displacement_coe[1] * g.translation[1].powi(2)
        })
        .sum()
}

/// `Σ_groups angle_coe · angle²`
pub fn angle_term(scene: &Scene, coe: &CoefficientBundle) -> f32 {
    scene.groups().iter().map(|g| coe.angle_coe * g.angle.powi(2)).sum()
}

/// Penalizes neighbors that differ in color, size offset or rotation.
pub fn neighbor_term(scene: &Scene, hood: &TileNeighborhood, coe: &CoefficientBundle) -> f32 {
    if coe.neighbor_coe == 0.0 {
        return 0.0;
    }
    let tiles = scene.tiles();
    let groups = scene.groups();
    let mut sum = 0.0;
    for &(i, j) in hood.pairs() {
        let ci = groups[i].fill_color();
        let cj = groups[j].fill_color();
        let color: f32 = ci.iter().zip(cj.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        let delta = (tiles[i].delta[0] - tiles[j].delta[0]).powi(2) + (tiles[i].delta[1] - tiles[j].delta[1]).powi(2);
        let angle = (groups[i].angle - groups[j].angle).powi(2);
        sum += color + delta + angle;
    }
    coe.neighbor_coe * sum
}

/// Penalizes the intersection area of the canvas bounding boxes of neighbors.
pub fn overlap_term(scene: &Scene, hood: &TileNeighborhood, coe: &CoefficientBundle) -> f32 {
    if coe.overlap_coe == 0.0 {
        return 0.0;
    }
    let boxes: Vec<([f32; 2], [f32; 2])> = (0..scene.len()).map(|i| canvas_bounds(scene, i)).collect();
    let sum: f32 = hood
        .pairs()
        .iter()
        .map(|&(i, j)| {
            let (min_i, max_i) = boxes[i];
            let (min_j, max_j) = boxes[j];
            let w = (max_i[0].min(max_j[0]) - min_i[0].max(min_j[0])).max(0.0);
            let h = (max_i[1].min(max_j[1]) - min_i[1].max(min_j[1])).max(0.0);
            w * h
        })
        .sum();
    coe.overlap_coe * sum
}

/// Penalizes changes of the distance between neighboring tile centers relative to the
/// initial layout.
pub fn joint_term(scene: &Scene, hood: &TileNeighborhood, coe: &CoefficientBundle) -> f32 {
    if coe.joint_coe == 0.0 {
        return 0.0;
    }
    let centers: Vec<Point2<f32>> = (0..scene.len()).map(|i| canvas_center(scene, i)).collect();
    let rest: Vec<Point2<f32>> = scene.tiles().iter().map(|t| t.rest_center()).collect();
    let sum: f32 = hood
        .pairs()
        .iter()
        .map(|&(i, j)| {
            let now = (centers[i] - centers[j]).norm();
            let before = (rest[i] - rest[j]).norm();
            (now - before).powi(2)
        })
        .sum();
    coe.joint_coe * sum
}

/// Total variation of a composited image: mean absolute difference between
/// horizontally adjacent pixels plus the same for vertically adjacent ones, over all
/// channels.
///
/// # Examples
/// ```
/// # use image::{Rgb, Rgb32FImage};
/// # use tilemosaic::regularization::total_variation;
/// let flat = Rgb32FImage::from_pixel(4, 4, Rgb([0.5, 0.5, 0.5]));
/// assert_eq!(total_variation(&flat), 0.0);
/// ```
pub fn total_variation(img: &Rgb32FImage) -> f32 {
    let (w, h) = img.dimensions();
    let mut horizontal = 0.0;
    let mut vertical = 0.0;
    for y in 0..h {
        for x in 0..w {
            let p = img.get_pixel(x, y).0;
            if x + 1 < w {
                let q = img.get_pixel(x + 1, y).0;
                horizontal += (0..3).map(|c| (p[c] - q[c]).abs()).sum::<f32>();
            }
            if y + 1 < h {
                let q = img.get_pixel(x, y + 1).0;
                vertical += (0..3).map(|c| (p[c] - q[c]).abs()).sum::<f32>();
            }
        }
    }
    let nh = (w.saturating_sub(1) * h * 3) as f32;
    let nv = (w * h.saturating_sub(1) * 3) as f32;
    let mut tv = 0.0;
    if nh > 0.0 {
        tv += horizontal / nh;
    }
    if nv > 0.0 {
        tv += vertical / nv;
    }
    tv
}

/// Every scene-level regularizer. The image term is added by the loss engine, which
/// owns the composited image.
pub fn scene_terms(scene: &Scene, coe: &CoefficientBundle) -> RegularizationTerms {
    let mut terms = RegularizationTerms {
        delta: delta_term(scene, coe),
        displacement: displacement_term(scene, coe),
        angle: angle_term(scene, coe),
        ..RegularizationTerms::default()
    };
    if coe.neighbor_coe != 0.0 || coe.overlap_coe != 0.0 || coe.joint_coe != 0.0 {
        let hood = TileNeighborhood::build(scene, coe.neighbor_num);
        terms.neighbor = neighbor_term(scene, &hood, coe);
        terms.overlap = overlap_term(scene, &hood, coe);
        terms.joint = joint_term(scene, &hood, coe);
    }
    terms
}

fn canvas_bounds(scene: &Scene, index: usize) -> ([f32; 2], [f32; 2]) {
    let transform = scene.groups()[index].canvas_transform();
    let mut min = [f32::INFINITY; 2];
    let mut max = [f32::NEG_INFINITY; 2];
    for p in scene.tiles()[index].corner_points() {
        let q = transform.apply_point(&p);
        min = [min[0].min(q.x), min[1].min(q.y)];
        max = [max[0].max(q.x), max[1].max(q.y)];
    }
    (min, max)
}

fn canvas_center(scene: &Scene, index: usize) -> Point2<f32> {
    let transform = scene.groups()[index].canvas_transform();
    transform.apply_point(&scene.tiles()[index].center())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile_grid::TileGrid;
    use image::Rgb;

    fn coefficients() -> CoefficientBundle {
        CoefficientBundle {
            reg_delta_coe: [1.0, 2.0],
            reg_displacement_coe: [3.0, 4.0],
            angle_coe: 5.0,
            overlap_coe: 1.0,
            neighbor_num: 1,
            neighbor_coe: 1.0,
            joint_coe: 1.0,
            ..CoefficientBundle::pixel_defaults()
        }
    }

    #[test]
    fn untouched_grid_has_no_geometric_penalty() {
        let scene = TileGrid::similarity_layout(64, 64).build_scene_with(|_| [0.5, 0.5, 0.5]);
        let terms = scene_terms(&scene, &coefficients());
        assert_eq!(terms, RegularizationTerms::default());
        assert_eq!(terms.total(), 0.0);
    }

    #[test]
    fn quadratic_terms_use_per_axis_weights() {
        let mut scene = TileGrid::new(32, 16, 16, 14.0).build_scene(0);
        scene.tile_mut(0).delta = [1.0, 2.0];
        scene.group_mut(1).translation = [1.0, -1.0];
        scene.group_mut(1).angle = 0.5;
        let coe = coefficients();
        assert_eq!(delta_term(&scene, &coe), 1.0 + 2.0 * 4.0);
        assert_eq!(displacement_term(&scene, &coe), 3.0 + 4.0);
        assert_eq!(angle_term(&scene, &coe), 5.0 * 0.25);
    }

    #[test]
    fn neighborhood_excludes_self() {
        let scene = TileGrid::similarity_layout(64, 64).build_scene(0);
        let hood = TileNeighborhood::build(&scene, 2);
        assert_eq!(hood.pairs().len(), scene.len() * 2);
        assert!(hood.pairs().iter().all(|(i, j)| i != j));
        // Corner tile at (0, 0): its two nearest are (0, 16) and (16, 0).
        let mut n: Vec<usize> = hood.neighbors_of(0).collect();
        n.sort();
        assert_eq!(n, vec![1, 4]);
    }

    #[test]
    fn every_tile_of_a_small_row_gets_its_neighbors() {
        let two = TileGrid::new(32, 16, 16, 14.0).build_scene(0);
        assert_eq!(TileNeighborhood::build(&two, 1).pairs(), &[(0, 1), (1, 0)]);

        let three = TileGrid::new(48, 16, 16, 14.0).build_scene(0);
        // The middle tile is equally far from both ends and takes the first one.
        assert_eq!(TileNeighborhood::build(&three, 1).pairs(), &[(0, 1), (1, 0), (2, 1)]);
        assert_eq!(
            TileNeighborhood::build(&three, 2).pairs(),
            &[(0, 1), (0, 2), (1, 0), (1, 2), (2, 1), (2, 0)]
        );
        // More neighbors than tiles: everyone else.
        assert_eq!(TileNeighborhood::build(&three, 5).pairs().len(), 6);
    }

    #[test]
    fn thinned_grid_keeps_k_neighbors_per_tile() {
        let mut scene = TileGrid::similarity_layout(64, 64).build_scene(0);
        scene.remove_at(5);
        scene.remove_at(0);
        let hood = TileNeighborhood::build(&scene, 3);
        for i in 0..scene.len() {
            let n: Vec<usize> = hood.neighbors_of(i).collect();
            assert_eq!(n.len(), 3, "tile {i}");
            assert!(!n.contains(&i));
            // No tile outside the list is closer than the farthest listed one.
            let dist = |j: usize| {
                let a = scene.tiles()[i].upper_left;
                let b = scene.tiles()[j].upper_left;
                (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
            };
            let farthest = n.iter().map(|&j| dist(j)).fold(0.0f32, f32::max);
            for j in (0..scene.len()).filter(|j| *j != i && !n.contains(j)) {
                assert!(dist(j) >= farthest);
            }
        }
    }

    #[test]
    fn neighbor_term_sees_color_difference() {
        let scene = TileGrid::new(32, 16, 16, 14.0).build_scene_with(|a| if a[0] == 0.0 { [0.0; 3] } else { [1.0, 0.0, 0.0] });
        let hood = TileNeighborhood::build(&scene, 1);
        // Two directed pairs, each with squared color distance 1.
        assert_eq!(neighbor_term(&scene, &hood, &coefficients()), 2.0);
    }

    #[test]
    fn overlap_grows_when_tiles_are_pushed_together() {
        let mut scene = TileGrid::new(32, 16, 16, 14.0).build_scene(0);
        let coe = coefficients();
        let hood = TileNeighborhood::build(&scene, 1);
        assert_eq!(overlap_term(&scene, &hood, &coe), 0.0);
        // Second tile moved 4 px left: boxes overlap on 2 x 14.
        scene.group_mut(1).translation = [-4.0 / 32.0, 0.0];
        let overlap = overlap_term(&scene, &hood, &coe);
        assert!((overlap - 2.0 * 28.0).abs() < 1e-3);
        let joint = joint_term(&scene, &hood, &coe);
        assert!((joint - 2.0 * 16.0).abs() < 1e-3);
    }

    #[test]
    fn total_variation_of_stripes() {
        let img = Rgb32FImage::from_fn(2, 2, |x, _| if x == 0 { Rgb([0.0; 3]) } else { Rgb([1.0; 3]) });
        assert_eq!(total_variation(&img), 1.0);
    }
}
