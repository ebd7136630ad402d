use crate::error::{MosaicError, Result};
use crate::rendered_image::RenderedImage;
use crate::scene::SceneArgs;
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_SAMPLE_OFFSET: f32 = 0.999;

/// Sampling configuration shared by every render of a run.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Number of samples along X per pixel.
    pub samples_x: u32,
    /// Number of samples along Y per pixel.
    pub samples_y: u32,
    /// Optional image the scene is composited over. Must match the canvas size.
    pub background: Option<RenderedImage>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            samples_x: 2,
            samples_y: 2,
            background: None,
        }
    }
}

/// Turns assembled scene geometry into an RGBA image.
///
/// Implementations must be deterministic for a given `seed`: two calls with the same
/// scene, settings and seed must return identical images.
pub trait Renderer {
    fn render(&self, scene: &SceneArgs, settings: &RenderSettings, seed: u64) -> Result<RenderedImage>;
}

/// A CPU reference rasterizer for tile scenes.
///
/// Every pixel is sampled on a `samples_x × samples_y` stratified grid whose positions
/// are jittered by a generator seeded with the render seed. Coverage of a sample is a
/// linear ramp of the signed distance to the polygon boundary, `filter_radius` wide on
/// each side of the edge, so moving an edge by a fraction of a pixel changes the image
/// continuously. A radius of zero is a box filter: a sample is either inside or outside,
/// and an untransformed grid renders as exact axis-aligned rectangles.
/// Groups are painted in order with "over" compositing.
#[derive(Debug, Clone, Copy)]
pub struct CpuRasterizer {
    pub filter_radius: f32,
}

impl Default for CpuRasterizer {
    fn default() -> Self {
        CpuRasterizer { filter_radius: 0.5 }
    }
}

impl CpuRasterizer {
    pub fn new(filter_radius: f32) -> Self {
        CpuRasterizer { filter_radius }
    }

    /// Hard-edged coverage, no prefiltering.
    pub fn box_filter() -> Self {
        CpuRasterizer { filter_radius: 0.0 }
    }

    /// Sample coverage of a polygon at `p`, in `[0, 1]`.
    fn coverage(&self, polygon: &[Point2<f32>; 4], p: &Point2<f32>) -> f32 {
        if self.filter_radius <= 0.0 {
            return if contains_even_odd(polygon, p) { 1.0 } else { 0.0 };
        }
        let distance = edge_distance(polygon, p);
        let signed = if contains_even_odd(polygon, p) { -distance } else { distance };
        (0.5 - signed / (2.0 * self.filter_radius)).clamp(0.0, 1.0)
    }
}

impl Renderer for CpuRasterizer {
    fn render(&self, scene: &SceneArgs, settings: &RenderSettings, seed: u64) -> Result<RenderedImage> {
        let width = scene.width as usize;
        let height = scene.height as usize;
        let samples_x = settings.samples_x.max(1) as usize;
        let samples_y = settings.samples_y.max(1) as usize;
        let samples = samples_x * samples_y;

        if let Some(bg) = &settings.background {
            if bg.width != width || bg.height != height {
                return Err(MosaicError::RenderError(format!(
                    "background is {}x{}, canvas is {}x{}",
                    bg.width, bg.height, width, height
                )));
            }
        }

        // Jittered sample positions, drawn in raster order so the seed fully determines them.
        let mut rng = StdRng::seed_from_u64(seed);
        let mut positions = Vec::with_capacity(width * height * samples);
        for y in 0..height {
            for x in 0..width {
                for sy in 0..samples_y {
                    for sx in 0..samples_x {
                        let jx: f32 = rng.gen();
                        let jy: f32 = rng.gen();
                        // Keep samples strictly inside their pixel after rounding.
                        let ox = ((sx as f32 + jx) / samples_x as f32).min(MAX_SAMPLE_OFFSET);
                        let oy = ((sy as f32 + jy) / samples_y as f32).min(MAX_SAMPLE_OFFSET);
                        positions.push(Point2::new(x as f32 + ox, y as f32 + oy));
                    }
                }
            }
        }

        // Premultiplied RGBA per sample.
        let mut accum = vec![[0.0f32; 4]; width * height * samples];
        if let Some(bg) = &settings.background {
            for (i, chunk) in accum.chunks_mut(samples).enumerate() {
                let [r, g, b, a] = bg.get_rgba(i % width, i / width);
                chunk.fill([r * a, g * a, b * a, a]);
            }
        }

        let reach = self.filter_radius;
        for group in &scene.groups {
            let polygons: Vec<[Point2<f32>; 4]> = group
                .shape_indices
                .iter()
                .map(|&i| scene.shapes[i].points.map(|p| group.shape_to_canvas.apply_point(&p)))
                .collect();

            let Some((x0, y0, x1, y1)) = pixel_bounds(&polygons, reach, width, height) else {
                continue;
            };
            let [fr, fg, fb, fa] = group.fill;

            for y in y0..y1 {
                for x in x0..x1 {
                    let base = (y * width + x) * samples;
                    for s in base..base + samples {
                        let p = &positions[s];
                        let cov = polygons
                            .iter()
                            .map(|poly| self.coverage(poly, p))
                            .fold(0.0f32, f32::max);
                        if cov <= 0.0 {
                            continue;
                        }
                        let a = cov * fa;
                        let acc = &mut accum[s];
                        acc[0] = fr * a + acc[0] * (1.0 - a);
                        acc[1] = fg * a + acc[1] * (1.0 - a);
                        acc[2] = fb * a + acc[2] * (1.0 - a);
                        acc[3] = a + acc[3] * (1.0 - a);
                    }
                }
            }
        }

        let mut out = RenderedImage::transparent(width, height);
        for (i, chunk) in accum.chunks(samples).enumerate() {
            let mut sum = [0.0f32; 4];
            for acc in chunk {
                for c in 0..4 {
                    sum[c] += acc[c];
                }
            }
            let alpha = sum[3] / samples as f32;
            let rgba = if alpha > 0.0 {
                let norm = samples as f32 * alpha;
                [sum[0] / norm, sum[1] / norm, sum[2] / norm, alpha]
            } else {
                [0.0; 4]
            };
            out.set_rgba(i % width, i / width, rgba);
        }
        Ok(out)
    }
}

/// Pixel rectangle `[x0, x1) × [y0, y1)` touched by the polygons, grown by `reach`.
fn pixel_bounds(
    polygons: &[[Point2<f32>; 4]],
    reach: f32,
    width: usize,
    height: usize,
) -> Option<(usize, usize, usize, usize)> {
    let mut min = Point2::new(f32::INFINITY, f32::INFINITY);
    let mut max = Point2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
    for p in polygons.iter().flatten() {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    if !min.x.is_finite() || !max.x.is_finite() || !min.y.is_finite() || !max.y.is_finite() {
        return None;
    }
    let x0 = (min.x - reach).floor().max(0.0) as usize;
    let y0 = (min.y - reach).floor().max(0.0) as usize;
    let x1 = ((max.x + reach).ceil().max(0.0) as usize).min(width);
    let y1 = ((max.y + reach).ceil().max(0.0) as usize).min(height);
    if x0 >= x1 || y0 >= y1 {
        None
    } else {
        Some((x0, y0, x1, y1))
    }
}

/// Even-odd point-in-polygon test.
pub(crate) fn contains_even_odd(polygon: &[Point2<f32>], p: &Point2<f32>) -> bool {
    let mut inside = false;
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if (a.y > p.y) != (b.y > p.y) {
            let t = (p.y - a.y) / (b.y - a.y);
            if p.x < a.x + t * (b.x - a.x) {
                inside = !inside;
            }
        }
    }
    inside
}

/// Distance from `p` to the closest polygon edge.
pub(crate) fn edge_distance(polygon: &[Point2<f32>], p: &Point2<f32>) -> f32 {
    let n = polygon.len();
    let mut best = f32::INFINITY;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let ab = b - a;
        let len2 = ab.norm_squared();
        let t = if len2 > 0.0 { ((p - a).dot(&ab) / len2).clamp(0.0, 1.0) } else { 0.0 };
        let closest = a + ab * t;
        best = best.min((p - closest).norm());
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Scene;
    use crate::tile::{Tile, TileId};
    use crate::tile_group::{GroupId, TileGroup};

    fn single_tile_scene(color: [f32; 4], transparent: bool) -> Scene {
        let mut scene = Scene::new(20, 20);
        scene.push(
            Tile::new(TileId(0), [4.0, 4.0], [10.0, 10.0]),
            TileGroup::new(GroupId(0), vec![], color, transparent),
        );
        scene
    }

    #[test]
    fn same_seed_renders_identically() {
        let scene = single_tile_scene([0.3, 0.6, 0.9, 1.0], false).assemble();
        let r = CpuRasterizer::default();
        let settings = RenderSettings::default();
        let a = r.render(&scene, &settings, 7).unwrap();
        let b = r.render(&scene, &settings, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn interior_is_fill_and_far_outside_is_transparent() {
        let scene = single_tile_scene([0.3, 0.6, 0.9, 1.0], false).assemble();
        let img = CpuRasterizer::default()
            .render(&scene, &RenderSettings::default(), 1)
            .unwrap();
        let inside = img.get_rgba(8, 8);
        for (got, want) in inside.iter().zip([0.3, 0.6, 0.9, 1.0]) {
            assert!((got - want).abs() < 1e-6);
        }
        assert_eq!(img.get_rgba(1, 1), [0.0; 4]);
        assert_eq!(img.get_rgba(18, 18), [0.0; 4]);
        let edge = img.get_rgba(4, 8)[3];
        assert!(edge > 0.0 && edge < 1.0);
    }

    #[test]
    fn transparent_fill_blends_over_background() {
        let scene = single_tile_scene([1.0, 0.0, 0.0, 0.5], true).assemble();
        let settings = RenderSettings {
            background: Some(RenderedImage::filled(20, 20, [0.0, 0.0, 1.0, 1.0])),
            ..RenderSettings::default()
        };
        let img = CpuRasterizer::default().render(&scene, &settings, 3).unwrap();
        let p = img.get_rgba(9, 9);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!((p[2] - 0.5).abs() < 1e-6);
        assert!((p[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rotation_moves_coverage() {
        let mut scene = single_tile_scene([1.0, 1.0, 1.0, 1.0], false);
        scene.group_mut(0).angle = std::f32::consts::FRAC_PI_2;
        scene.group_mut(0).translation = [20.0, 0.0];
        let img = CpuRasterizer::default()
            .render(&scene.assemble(), &RenderSettings::default(), 0)
            .unwrap();
        // (x, y) -> (-y + 20, x): the tile [4,14]x[4,14] lands on [6,16]x[4,14].
        assert_eq!(img.get_rgba(10, 9)[3], 1.0);
        assert_eq!(img.get_rgba(2, 9)[3], 0.0);
    }

    #[test]
    fn mismatched_background_is_an_error() {
        let scene = single_tile_scene([1.0; 4], false).assemble();
        let settings = RenderSettings {
            background: Some(RenderedImage::transparent(3, 3)),
            ..RenderSettings::default()
        };
        assert!(CpuRasterizer::default().render(&scene, &settings, 0).is_err());
    }

    #[test]
    fn distance_and_containment_on_unit_square() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert!(contains_even_odd(&square, &Point2::new(0.5, 0.5)));
        assert!(!contains_even_odd(&square, &Point2::new(1.5, 0.5)));
        assert!((edge_distance(&square, &Point2::new(0.5, 0.25)) - 0.25).abs() < 1e-6);
        assert!((edge_distance(&square, &Point2::new(2.0, 0.5)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn box_filter_has_hard_edges() {
        let scene = single_tile_scene([0.3, 0.6, 0.9, 1.0], false).assemble();
        let img = CpuRasterizer::box_filter()
            .render(&scene, &RenderSettings::default(), 1)
            .unwrap();
        // The tile covers [4, 14) on both axes.
        for y in 0..20 {
            for x in 0..20 {
                let p = img.get_rgba(x, y);
                assert!(p.iter().all(|v| v.is_finite()));
                if (4..14).contains(&x) && (4..14).contains(&y) {
                    assert_eq!(p[3], 1.0);
                    assert!((p[0] - 0.3).abs() < 1e-6 && (p[2] - 0.9).abs() < 1e-6);
                } else {
                    assert_eq!(p, [0.0; 4]);
                }
            }
        }
    }

    #[test]
    fn samples_on_an_edge_stay_finite_without_prefilter() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let r = CpuRasterizer::new(0.0);
        assert_eq!(r.coverage(&square, &Point2::new(1.0, 0.5)), 0.0);
        assert_eq!(r.coverage(&square, &Point2::new(0.0, 0.5)), 1.0);
        assert_eq!(r.coverage(&square, &Point2::new(0.5, 0.5)), 1.0);
    }
}
