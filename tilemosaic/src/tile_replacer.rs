use crate::canvas_transform::CanvasTransform;
use crate::error::Result;
use crate::retrieval::Retriever;
use crate::scene::Scene;
use image::{Rgb, RgbImage};
use log::{debug, info};

/// Everything the replacer needs to know about one optimized tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor {
    /// Pixel size, `base_size + delta * delta_coe` truncated towards zero.
    pub size: [i64; 2],
    /// Upper-left anchor in canvas pixels.
    pub anchor: [f32; 2],
    /// Rotation of the group in degrees.
    pub angle_degrees: f32,
    /// Translation of the group in canvas pixels.
    pub translation: [f32; 2],
    /// RGBA fill in `[0, 1]`.
    pub fill: [f32; 4],
    /// Shape-to-canvas transform of the group.
    pub transform: CanvasTransform,
}

impl TileDescriptor {
    /// Describes every tile of `scene`, in paint order.
    pub fn from_scene(scene: &Scene) -> Vec<TileDescriptor> {
        scene
            .tiles()
            .iter()
            .zip(scene.groups())
            .map(|(tile, group)| {
                let [w, h] = tile.effective_size();
                let transform = group.canvas_transform();
                let (tx, ty) = transform.translation();
                TileDescriptor {
                    size: [w as i64, h as i64],
                    anchor: tile.upper_left,
                    angle_degrees: transform.rotation_degrees(),
                    translation: [tx, ty],
                    fill: group.fill_color(),
                    transform,
                }
            })
            .collect()
    }

    /// Fill color as 8-bit RGB, the retrieval query.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::tile_replacer::TileDescriptor;
    /// # use tilemosaic::canvas_transform::CanvasTransform;
    /// let d = TileDescriptor {
    ///     size: [14, 14],
    ///     anchor: [0.0, 0.0],
    ///     angle_degrees: 0.0,
    ///     translation: [0.0, 0.0],
    ///     fill: [1.2, 0.5, -0.1, 1.0],
    ///     transform: CanvasTransform::identity(),
    /// };
    /// assert_eq!(d.query_color(), [255, 127, 0]);
    /// ```
    pub fn query_color(&self) -> [u8; 3] {
        [0usize, 1, 2].map(|c| (self.fill[c] * 255.0).clamp(0.0, 255.0) as u8)
    }
}

/// Turns optimized tiles into a photomosaic.
///
/// # How It Works
/// 1. **Retrieval**: every tile asks the [`Retriever`] for a patch of its pixel size
///    that matches its fill color.
/// 2. **Placement**: the patch is painted at the tile anchor into a canvas-sized layer
///    along with a fully set mask; parts falling outside the canvas are dropped.
/// 3. **Warp**: layer and mask are mapped through the tile's transform with bilinear
///    interpolation.
/// 4. **Compositing**: output pixels where the warped mask is fully set take the
///    warped layer. Later tiles overwrite earlier ones.
pub struct TileReplacer {
    width: u32,
    height: u32,
}

impl TileReplacer {
    pub fn new(width: u32, height: u32) -> Self {
        TileReplacer { width, height }
    }

    /// Builds the photomosaic on a black canvas.
    pub fn paint(&self, tiles: &[TileDescriptor], retriever: &dyn Retriever) -> Result<RgbImage> {
        let mut canvas = RgbImage::new(self.width, self.height);
        for (i, tile) in tiles.iter().enumerate() {
            let [w, h] = tile.size;
            if w <= 0 || h <= 0 {
                debug!("tile {i} has size {w}x{h}, skipped");
                continue;
            }
            let patch = retriever.retrieve(tile.query_color(), (w as u32, h as u32))?;
            self.composite(&mut canvas, &patch, tile);
        }
        info!("painted {} tiles", tiles.len());
        Ok(canvas)
    }

    /// Warps one patch onto the canvas.
    pub fn composite(&self, canvas: &mut RgbImage, patch: &RgbImage, tile: &TileDescriptor) {
        let Some(inverse) = tile.transform.inverse() else {
            return;
        };
        let layer = PatchLayer {
            patch,
            x0: tile.anchor[0] as i64,
            y0: tile.anchor[1] as i64,
            width: self.width as i64,
            height: self.height as i64,
        };

        // Only the transformed patch rectangle, grown by one pixel, can receive writes.
        let (pw, ph) = (patch.width() as f32, patch.height() as f32);
        let (ax, ay) = (layer.x0 as f32, layer.y0 as f32);
        let corners = [(ax, ay), (ax + pw, ay), (ax + pw, ay + ph), (ax, ay + ph)];
        let mut min = (f32::INFINITY, f32::INFINITY);
        let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for (x, y) in corners {
            let (cx, cy) = tile.transform.apply(x, y);
            min = (min.0.min(cx), min.1.min(cy));
            max = (max.0.max(cx), max.1.max(cy));
        }
        let x_start = (min.0.floor() - 1.0).max(0.0) as u32;
        let y_start = (min.1.floor() - 1.0).max(0.0) as u32;
        let x_end = ((max.0.ceil() + 1.0).max(0.0) as u32).min(self.width);
        let y_end = ((max.1.ceil() + 1.0).max(0.0) as u32).min(self.height);

        for y in y_start..y_end {
            for x in x_start..x_end {
                let (sx, sy) = inverse.apply(x as f32, y as f32);
                if let Some(rgb) = layer.sample_if_covered(sx, sy) {
                    canvas.put_pixel(x, y, rgb);
                }
            }
        }
    }
}

/// A patch placed into a canvas-sized layer whose mask is set exactly where the
/// patch landed inside the canvas.
struct PatchLayer<'a> {
    patch: &'a RgbImage,
    x0: i64,
    y0: i64,
    width: i64,
    height: i64,
}

impl PatchLayer<'_> {
    fn texel(&self, x: i64, y: i64) -> Option<[u8; 3]> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        let (px, py) = (x - self.x0, y - self.y0);
        if px < 0 || py < 0 || px >= self.patch.width() as i64 || py >= self.patch.height() as i64 {
            return None;
        }
        Some(self.patch.get_pixel(px as u32, py as u32).0)
    }

    /// Bilinear sample of the layer at `(x, y)` when the bilinear mask is full there.
    fn sample_if_covered(&self, x: f32, y: f32) -> Option<Rgb<u8>> {
        let xf = x.floor();
        let yf = y.floor();
        let fx = x - xf;
        let fy = y - yf;
        let (x0, y0) = (xf as i64, yf as i64);

        let taps = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x0 + 1, y0, fx * (1.0 - fy)),
            (x0, y0 + 1, (1.0 - fx) * fy),
            (x0 + 1, y0 + 1, fx * fy),
        ];
        let mut mask = 0.0f32;
        let mut rgb = [0.0f32; 3];
        for (tx, ty, weight) in taps {
            if weight <= 0.0 {
                continue;
            }
            if let Some(t) = self.texel(tx, ty) {
                mask += weight * 255.0;
                for c in 0..3 {
                    rgb[c] += weight * t[c] as f32;
                }
            }
        }
        if mask.round() < 255.0 {
            return None;
        }
        Some(Rgb(rgb.map(|v| v.round().clamp(0.0, 255.0) as u8)))
    }
}
