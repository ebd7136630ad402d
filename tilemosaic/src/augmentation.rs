use image::imageops::{self, FilterType};
use image::{Rgb, Rgb32FImage};
use nalgebra::{SMatrix, SVector};
use rand::Rng;

/// Channel mean of the image-text embedding model's training data.
pub const EMBEDDING_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
/// Channel standard deviation of the image-text embedding model's training data.
pub const EMBEDDING_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Random views of a composited image, fed to the embedding model.
///
/// Every view is a random perspective warp (corners pulled inwards by up to
/// `distortion_scale` of the half extent, uncovered area filled white), followed by a
/// random crop covering `crop_scale` of the area resized to `output_size`, followed by
/// per-channel normalization.
#[derive(Debug, Clone)]
pub struct Augmenter {
    pub distortion_scale: f32,
    pub crop_scale: (f32, f32),
    pub crop_ratio: (f32, f32),
    pub output_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for Augmenter {
    fn default() -> Self {
        Augmenter {
            distortion_scale: 0.5,
            crop_scale: (0.7, 0.9),
            crop_ratio: (3.0 / 4.0, 4.0 / 3.0),
            output_size: 224,
            mean: EMBEDDING_MEAN,
            std: EMBEDDING_STD,
        }
    }
}

impl Augmenter {
    /// Produces one augmented view.
    pub fn augment(&self, img: &Rgb32FImage, rng: &mut impl Rng) -> Rgb32FImage {
        let warped = self.random_perspective(img, rng);
        let cropped = self.random_resized_crop(&warped, rng);
        self.normalize(&cropped)
    }

    /// Warps the image so that its corners land on randomly displaced positions.
    pub fn random_perspective(&self, img: &Rgb32FImage, rng: &mut impl Rng) -> Rgb32FImage {
        let (w, h) = img.dimensions();
        if w < 2 || h < 2 {
            return img.clone();
        }
        let half_w = (w / 2) as f32;
        let half_h = (h / 2) as f32;
        let dx = (self.distortion_scale * half_w).floor() as u32;
        let dy = (self.distortion_scale * half_h).floor() as u32;
        let (wf, hf) = (w as f32, h as f32);

        let start = [[0.0, 0.0], [wf - 1.0, 0.0], [wf - 1.0, hf - 1.0], [0.0, hf - 1.0]];
        let end = [
            [rng.gen_range(0..=dx) as f32, rng.gen_range(0..=dy) as f32],
            [rng.gen_range(w - dx - 1..w) as f32, rng.gen_range(0..=dy) as f32],
            [rng.gen_range(w - dx - 1..w) as f32, rng.gen_range(h - dy - 1..h) as f32],
            [rng.gen_range(0..=dx) as f32, rng.gen_range(h - dy - 1..h) as f32],
        ];

        // Output pixels are pulled from the input, so map end points back to start points.
        let Some(homography) = solve_homography(&end, &start) else {
            return img.clone();
        };

        Rgb32FImage::from_fn(w, h, |x, y| {
            let (sx, sy) = apply_homography(&homography, x as f32, y as f32);
            sample_bilinear(img, sx, sy).unwrap_or(Rgb([1.0, 1.0, 1.0]))
        })
    }

    /// Crops a random region and resizes it to `output_size × output_size`.
    pub fn random_resized_crop(&self, img: &Rgb32FImage, rng: &mut impl Rng) -> Rgb32FImage {
        let (w, h) = img.dimensions();
        let area = (w * h) as f32;
        let (log_lo, log_hi) = (self.crop_ratio.0.ln(), self.crop_ratio.1.ln());

        let mut region = None;
        for _ in 0..10 {
            let target_area = area * rng.gen_range(self.crop_scale.0..=self.crop_scale.1);
            let ratio = rng.gen_range(log_lo..=log_hi).exp();
            let cw = (target_area * ratio).sqrt().round() as u32;
            let ch = (target_area / ratio).sqrt().round() as u32;
            if cw > 0 && ch > 0 && cw <= w && ch <= h {
                let top = rng.gen_range(0..=h - ch);
                let left = rng.gen_range(0..=w - cw);
                region = Some((left, top, cw, ch));
                break;
            }
        }
        let (left, top, cw, ch) = region.unwrap_or_else(|| {
            let side = w.min(h);
            ((w - side) / 2, (h - side) / 2, side, side)
        });

        let crop = imageops::crop_imm(img, left, top, cw, ch).to_image();
        imageops::resize(&crop, self.output_size, self.output_size, FilterType::Triangle)
    }

    /// `(v - mean) / std` per channel.
    pub fn normalize(&self, img: &Rgb32FImage) -> Rgb32FImage {
        let mut out = img.clone();
        for p in out.pixels_mut() {
            for c in 0..3 {
                p.0[c] = (p.0[c] - self.mean[c]) / self.std[c];
            }
        }
        out
    }
}

/// Solves for the 3×3 homography (with `h33 = 1`) mapping `from[i]` to `to[i]`.
fn solve_homography(from: &[[f32; 2]; 4], to: &[[f32; 2]; 4]) -> Option<[f64; 8]> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for i in 0..4 {
        let (x, y) = (from[i][0] as f64, from[i][1] as f64);
        let (u, v) = (to[i][0] as f64, to[i][1] as f64);
        let r = 2 * i;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;
        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }
    let solution = a.lu().solve(&b)?;
    let mut h = [0.0; 8];
    h.copy_from_slice(solution.as_slice());
    Some(h)
}

fn apply_homography(h: &[f64; 8], x: f32, y: f32) -> (f32, f32) {
    let (x, y) = (x as f64, y as f64);
    let w = h[6] * x + h[7] * y + 1.0;
    (
        ((h[0] * x + h[1] * y + h[2]) / w) as f32,
        ((h[3] * x + h[4] * y + h[5]) / w) as f32,
    )
}

/// Bilinear lookup; `None` outside the image.
fn sample_bilinear(img: &Rgb32FImage, x: f32, y: f32) -> Option<Rgb<f32>> {
    let (w, h) = img.dimensions();
    if !(x >= 0.0 && y >= 0.0 && x <= (w - 1) as f32 && y <= (h - 1) as f32) {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;
    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    Some(Rgb(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient_image(w: u32, h: u32) -> Rgb32FImage {
        Rgb32FImage::from_fn(w, h, |x, y| Rgb([x as f32 / w as f32, y as f32 / h as f32, 0.5]))
    }

    #[test]
    fn homography_of_identical_quads_is_identity() {
        let quad = [[0.0, 0.0], [9.0, 0.0], [9.0, 9.0], [0.0, 9.0]];
        let h = solve_homography(&quad, &quad).unwrap();
        let (x, y) = apply_homography(&h, 3.5, 7.25);
        assert!((x - 3.5).abs() < 1e-4 && (y - 7.25).abs() < 1e-4);
    }

    #[test]
    fn homography_maps_corners() {
        let from = [[1.0, 2.0], [30.0, 0.0], [28.0, 25.0], [3.0, 31.0]];
        let to = [[0.0, 0.0], [31.0, 0.0], [31.0, 31.0], [0.0, 31.0]];
        let h = solve_homography(&from, &to).unwrap();
        for (f, t) in from.iter().zip(to.iter()) {
            let (x, y) = apply_homography(&h, f[0], f[1]);
            assert!((x - t[0]).abs() < 1e-3 && (y - t[1]).abs() < 1e-3);
        }
    }

    #[test]
    fn augmentation_is_reproducible_and_sized() {
        let img = gradient_image(48, 48);
        let aug = Augmenter {
            output_size: 32,
            ..Augmenter::default()
        };
        let a = aug.augment(&img, &mut StdRng::seed_from_u64(5));
        let b = aug.augment(&img, &mut StdRng::seed_from_u64(5));
        assert_eq!(a.dimensions(), (32, 32));
        assert_eq!(a, b);
    }

    #[test]
    fn normalization_uses_mean_and_std() {
        let img = Rgb32FImage::from_pixel(1, 1, Rgb(EMBEDDING_MEAN));
        let out = Augmenter::default().normalize(&img);
        assert_eq!(out.get_pixel(0, 0).0, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn perspective_fills_uncovered_area_with_white() {
        let img = Rgb32FImage::from_pixel(40, 40, Rgb([0.0, 0.0, 0.0]));
        let aug = Augmenter {
            distortion_scale: 1.0,
            ..Augmenter::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let warped = aug.random_perspective(&img, &mut rng);
        let white = warped.pixels().filter(|p| p.0 == [1.0, 1.0, 1.0]).count();
        let black = warped.pixels().filter(|p| p.0 == [0.0, 0.0, 0.0]).count();
        assert!(black > 0);
        assert_eq!(white + black, 40 * 40);
    }
}
