use crate::error::Result;
use image::{Rgb, Rgb32FImage, Rgba, RgbaImage};
use std::path::Path;

/// A rendered canvas with linear RGBA pixel data.
/// Each pixel occupies 4 floats: R, G, B, and A, nominally in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedImage {
    /// Pixel data stored in a 1D `Vec<f32>`, row by row, 4 floats per pixel.
    pub data: Vec<f32>,
    /// The width (in pixels) of the image.
    pub width: usize,
    /// The height (in pixels) of the image.
    pub height: usize,
}

impl RenderedImage {
    /// Creates a fully transparent image.
    pub fn transparent(width: usize, height: usize) -> Self {
        RenderedImage {
            data: vec![0.0; width * height * 4],
            width,
            height,
        }
    }

    /// Creates an image filled with one color.
    pub fn filled(width: usize, height: usize, rgba: [f32; 4]) -> Self {
        let mut data = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        RenderedImage { data, width, height }
    }

    /// Wraps a linear RGB image as a fully opaque render.
    pub fn from_opaque(img: &Rgb32FImage) -> Self {
        let mut data = Vec::with_capacity(img.width() as usize * img.height() as usize * 4);
        for p in img.pixels() {
            data.extend_from_slice(&[p.0[0], p.0[1], p.0[2], 1.0]);
        }
        RenderedImage {
            data,
            width: img.width() as usize,
            height: img.height() as usize,
        }
    }

    /// Returns the RGBA components at `(x, y)`, or transparent black if out of bounds.
    pub fn get_rgba(&self, x: usize, y: usize) -> [f32; 4] {
        if x >= self.width || y >= self.height {
            [0.0; 4]
        } else {
            let index = (y * self.width + x) * 4;
            [
                self.data[index],
                self.data[index + 1],
                self.data[index + 2],
                self.data[index + 3],
            ]
        }
    }

    /// Overwrites the pixel at `(x, y)`. Out-of-bounds writes are ignored.
    pub fn set_rgba(&mut self, x: usize, y: usize, rgba: [f32; 4]) {
        if x < self.width && y < self.height {
            let index = (y * self.width + x) * 4;
            self.data[index..index + 4].copy_from_slice(&rgba);
        }
    }

    /// Flattens the image onto a white background: `alpha * rgb + (1 - alpha) * 1`.
    ///
    /// # Examples
    /// ```
    /// # use tilemosaic::rendered_image::RenderedImage;
    /// let img = RenderedImage::filled(2, 2, [0.0, 0.5, 1.0, 0.5]);
    /// let flat = img.composite_over_white();
    /// assert_eq!(flat.get_pixel(1, 1).0, [0.5, 0.75, 1.0]);
    /// ```
    pub fn composite_over_white(&self) -> Rgb32FImage {
        Rgb32FImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let [r, g, b, a] = self.get_rgba(x as usize, y as usize);
            Rgb([a * r + (1.0 - a), a * g + (1.0 - a), a * b + (1.0 - a)])
        })
    }

    /// Converts to 8-bit RGBA, encoding each color channel as `v^(1/gamma)`.
    pub fn to_rgba8(&self, gamma: f32) -> RgbaImage {
        let encode = |v: f32| (v.clamp(0.0, 1.0).powf(1.0 / gamma) * 255.0).round() as u8;
        RgbaImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let [r, g, b, a] = self.get_rgba(x as usize, y as usize);
            Rgba([encode(r), encode(g), encode(b), (a.clamp(0.0, 1.0) * 255.0).round() as u8])
        })
    }

    /// Writes the image as a PNG, gamma-encoded.
    pub fn save(&self, path: impl AsRef<Path>, gamma: f32) -> Result<()> {
        self.to_rgba8(gamma).save(path)?;
        Ok(())
    }
}

/// Linearizes an 8-bit target image with `(v / 255)^gamma` and flattens it onto white.
pub fn linearize_target(img: &RgbaImage, gamma: f32) -> Rgb32FImage {
    Rgb32FImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y).0;
        let lin = |v: u8| (v as f32 / 255.0).powf(gamma);
        let a = p[3] as f32 / 255.0;
        Rgb([
            a * lin(p[0]) + (1.0 - a),
            a * lin(p[1]) + (1.0 - a),
            a * lin(p[2]) + (1.0 - a),
        ])
    })
}

/// Loads a target image from disk, see [`linearize_target`].
pub fn load_target(path: impl AsRef<Path>, gamma: f32) -> Result<Rgb32FImage> {
    let img = image::open(path)?.to_rgba8();
    Ok(linearize_target(&img, gamma))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_are_transparent() {
        let img = RenderedImage::filled(3, 2, [1.0; 4]);
        assert_eq!(img.get_rgba(3, 0), [0.0; 4]);
        assert_eq!(img.get_rgba(0, 2), [0.0; 4]);
        assert_eq!(img.get_rgba(2, 1), [1.0; 4]);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let img = RenderedImage::transparent(4, 4);
        let flat = img.composite_over_white();
        assert!(flat.pixels().all(|p| p.0 == [1.0, 1.0, 1.0]));
    }

    #[test]
    fn gamma_encoding_inverts_linearization() {
        let src = RgbaImage::from_pixel(2, 2, Rgba([200, 64, 3, 255]));
        let lin = linearize_target(&src, 2.2);
        let rendered = RenderedImage::from_opaque(&lin);
        assert_eq!(rendered.to_rgba8(2.2).get_pixel(1, 1).0, [200, 64, 3, 255]);
    }
}
