use crate::error::{MosaicError, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use kd_tree::{KdPoint, KdTree};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Supplies photographic patches for the tile replacer.
pub trait Retriever {
    /// Returns a `shape.0 × shape.1` patch whose colors resemble `color`.
    fn retrieve(&self, color: [u8; 3], shape: (u32, u32)) -> Result<RgbImage>;
}

/// One dataset image and its mean color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorEntry {
    pub path: PathBuf,
    pub mean_color: [u8; 3],
}

impl KdPoint for ColorEntry {
    type Scalar = i64;
    type Dim = typenum::U3;
    fn at(&self, k: usize) -> i64 {
        self.mean_color[k] as i64
    }
}

/// A query point in the color index.
struct ColorQuery([u8; 3]);

impl KdPoint for ColorQuery {
    type Scalar = i64;
    type Dim = typenum::U3;
    fn at(&self, k: usize) -> i64 {
        self.0[k] as i64
    }
}

/// A dataset image held in memory while the index is built.
#[derive(Debug, Clone)]
pub struct DatasetImage {
    pub path: PathBuf,
    pub image: RgbImage,
}

/// Nearest-mean-color retrieval over a directory of images.
///
/// The index only stores paths and mean colors; the matching image is read from disk
/// for every query, center-cropped to the requested aspect ratio and resized.
pub struct ColorIndex {
    entries: Vec<ColorEntry>,
    kdtree: KdTree<ColorEntry>,
}

impl ColorIndex {
    /// Reads every decodable image in `dir`. Files that are not images are skipped.
    pub fn load_images(dir: impl AsRef<Path>) -> Result<Vec<DatasetImage>> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        let mut images = Vec::with_capacity(paths.len());
        for path in paths {
            match image::open(&path) {
                Ok(img) => images.push(DatasetImage {
                    path,
                    image: img.to_rgb8(),
                }),
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        Ok(images)
    }

    /// Indexes the mean color of every image.
    pub fn train(images: &[DatasetImage]) -> Result<Self> {
        if images.is_empty() {
            return Err(MosaicError::EmptyDataset("no images to index".to_string()));
        }
        let entries = images
            .iter()
            .map(|d| ColorEntry {
                path: d.path.clone(),
                mean_color: mean_color(&d.image),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<ColorEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(MosaicError::EmptyDataset("color index has no entries".to_string()));
        }
        let kdtree = KdTree::build(entries.clone());
        Ok(ColorIndex { entries, kdtree })
    }

    pub fn entries(&self) -> &[ColorEntry] {
        &self.entries
    }

    /// Writes the index as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        serde_json::to_writer(BufWriter::new(File::create(path)?), &self.entries)?;
        Ok(())
    }

    /// Reads an index written by [`ColorIndex::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let entries: Vec<ColorEntry> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Self::from_entries(entries)
    }

    /// Loads the model at `model_path`, or trains one on `dataset_dir` and saves it
    /// there when the model is missing or unreadable.
    pub fn load_or_train(model_path: impl AsRef<Path>, dataset_dir: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        match Self::load(model_path) {
            Ok(index) => {
                info!("Loaded color index from {} ({} images)", model_path.display(), index.entries.len());
                Ok(index)
            }
            Err(e) => {
                warn!("No usable color index at {} ({}), training", model_path.display(), e);
                let images = Self::load_images(dataset_dir)?;
                let index = Self::train(&images)?;
                index.save(model_path)?;
                info!("Saved color index with {} images to {}", index.entries.len(), model_path.display());
                Ok(index)
            }
        }
    }

    /// The entry whose mean color is closest to `color`.
    pub fn nearest(&self, color: [u8; 3]) -> Result<&ColorEntry> {
        self.kdtree
            .nearest(&ColorQuery(color))
            .map(|found| found.item)
            .ok_or_else(|| MosaicError::RetrievalError("color index is empty".to_string()))
    }
}

impl Retriever for ColorIndex {
    fn retrieve(&self, color: [u8; 3], shape: (u32, u32)) -> Result<RgbImage> {
        let (w, h) = shape;
        if w == 0 || h == 0 {
            return Err(MosaicError::RetrievalError(format!("cannot retrieve a {w}x{h} patch")));
        }
        let entry = self.nearest(color)?;
        let img = image::open(&entry.path)?.to_rgb8();
        Ok(crop_and_resize(&img, w, h))
    }
}

/// Mean color of an image, rounded.
///
/// # Examples
/// ```
/// # use image::{Rgb, RgbImage};
/// # use tilemosaic::retrieval::mean_color;
/// let img = RgbImage::from_fn(2, 1, |x, _| if x == 0 { Rgb([0, 10, 255]) } else { Rgb([3, 20, 255]) });
/// assert_eq!(mean_color(&img), [2, 15, 255]);
/// ```
pub fn mean_color(img: &RgbImage) -> [u8; 3] {
    let n = (img.width() as u64 * img.height() as u64).max(1);
    let mut sum = [0u64; 3];
    for p in img.pixels() {
        for c in 0..3 {
            sum[c] += p.0[c] as u64;
        }
    }
    sum.map(|s| ((s as f64 / n as f64).round()) as u8)
}

/// Crops the largest centered region with the aspect ratio of `w × h`, then resizes it
/// to exactly `w × h`.
pub fn crop_and_resize(img: &RgbImage, w: u32, h: u32) -> RgbImage {
    let (iw, ih) = img.dimensions();
    let (cw, ch) = if iw as u64 * h as u64 > ih as u64 * w as u64 {
        (((ih as u64 * w as u64) / h as u64).max(1) as u32, ih)
    } else {
        (iw, ((iw as u64 * h as u64) / w as u64).max(1) as u32)
    };
    let crop = imageops::crop_imm(img, (iw - cw) / 2, (ih - ch) / 2, cw, ch).to_image();
    imageops::resize(&crop, w, h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn dataset_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(8, 8, Rgb([250, 10, 10])).save(dir.join("red.png")).unwrap();
        RgbImage::from_pixel(6, 12, Rgb([10, 10, 250])).save(dir.join("blue.png")).unwrap();
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
        dir
    }

    #[test]
    fn retrieves_closest_mean_color() {
        let dir = dataset_dir("tilemosaic_retrieval_closest");
        let images = ColorIndex::load_images(&dir).unwrap();
        assert_eq!(images.len(), 2);
        let index = ColorIndex::train(&images).unwrap();
        let patch = index.retrieve([200, 0, 30], (5, 3)).unwrap();
        assert_eq!(patch.dimensions(), (5, 3));
        assert_eq!(patch.get_pixel(2, 1).0, [250, 10, 10]);
        let patch = index.retrieve([0, 0, 128], (4, 4)).unwrap();
        assert_eq!(patch.get_pixel(0, 0).0, [10, 10, 250]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn model_is_trained_once_and_reloaded() {
        let dir = dataset_dir("tilemosaic_retrieval_model");
        let model = dir.join("model.json");
        let trained = ColorIndex::load_or_train(&model, &dir).unwrap();
        assert!(model.exists());
        let loaded = ColorIndex::load_or_train(&model, &dir).unwrap();
        assert_eq!(trained.entries(), loaded.entries());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn empty_dataset_is_an_error() {
        assert!(ColorIndex::train(&[]).is_err());
    }

    #[test]
    fn crop_keeps_requested_aspect() {
        let img = RgbImage::from_fn(20, 10, |x, _| if x < 5 || x >= 15 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        // A square request keeps only the white middle.
        let out = crop_and_resize(&img, 10, 10);
        assert_eq!(out.dimensions(), (10, 10));
        assert!(out.pixels().all(|p| p.0 == [255, 255, 255]));
    }
}
