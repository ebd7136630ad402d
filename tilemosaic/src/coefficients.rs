use crate::error::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hyperparameters shared by the loss engine and the optimizer loop.
///
/// A bundle is loaded once at start-up and never mutated afterwards. Two default sets
/// exist because the pixel objective and the similarity objective were tuned separately:
/// see [`CoefficientBundle::pixel_defaults`] and [`CoefficientBundle::similarity_defaults`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoefficientBundle {
    /// Learning rate of the tile size deltas.
    pub delta_lr: f32,
    /// Learning rate of the group rotation angles.
    pub angle_lr: f32,
    /// Learning rate of the group translations.
    pub translation_lr: f32,
    /// Learning rate of the group fill colors.
    pub color_lr: f32,

    /// Per-axis weight of the squared tile delta penalty.
    pub reg_delta_coe: [f32; 2],
    /// Per-axis weight of the squared group translation penalty.
    pub reg_displacement_coe: [f32; 2],
    /// Weight of the squared group angle penalty.
    pub angle_coe: f32,

    /// Weight of the bounding box overlap between neighboring tiles.
    pub overlap_coe: f32,
    /// How many nearest tiles count as neighbors of a tile.
    pub neighbor_num: usize,
    /// Weight of the color/geometry divergence between neighboring tiles.
    pub neighbor_coe: f32,
    /// Weight of the spacing change between neighboring tile centers.
    pub joint_coe: f32,

    /// Weight of the negative prompt similarity (similarity objective only).
    pub neg_clip_coe: f32,
    /// Weight of the total variation of the composited image.
    pub image_coe: f32,
}

impl CoefficientBundle {
    /// Defaults used when fitting a target image.
    ///
    /// ```
    /// # use tilemosaic::coefficients::CoefficientBundle;
    /// let c = CoefficientBundle::pixel_defaults();
    /// assert_eq!(c.neighbor_num, 1);
    /// assert_eq!(c.overlap_coe, 0.0);
    /// ```
    pub fn pixel_defaults() -> Self {
        CoefficientBundle {
            delta_lr: 0.01,
            angle_lr: 0.01,
            translation_lr: 0.01,
            color_lr: 0.01,
            reg_delta_coe: [1e-4, 1e-4],
            reg_displacement_coe: [1e-4, 1e-4],
            angle_coe: 1e-4,
            overlap_coe: 0.0,
            neighbor_num: 1,
            neighbor_coe: 0.0,
            joint_coe: 0.0,
            neg_clip_coe: 0.0,
            image_coe: 0.0,
        }
    }

    /// Defaults used when fitting a text prompt.
    pub fn similarity_defaults() -> Self {
        CoefficientBundle {
            delta_lr: 0.01,
            angle_lr: 0.01,
            translation_lr: 0.01,
            color_lr: 0.01,
            reg_delta_coe: [1e-4, 1e-4],
            reg_displacement_coe: [0.0, 0.0],
            angle_coe: 0.0,
            overlap_coe: 1e-4,
            neighbor_num: 1,
            neighbor_coe: 0.0,
            joint_coe: 1e-4,
            neg_clip_coe: 0.3,
            image_coe: 0.0,
        }
    }

    /// Loads a bundle from a JSON file, or returns `defaults` if the file is missing
    /// or cannot be parsed. A missing file is never fatal.
    pub fn load_or_default(path: impl AsRef<Path>, defaults: CoefficientBundle) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<CoefficientBundle>(&json) {
                Ok(bundle) => {
                    info!("Loaded best parameters from {}: {:?}", path.display(), bundle);
                    bundle
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using default parameters.", path.display(), e);
                    defaults
                }
            },
            Err(_) => {
                info!("No best parameters found at {}, using default parameters", path.display());
                defaults
            }
        }
    }

    /// Writes the bundle as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl Default for CoefficientBundle {
    fn default() -> Self {
        Self::pixel_defaults()
    }
}
