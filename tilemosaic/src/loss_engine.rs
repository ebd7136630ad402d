use crate::augmentation::Augmenter;
use crate::coefficients::CoefficientBundle;
use crate::embedding::{cosine_similarity, Embedder, PromptEmbeddings};
use crate::error::{MosaicError, Result};
use crate::rasterizer::{RenderSettings, Renderer};
use crate::regularization::{self, RegularizationTerms};
use crate::rendered_image::RenderedImage;
use crate::scene::Scene;
use image::{Rgb, Rgb32FImage};
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::Cell;

/// Number of augmented views scored per evaluation in similarity mode.
pub const NUM_AUGS: usize = 4;

/// What the rendered scene is compared against.
pub enum Objective {
    /// Match a text prompt through an image-text embedding model.
    Similarity {
        embedder: Box<dyn Embedder>,
        prompts: PromptEmbeddings,
        augmenter: Augmenter,
        num_augs: usize,
    },
    /// Match a linear RGB target image of the canvas size.
    Pixel { target: Rgb32FImage },
}

impl Objective {
    /// Similarity objective with the default augmentations resized to `canvas_size`.
    pub fn similarity(embedder: Box<dyn Embedder>, prompts: PromptEmbeddings, canvas_size: u32) -> Self {
        Objective::Similarity {
            embedder,
            prompts,
            augmenter: Augmenter {
                output_size: canvas_size,
                ..Augmenter::default()
            },
            num_augs: NUM_AUGS,
        }
    }

    pub fn pixel(target: Rgb32FImage) -> Self {
        Objective::Pixel { target }
    }
}

/// The value of every term of one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    /// Similarity or pixel loss.
    pub fidelity: f32,
    /// Weighted regularizers, all zero when regularization was not requested.
    pub regularization: RegularizationTerms,
}

impl LossBreakdown {
    pub fn total(&self) -> f32 {
        self.fidelity + self.regularization.total()
    }
}

/// Scores a [`Scene`]: renders it, composites it over white and compares the result
/// with the [`Objective`], optionally adding the regularizers weighted by the
/// [`CoefficientBundle`]. Evaluation never mutates the scene.
pub struct LossEngine {
    objective: Objective,
    renderer: Box<dyn Renderer>,
    settings: RenderSettings,
    coefficients: CoefficientBundle,
    /// Tracks the total number of evaluations performed.
    total_evaluations: Cell<usize>,
}

impl LossEngine {
    pub fn new(
        objective: Objective,
        renderer: Box<dyn Renderer>,
        settings: RenderSettings,
        coefficients: CoefficientBundle,
    ) -> Self {
        LossEngine {
            objective,
            renderer,
            settings,
            coefficients,
            total_evaluations: Cell::new(0),
        }
    }

    pub fn coefficients(&self) -> &CoefficientBundle {
        &self.coefficients
    }

    pub fn get_total_evaluations(&self) -> usize {
        self.total_evaluations.get()
    }

    /// Renders the scene with the configured settings.
    pub fn render(&self, scene: &Scene, seed: u64) -> Result<RenderedImage> {
        self.renderer.render(&scene.assemble(), &self.settings, seed)
    }

    /// Evaluates the loss of `scene`.
    ///
    /// # Parameters
    /// - `seed`: Seed of the render and of the augmentation draws.
    /// - `with_regularization`: Whether the regularizers are added to the fidelity term.
    ///
    /// # Returns
    /// The loss terms, or the first renderer/embedding error.
    pub fn evaluate(&self, scene: &Scene, seed: u64, with_regularization: bool) -> Result<LossBreakdown> {
        self.total_evaluations.set(self.total_evaluations.get() + 1);
        let composite = self.render(scene, seed)?.composite_over_white();

        let fidelity = match &self.objective {
            Objective::Similarity {
                embedder,
                prompts,
                augmenter,
                num_augs,
            } => {
                let mut rng = StdRng::seed_from_u64(seed);
                let mut loss = 0.0;
                for _ in 0..*num_augs {
                    let view = augmenter.augment(&composite, &mut rng);
                    let embedding = embedder.encode_image(&view)?;
                    loss -= cosine_similarity(&prompts.text, &embedding)?;
                    if let Some(negative) = &prompts.negative {
                        loss += self.coefficients.neg_clip_coe * cosine_similarity(negative, &embedding)?;
                    }
                }
                loss
            }
            Objective::Pixel { target } => pixel_loss(&composite, target)?,
        };

        let mut regularization = RegularizationTerms::default();
        if with_regularization {
            regularization = regularization::scene_terms(scene, &self.coefficients);
            if self.coefficients.image_coe != 0.0 {
                regularization.image = self.coefficients.image_coe * regularization::total_variation(&composite);
            }
        }

        let breakdown = LossBreakdown {
            fidelity,
            regularization,
        };
        debug!("seed {seed}: fidelity {fidelity}, total {}", breakdown.total());
        Ok(breakdown)
    }

    /// Evaluates only the fidelity term.
    pub fn fidelity(&self, scene: &Scene, seed: u64) -> Result<f32> {
        Ok(self.evaluate(scene, seed, false)?.fidelity)
    }
}

/// `Σ (img - target)² / (W·H)`, summed over the three channels.
///
/// # Examples
/// ```
/// # use image::{Rgb, Rgb32FImage};
/// # use tilemosaic::loss_engine::pixel_loss;
/// let a = Rgb32FImage::from_pixel(2, 2, Rgb([1.0, 1.0, 1.0]));
/// let b = Rgb32FImage::from_pixel(2, 2, Rgb([0.5, 1.0, 1.0]));
/// assert_eq!(pixel_loss(&a, &b).unwrap(), 0.25);
/// ```
pub fn pixel_loss(img: &Rgb32FImage, target: &Rgb32FImage) -> Result<f32> {
    if img.dimensions() != target.dimensions() {
        return Err(MosaicError::TargetSize {
            width: img.width(),
            height: img.height(),
            actual_width: target.width(),
            actual_height: target.height(),
        });
    }
    let sum: f64 = img
        .pixels()
        .zip(target.pixels())
        .map(|(p, q)| (0..3).map(|c| ((p.0[c] - q.0[c]) as f64).powi(2)).sum::<f64>())
        .sum();
    Ok((sum / (img.width() as f64 * img.height() as f64)) as f32)
}

/// Replaces every `cell × cell` block of the target with its mean color and returns
/// the result together with its pixel loss against the target. An optimized grid of
/// the same cell size should score below it.
pub fn naive_baseline(target: &Rgb32FImage, cell: u32) -> Result<(Rgb32FImage, f32)> {
    let cell = cell.max(1);
    let (w, h) = target.dimensions();
    let mut out = Rgb32FImage::new(w, h);
    for x0 in (0..w).step_by(cell as usize) {
        for y0 in (0..h).step_by(cell as usize) {
            let x1 = (x0 + cell).min(w);
            let y1 = (y0 + cell).min(h);
            let mut mean = [0.0f64; 3];
            for y in y0..y1 {
                for x in x0..x1 {
                    let p = target.get_pixel(x, y).0;
                    for c in 0..3 {
                        mean[c] += p[c] as f64;
                    }
                }
            }
            let n = ((x1 - x0) * (y1 - y0)) as f64;
            let color = Rgb([(mean[0] / n) as f32, (mean[1] / n) as f32, (mean[2] / n) as f32]);
            for y in y0..y1 {
                for x in x0..x1 {
                    out.put_pixel(x, y, color);
                }
            }
        }
    }
    let loss = pixel_loss(&out, target)?;
    Ok((out, loss))
}
