use crate::error::Result;
use crate::loss_engine::{LossBreakdown, LossEngine};
use crate::scene::{ParamFamily, Scene};
use std::collections::HashMap;

/// Per-family gradients, laid out like [`Scene::parameters`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradients {
    values: HashMap<ParamFamily, Vec<f32>>,
}

impl Gradients {
    /// Gradient of `family`; empty if it was never computed.
    pub fn get(&self, family: ParamFamily) -> &[f32] {
        self.values.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn insert(&mut self, family: ParamFamily, values: Vec<f32>) {
        self.values.insert(family, values);
    }

    /// Euclidean norm over every family.
    pub fn norm(&self) -> f32 {
        self.values.values().flatten().map(|g| g * g).sum::<f32>().sqrt()
    }
}

/// Central finite differences of the regularized loss.
///
/// Every perturbed evaluation reuses the iteration's seed, so the render jitter and
/// augmentation draws are the same on both sides of a difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteDifference {
    pub color_step: f32,
    pub delta_step: f32,
    pub angle_step: f32,
    pub translation_step: f32,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        FiniteDifference {
            color_step: 1e-2,
            delta_step: 1e-1,
            angle_step: 1e-2,
            translation_step: 1e-3,
        }
    }
}

impl FiniteDifference {
    pub fn step(&self, family: ParamFamily) -> f32 {
        match family {
            ParamFamily::Color => self.color_step,
            ParamFamily::Delta => self.delta_step,
            ParamFamily::Angle => self.angle_step,
            ParamFamily::Translation => self.translation_step,
        }
    }

    /// Evaluates the loss at the current parameters and its gradient for every family.
    ///
    /// The scene is perturbed one scalar at a time and every scalar is written back to
    /// its original value, so it leaves this function unchanged.
    pub fn gradients(&self, engine: &LossEngine, scene: &mut Scene, seed: u64) -> Result<(LossBreakdown, Gradients)> {
        let loss = engine.evaluate(scene, seed, true)?;
        let mut gradients = Gradients::default();
        for family in ParamFamily::ALL {
            let h = self.step(family);
            let values = scene.parameters(family);
            let mut grad = vec![0.0; values.len()];
            for (i, &v) in values.iter().enumerate() {
                scene.set_parameter(family, i, v + h);
                let plus = engine.evaluate(scene, seed, true);
                scene.set_parameter(family, i, v - h);
                let minus = engine.evaluate(scene, seed, true);
                scene.set_parameter(family, i, v);
                grad[i] = (plus?.total() - minus?.total()) / (2.0 * h);
            }
            gradients.insert(family, grad);
        }
        Ok((loss, gradients))
    }
}
