use crate::coefficients::CoefficientBundle;
use crate::error::Result;
use crate::gradient::FiniteDifference;
use crate::loss_engine::{LossBreakdown, LossEngine};
use crate::scene::{ParamFamily, Scene};
use log::info;
use std::path::{Path, PathBuf};

/// Seed of the render written after the last iteration.
pub const FINAL_RENDER_SEED: u64 = 102;

/// Adam update rule for one flat parameter vector.
#[derive(Debug, Clone)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    m: Vec<f32>,
    v: Vec<f32>,
    t: i32,
}

impl Default for Adam {
    fn default() -> Self {
        Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Adam {
    /// Applies one update with learning rate `lr`. Moment buffers are reset whenever
    /// the parameter count changes.
    pub fn step(&mut self, params: &mut [f32], grads: &[f32], lr: f32) {
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
            self.t = 0;
        }
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        for ((p, &g), (m, v)) in params.iter_mut().zip(grads).zip(self.m.iter_mut().zip(self.v.iter_mut())) {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

/// Multiplies the learning rate by `gamma` every `step_size` epochs.
///
/// # Examples
/// ```
/// # use tilemosaic::optimizer::StepLr;
/// let mut schedule = StepLr::for_iterations(0.01, 9);
/// for _ in 0..3 {
///     assert_eq!(schedule.lr(), 0.01);
///     schedule.step();
/// }
/// assert_eq!(schedule.lr(), 0.005);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLr {
    pub initial_lr: f32,
    pub step_size: usize,
    pub gamma: f32,
    epoch: usize,
}

impl StepLr {
    pub fn new(initial_lr: f32, step_size: usize, gamma: f32) -> Self {
        StepLr {
            initial_lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    /// Halves the rate every `⌊num_iterations / 3⌋` iterations.
    pub fn for_iterations(initial_lr: f32, num_iterations: usize) -> Self {
        Self::new(initial_lr, num_iterations / 3, 0.5)
    }

    pub fn lr(&self) -> f32 {
        self.initial_lr * self.gamma.powi((self.epoch / self.step_size) as i32)
    }

    pub fn step(&mut self) {
        self.epoch += 1;
    }
}

/// Optimizer and schedule of one parameter family.
#[derive(Debug, Clone)]
pub struct FamilyOptimizer {
    pub family: ParamFamily,
    adam: Adam,
    schedule: StepLr,
}

impl FamilyOptimizer {
    pub fn new(family: ParamFamily, lr: f32, num_iterations: usize) -> Self {
        FamilyOptimizer {
            family,
            adam: Adam::default(),
            schedule: StepLr::for_iterations(lr, num_iterations),
        }
    }

    pub fn lr(&self) -> f32 {
        self.schedule.lr()
    }
}

/// Settings of an [`OptimizerLoop`] run.
#[derive(Debug, Clone)]
pub struct OptimizerSettings {
    /// Fixed iteration budget; there is no early stopping.
    pub num_iterations: usize,
    /// A render is saved every `snapshot_every` iterations.
    pub snapshot_every: usize,
    /// Directory receiving `iter_<k>.png` snapshots and `final.png`. Nothing is written
    /// when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// Gamma used to encode snapshots.
    pub gamma: f32,
    /// Whether `run` writes `final.png`. Callers that keep editing the scene afterwards
    /// turn it off and call [`save_final_render`] themselves.
    pub final_render: bool,
    pub finite_difference: FiniteDifference,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            num_iterations: 100,
            snapshot_every: 5,
            snapshot_dir: None,
            gamma: 2.2,
            final_render: true,
            finite_difference: FiniteDifference::default(),
        }
    }
}

/// Renders `scene` with [`FINAL_RENDER_SEED`] and saves it as `final.png` in `dir`.
pub fn save_final_render(scene: &Scene, engine: &LossEngine, dir: &Path, gamma: f32) -> Result<()> {
    let img = engine.render(scene, FINAL_RENDER_SEED)?;
    img.save(dir.join("final.png"), gamma)
}

/// Loss per iteration of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationReport {
    pub losses: Vec<LossBreakdown>,
}

impl OptimizationReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().map(LossBreakdown::total)
    }
}

/// Fits the parameters of a [`Scene`] to a [`LossEngine`].
///
/// # How It Works
/// 1. **Initialization**: One [`FamilyOptimizer`] per [`ParamFamily`], each with the
///    learning rate of the [`CoefficientBundle`] and a [`StepLr`] schedule.
/// 2. **Iteration `t`**: The scene is rendered with seed `t + 1`, the regularized loss
///    and its gradient are evaluated, every family takes one step at its current
///    learning rate and every schedule advances. Colors are not projected back into
///    `[0, 1]`; saved images and replacement queries clamp them.
/// 3. **Snapshots**: Every `snapshot_every` iterations the render is saved.
/// 4. **Termination**: After `num_iterations` iterations a final render with
///    [`FINAL_RENDER_SEED`] is saved, unless `final_render` is off.
pub struct OptimizerLoop {
    settings: OptimizerSettings,
    families: Vec<FamilyOptimizer>,
}

impl OptimizerLoop {
    pub fn new(settings: OptimizerSettings, coefficients: &CoefficientBundle) -> Self {
        let n = settings.num_iterations;
        let families = ParamFamily::ALL
            .iter()
            .map(|&family| {
                let lr = match family {
                    ParamFamily::Color => coefficients.color_lr,
                    ParamFamily::Delta => coefficients.delta_lr,
                    ParamFamily::Angle => coefficients.angle_lr,
                    ParamFamily::Translation => coefficients.translation_lr,
                };
                FamilyOptimizer::new(family, lr, n)
            })
            .collect();
        OptimizerLoop { settings, families }
    }

    pub fn get_families(&self) -> &[FamilyOptimizer] {
        &self.families
    }

    /// Runs the full iteration budget on `scene`.
    pub fn run(&mut self, scene: &mut Scene, engine: &LossEngine) -> Result<OptimizationReport> {
        let mut report = OptimizationReport::default();
        if let Some(dir) = &self.settings.snapshot_dir {
            std::fs::create_dir_all(dir)?;
        }

        for t in 0..self.settings.num_iterations {
            let seed = t as u64 + 1;
            self.snapshot(scene, engine, t, seed)?;

            let (loss, gradients) = self.settings.finite_difference.gradients(engine, scene, seed)?;
            info!(
                "iteration {}: loss {:.6} (fidelity {:.6}), |grad| {:.6}",
                t,
                loss.total(),
                loss.fidelity,
                gradients.norm()
            );

            for family in &mut self.families {
                let mut params = scene.parameters(family.family);
                family.adam.step(&mut params, gradients.get(family.family), family.schedule.lr());
                scene.set_parameters(family.family, &params)?;
                family.schedule.step();
            }
            report.losses.push(loss);
        }

        if let Some(dir) = self.settings.snapshot_dir.as_ref().filter(|_| self.settings.final_render) {
            save_final_render(scene, engine, dir, self.settings.gamma)?;
        }
        info!("optimization done after {} loss evaluations", engine.get_total_evaluations());
        Ok(report)
    }

    fn snapshot(&self, scene: &Scene, engine: &LossEngine, t: usize, seed: u64) -> Result<()> {
        let every = self.settings.snapshot_every.max(1);
        if let Some(dir) = &self.settings.snapshot_dir {
            if t % every == 0 {
                let img = engine.render(scene, seed)?;
                img.save(dir.join(format!("iter_{}.png", t / every)), self.settings.gamma)?;
            }
        }
        Ok(())
    }
}
