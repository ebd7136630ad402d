use crate::error::Result;
use crate::loss_engine::LossEngine;
use crate::scene::Scene;
use crate::tile::TileId;
use log::{debug, info};
use std::path::PathBuf;

/// A tile permanently taken out of the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Removal {
    /// Position of the tile in the scene before removal.
    pub index: usize,
    pub tile_id: TileId,
    /// `baseline - loss`, always positive.
    pub contribution: f32,
    /// Fidelity loss before the round.
    pub baseline: f32,
    /// Fidelity loss after the removal.
    pub loss: f32,
}

/// Result of one pruning round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoundOutcome {
    Removed(Removal),
    /// No single removal lowers the loss; the scene was left as it was.
    NoCandidate { baseline: f32 },
}

/// Everything removed by [`TilePruner::prune`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneReport {
    pub removals: Vec<Removal>,
    /// Whether pruning stopped because no candidate was left.
    pub exhausted: bool,
}

/// Greedy tile removal.
///
/// Every round scores the scene once, then once per tile with that tile taken out.
/// The tile whose absence lowers the fidelity loss the most is removed for good. All
/// evaluations use the same seed and no regularization, so the scores of a round are
/// directly comparable.
#[derive(Debug, Clone)]
pub struct TilePruner {
    seed: u64,
    /// Directory receiving a render after every removal, if any.
    pub snapshot_dir: Option<PathBuf>,
    pub gamma: f32,
}

impl TilePruner {
    pub fn new(seed: u64) -> Self {
        TilePruner {
            seed,
            snapshot_dir: None,
            gamma: 2.2,
        }
    }

    /// A pruner seeded with the iteration budget of the optimization that preceded it.
    pub fn after_optimization(num_iterations: usize) -> Self {
        Self::new(num_iterations as u64)
    }

    pub fn get_seed(&self) -> u64 {
        self.seed
    }

    /// Runs one round.
    ///
    /// # Returns
    /// [`RoundOutcome::Removed`] with the first index of maximal positive contribution,
    /// or [`RoundOutcome::NoCandidate`] if no removal lowers the loss.
    pub fn round(&self, scene: &mut Scene, engine: &LossEngine) -> Result<RoundOutcome> {
        let baseline = engine.fidelity(scene, self.seed)?;
        let mut best: Option<(usize, f32, f32)> = None;
        let mut max_contribution = 0.0;

        for i in 0..scene.len() {
            let (tile, group) = scene.remove_at(i);
            let candidate = engine.fidelity(scene, self.seed);
            scene.insert_at(i, tile, group);
            let candidate = candidate?;

            let contribution = baseline - candidate;
            debug!("tile {i}: loss {candidate}, contribution {contribution}");
            if contribution > max_contribution {
                max_contribution = contribution;
                best = Some((i, contribution, candidate));
            }
        }

        let Some((index, contribution, loss)) = best else {
            return Ok(RoundOutcome::NoCandidate { baseline });
        };
        let (tile, _group) = scene.remove_at(index);
        Ok(RoundOutcome::Removed(Removal {
            index,
            tile_id: tile.id,
            contribution,
            baseline,
            loss,
        }))
    }

    /// Runs up to `num_to_delete` rounds, stopping at the first round without a
    /// candidate.
    pub fn prune(&self, scene: &mut Scene, engine: &LossEngine, num_to_delete: usize) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        if let Some(dir) = &self.snapshot_dir {
            std::fs::create_dir_all(dir)?;
        }
        for k in 0..num_to_delete {
            match self.round(scene, engine)? {
                RoundOutcome::Removed(removal) => {
                    info!(
                        "round {}: removed tile {} (index {}), loss {:.6} -> {:.6}",
                        k, removal.tile_id.0, removal.index, removal.baseline, removal.loss
                    );
                    if let Some(dir) = &self.snapshot_dir {
                        let img = engine.render(scene, self.seed)?;
                        img.save(dir.join(format!("prune_{k}.png")), self.gamma)?;
                    }
                    report.removals.push(removal);
                }
                RoundOutcome::NoCandidate { baseline } => {
                    info!("round {k}: no tile improves on loss {baseline:.6}, stopping");
                    report.exhausted = true;
                    break;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coefficients::CoefficientBundle;
    use crate::loss_engine::Objective;
    use crate::rasterizer::{CpuRasterizer, RenderSettings};
    use crate::tile_grid::TileGrid;
    use image::{Rgb, Rgb32FImage};

    fn engine(target: [f32; 3]) -> LossEngine {
        LossEngine::new(
            Objective::pixel(Rgb32FImage::from_pixel(16, 16, Rgb(target))),
            Box::new(CpuRasterizer::default()),
            RenderSettings::default(),
            CoefficientBundle::pixel_defaults(),
        )
    }

    /// Four touching red tiles, the one at `wrong` painted black.
    fn scene_with_wrong_tile(wrong: usize) -> Scene {
        let mut scene = TileGrid::new(16, 16, 8, 8.0).build_scene_with(|_| [1.0, 0.0, 0.0]);
        scene.group_mut(wrong).color = [0.0, 0.0, 0.0, 1.0];
        scene
    }

    #[test]
    fn removes_the_tile_that_hurts() {
        // Against white, a black tile costs more than the white canvas behind it.
        let engine = engine([1.0, 1.0, 1.0]);
        let mut scene = scene_with_wrong_tile(2);
        let id = scene.tiles()[2].id;
        let outcome = TilePruner::new(7).round(&mut scene, &engine).unwrap();
        match outcome {
            RoundOutcome::Removed(r) => {
                assert_eq!(r.index, 2);
                assert_eq!(r.tile_id, id);
                assert!(r.loss <= r.baseline);
                assert_eq!(r.contribution, r.baseline - r.loss);
            }
            RoundOutcome::NoCandidate { .. } => panic!("expected a removal"),
        }
        assert_eq!(scene.len(), 3);
        assert!(scene.tiles().iter().all(|t| t.id != id));
    }

    #[test]
    fn loss_after_round_matches_reported_loss() {
        let engine = engine([1.0, 1.0, 1.0]);
        let mut scene = scene_with_wrong_tile(0);
        let pruner = TilePruner::new(3);
        let RoundOutcome::Removed(r) = pruner.round(&mut scene, &engine).unwrap() else {
            panic!("expected a removal");
        };
        assert_eq!(engine.fidelity(&scene, pruner.get_seed()).unwrap(), r.loss);
    }

    #[test]
    fn no_candidate_leaves_scene_untouched() {
        let engine = engine([1.0, 0.0, 0.0]);
        let mut scene = TileGrid::new(16, 16, 8, 8.0).build_scene_with(|_| [1.0, 0.0, 0.0]);
        let before = scene.clone();
        let outcome = TilePruner::new(1).round(&mut scene, &engine).unwrap();
        assert!(matches!(outcome, RoundOutcome::NoCandidate { .. }));
        assert_eq!(scene, before);
    }

    #[test]
    fn prune_stops_when_exhausted() {
        let engine = engine([1.0, 1.0, 1.0]);
        let mut scene = TileGrid::new(16, 16, 8, 8.0).build_scene_with(|_| [0.0, 0.0, 0.0]);
        let report = TilePruner::after_optimization(10).prune(&mut scene, &engine, 10).unwrap();
        assert_eq!(report.removals.len(), 4);
        assert!(report.exhausted);
        assert!(scene.is_empty());
        for pair in report.removals.windows(2) {
            assert!(pair[1].baseline <= pair[0].baseline);
        }
    }

    #[test]
    fn equal_contributions_remove_the_first_tile() {
        // Hard edges and touching cells: every tile covers exactly a quarter of the canvas.
        let engine = LossEngine::new(
            Objective::pixel(Rgb32FImage::from_pixel(16, 16, Rgb([1.0, 1.0, 1.0]))),
            Box::new(CpuRasterizer::box_filter()),
            RenderSettings::default(),
            CoefficientBundle::pixel_defaults(),
        );
        let mut scene = TileGrid::new(16, 16, 8, 8.0).build_scene_with(|_| [0.0, 0.0, 0.0]);
        let ids: Vec<TileId> = scene.tiles().iter().map(|t| t.id).collect();
        let pruner = TilePruner::new(5);

        let RoundOutcome::Removed(first) = pruner.round(&mut scene.clone(), &engine).unwrap() else {
            panic!("expected a removal");
        };
        assert_eq!(first.index, 0);
        assert_eq!(first.baseline, 3.0);
        assert_eq!(first.contribution, 0.75);

        let report = pruner.prune(&mut scene, &engine, 4).unwrap();
        assert!(report.removals.iter().all(|r| r.index == 0));
        assert_eq!(report.removals.iter().map(|r| r.tile_id).collect::<Vec<_>>(), ids);
    }
}
