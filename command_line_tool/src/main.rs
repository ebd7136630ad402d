use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use tilemosaic::coefficients::CoefficientBundle;
use tilemosaic::error::Result;
use tilemosaic::loss_engine::{LossEngine, Objective};
use tilemosaic::optimizer::{save_final_render, OptimizerLoop, OptimizerSettings};
use tilemosaic::pruner::TilePruner;
use tilemosaic::rasterizer::{CpuRasterizer, RenderSettings};
use tilemosaic::rendered_image::load_target;
use tilemosaic::tile_grid::TileGrid;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Fits a grid of colored tiles to a target image.")]
struct Args {
    /// Target image filename
    #[arg()]
    target: String,

    /// Number of optimization iterations
    #[arg(long, default_value_t = 100)]
    num_iter: usize,

    /// JSON file with the best hyperparameters; defaults are used if it is missing
    #[arg(long, default_value = "best_params.json")]
    params: String,

    /// Directory receiving snapshots and the optimized tiles/groups
    #[arg(long, default_value = "results")]
    output_dir: String,

    /// How many tiles to prune after optimization (0 disables pruning)
    #[arg(long, default_value_t = 0)]
    num_to_delete: usize,

    /// Seed of the initial tile colors
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Samples per pixel along each axis
    #[arg(long, default_value_t = 2)]
    samples: u32,

    /// Gamma used to linearize the target and encode the snapshots
    #[arg(long, default_value_t = 2.2)]
    gamma: f32,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    println!("Done.");
}

fn run(args: &Args) -> Result<()> {
    println!("Reading target image: {}", args.target);
    let target = load_target(&args.target, args.gamma)?;
    let (width, height) = target.dimensions();

    let coefficients = CoefficientBundle::load_or_default(&args.params, CoefficientBundle::pixel_defaults());
    let output_dir = PathBuf::from(&args.output_dir);
    std::fs::create_dir_all(&output_dir)?;

    let mut scene = TileGrid::pixel_layout(width, height).build_scene(args.seed);
    info!("initial scene: {} tiles on {}x{}", scene.len(), width, height);

    let engine = LossEngine::new(
        Objective::pixel(target),
        Box::new(CpuRasterizer::default()),
        RenderSettings {
            samples_x: args.samples,
            samples_y: args.samples,
            background: None,
        },
        coefficients.clone(),
    );

    let settings = OptimizerSettings {
        num_iterations: args.num_iter,
        snapshot_dir: Some(output_dir.clone()),
        gamma: args.gamma,
        final_render: args.num_to_delete == 0,
        ..OptimizerSettings::default()
    };
    let report = OptimizerLoop::new(settings, &coefficients).run(&mut scene, &engine)?;
    if let Some(loss) = report.final_loss() {
        println!("Final loss: {loss:.6}");
    }

    if args.num_to_delete > 0 {
        let mut pruner = TilePruner::after_optimization(args.num_iter);
        pruner.snapshot_dir = Some(output_dir.join("pruning"));
        pruner.gamma = args.gamma;
        let pruned = pruner.prune(&mut scene, &engine, args.num_to_delete)?;
        println!("Pruned {} tiles, {} left", pruned.removals.len(), scene.len());
        save_final_render(&scene, &engine, &output_dir, args.gamma)?;
    }

    save_scene(&scene, &output_dir)
}

fn save_scene(scene: &tilemosaic::scene::Scene, dir: &Path) -> Result<()> {
    let tiles = dir.join("tiles.json");
    let groups = dir.join("groups.json");
    scene.save(&tiles, &groups)?;
    println!("Tiles written to {} and {}", tiles.display(), groups.display());
    Ok(())
}
