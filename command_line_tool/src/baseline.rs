use clap::Parser;
use tilemosaic::error::Result;
use tilemosaic::loss_engine::naive_baseline;
use tilemosaic::rendered_image::{load_target, RenderedImage};

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Scores the per-cell mean color of a target image.")]
struct Args {
    /// Target image filename
    #[arg()]
    target: String,

    /// Cell size in pixels (default: a tenth of the target width)
    #[arg(long)]
    cell: Option<u32>,

    /// Gamma used to linearize the target
    #[arg(long, default_value_t = 2.2)]
    gamma: f32,

    /// Optionally write the baseline image
    #[arg(long)]
    output: Option<String>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    println!("Reading target image: {}", args.target);
    let target = load_target(&args.target, args.gamma)?;
    let cell = args.cell.unwrap_or(target.width() / 10).max(1);

    let (baseline, loss) = naive_baseline(&target, cell)?;
    println!("Naive baseline loss ({cell} px cells): {loss:.6}");

    if let Some(output) = &args.output {
        RenderedImage::from_opaque(&baseline).save(output, args.gamma)?;
        println!("Baseline written to {output}");
    }
    Ok(())
}
