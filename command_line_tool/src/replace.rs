use clap::Parser;
use tilemosaic::error::Result;
use tilemosaic::retrieval::ColorIndex;
use tilemosaic::scene::Scene;
use tilemosaic::tile_replacer::{TileDescriptor, TileReplacer};

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Replaces optimized tiles with retrieved photographs.")]
struct Args {
    /// Color index model; trained from the dataset and saved here if missing
    #[arg(long, default_value = "color_index.json")]
    model: String,

    /// Directory of dataset images
    #[arg(long)]
    dataset: String,

    /// Tiles written by the optimizer
    #[arg(long, default_value = "results/tiles.json")]
    shapes: String,

    /// Groups written by the optimizer
    #[arg(long, default_value = "results/groups.json")]
    shapes_groups: String,

    /// Output image name; `.png` is appended unless it ends in `.png` or `.jpg`
    #[arg(long, default_value = "mosaic")]
    output: String,

    /// Canvas width
    #[arg(long, default_value_t = 224)]
    width: u32,

    /// Canvas height
    #[arg(long, default_value_t = 224)]
    height: u32,
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
    let index = ColorIndex::load_or_train(&args.model, &args.dataset)?;
    let scene = Scene::load(args.width, args.height, &args.shapes, &args.shapes_groups)?;
    let tiles = TileDescriptor::from_scene(&scene);
    println!("Replacing {} tiles", tiles.len());

    let mosaic = TileReplacer::new(args.width, args.height).paint(&tiles, &index)?;
    let filename = output_filename(&args.output);
    println!("Writing image {filename}");
    mosaic.save(&filename)?;
    Ok(())
}

fn output_filename(name: &str) -> String {
    if name.ends_with(".png") || name.ends_with(".jpg") {
        name.to_string()
    } else {
        format!("{name}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_is_appended_only_when_missing() {
        assert_eq!(output_filename("mosaic"), "mosaic.png");
        assert_eq!(output_filename("mosaic.png"), "mosaic.png");
        assert_eq!(output_filename("mosaic.jpg"), "mosaic.jpg");
        assert_eq!(output_filename("mosaic.jpeg"), "mosaic.jpeg.png");
    }
}
