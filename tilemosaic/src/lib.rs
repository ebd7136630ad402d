//! # TileMosaic Library
//!
//! The `tilemosaic` library builds photomosaic-style images out of a grid of small
//! rectangular tiles. Every tile can be resized, rotated, moved and recolored; the
//! library fits those parameters so that the rendered composite matches either a target
//! image (pixel loss) or a text prompt (image-text embedding similarity), removes tiles
//! that do not help, and finally swaps every tile for a retrieved photograph.
//!
//! ## Overview of Modules
//!
//! - **`tile`** / **`tile_group`**: The learnable primitives. A `Tile` is a rectangle
//!   that grows from its upper-left anchor; a `TileGroup` rotates, translates and colors
//!   its member tiles.
//!
//! - **`canvas_transform`**: The 3×3 homogeneous shape-to-canvas transform of a group.
//!
//! - **`scene`**: Owns the ordered tiles and groups, flattens their parameters per
//!   family, and assembles the renderer input.
//!
//! - **`tile_grid`**: Lays out the initial grid of tiles.
//!
//! - **`rendered_image`**: RGBA render buffer, white compositing, gamma handling.
//!
//! - **`rasterizer`**: The `Renderer` interface and a CPU reference rasterizer with
//!   seeded, supersampled and prefiltered coverage.
//!
//! - **`augmentation`** / **`embedding`**: Random views of a render and the
//!   image-text embedding interface used by the similarity objective.
//!
//! - **`regularization`**: Geometric and neighbor penalties over the k nearest tile
//!   anchors.
//!
//! - **`loss_engine`**: Combines the fidelity term and the regularizers into one scalar.
//!
//! - **`gradient`** / **`optimizer`**: Finite-difference gradients, Adam with step
//!   decay, and the optimization loop.
//!
//! - **`pruner`**: Greedy removal of the tile whose absence lowers the loss the most.
//!
//! - **`retrieval`** / **`tile_replacer`**: Nearest-color photo lookup and the affine
//!   compositing that produces the final photomosaic.
//!
//! - **`coefficients`** / **`error`**: Hyperparameters and the error type.

pub mod augmentation;
pub mod canvas_transform;
pub mod coefficients;
pub mod embedding;
pub mod error;
pub mod gradient;
pub mod loss_engine;
pub mod optimizer;
pub mod pruner;
pub mod rasterizer;
pub mod regularization;
pub mod rendered_image;
pub mod retrieval;
pub mod scene;
pub mod tile;
pub mod tile_grid;
pub mod tile_group;
pub mod tile_replacer;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
