use thiserror::Error;

#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Scene mismatch: {tiles} tiles but {groups} groups")]
    SceneMismatch { tiles: usize, groups: usize },

    #[error("Parameter vector for {family} has length {actual}, expected {expected}")]
    ParameterLength {
        family: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Target image is {actual_width}x{actual_height}, canvas is {width}x{height}")]
    TargetSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

pub type Result<T> = std::result::Result<T, MosaicError>;
