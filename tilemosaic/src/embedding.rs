use crate::error::{MosaicError, Result};
use image::Rgb32FImage;

/// An image-text embedding model.
///
/// Images handed to [`Embedder::encode_image`] are already augmented and normalized
/// (see [`crate::augmentation::Augmenter`]). Both encoders must return vectors of the
/// same dimension; they are compared with [`cosine_similarity`].
pub trait Embedder {
    fn encode_text(&self, text: &str) -> Result<Vec<f32>>;
    fn encode_image(&self, img: &Rgb32FImage) -> Result<Vec<f32>>;
}

/// Cosine of the angle between two embeddings. Zero vectors have similarity 0.
///
/// # Examples
/// ```
/// # use tilemosaic::embedding::cosine_similarity;
/// let s = cosine_similarity(&[1.0, 0.0], &[1.0, 1.0]).unwrap();
/// assert!((s - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
/// assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(MosaicError::EmbeddingError(format!(
            "embedding dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        Ok(0.0)
    } else {
        Ok(dot / (na * nb))
    }
}

/// Text embeddings of the positive prompt and the optional negative prompt, encoded
/// once before optimization starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptEmbeddings {
    pub text: Vec<f32>,
    pub negative: Option<Vec<f32>>,
}

impl PromptEmbeddings {
    pub fn encode(embedder: &dyn Embedder, prompt: &str, negative_prompt: Option<&str>) -> Result<Self> {
        let text = embedder.encode_text(prompt)?;
        let negative = match negative_prompt {
            Some(p) => Some(embedder.encode_text(p)?),
            None => None,
        };
        Ok(PromptEmbeddings { text, negative })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LengthEmbedder;

    impl Embedder for LengthEmbedder {
        fn encode_text(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
        fn encode_image(&self, img: &Rgb32FImage) -> Result<Vec<f32>> {
            Ok(vec![img.width() as f32, 1.0])
        }
    }

    #[test]
    fn negative_prompt_is_optional() {
        let with = PromptEmbeddings::encode(&LengthEmbedder, "a cat", Some("blurry")).unwrap();
        assert_eq!(with.text, vec![5.0, 1.0]);
        assert_eq!(with.negative, Some(vec![6.0, 1.0]));
        let without = PromptEmbeddings::encode(&LengthEmbedder, "a cat", None).unwrap();
        assert!(without.negative.is_none());
    }

    #[test]
    fn similarity_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[-3.0, 0.0]).unwrap() + 1.0).abs() < 1e-6);
    }
}
