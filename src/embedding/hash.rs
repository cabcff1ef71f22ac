//! Deterministic hash-based embedding backend.
//!
//! Feature-hashes lowercase alphanumeric tokens into a fixed-size vector and
//! L2-normalizes the result. Texts sharing tokens land near each other in
//! cosine space, which is enough for offline operation and tests. The
//! dimension is deliberately smaller than any semantic model's; vectors are
//! not comparable across differently-configured services.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingBackend;
use crate::core::errors::KnowledgeError;

pub struct HashEmbeddingBackend {
    model_id: String,
    dim: usize,
}

impl HashEmbeddingBackend {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self {
            model_id: format!("feature-hash-{dim}"),
            dim,
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes(digest[..8].try_into().expect("8 digest bytes"))
                as usize
                % self.dim;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

#[async_trait]
impl EmbeddingBackend for HashEmbeddingBackend {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        Ok(self.vectorize(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na * nb <= f32::EPSILON {
            0.0
        } else {
            dot / (na * nb)
        }
    }

    #[tokio::test]
    async fn deterministic_and_normalized() {
        let backend = HashEmbeddingBackend::new(64);
        let a = backend.embed("hardwood wide plank flooring").await.unwrap();
        let b = backend.embed("hardwood wide plank flooring").await.unwrap();

        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_tokens_score_higher_than_disjoint() {
        let backend = HashEmbeddingBackend::new(256);
        let query = backend.embed("hardwood flooring").await.unwrap();
        let close = backend
            .embed("kitchen flooring hardwood wide plank")
            .await
            .unwrap();
        let far = backend.embed("bathroom fixture double vanity").await.unwrap();

        assert!(cosine(&query, &close) > cosine(&query, &far));
    }

    #[tokio::test]
    async fn tokenization_ignores_case_and_punctuation() {
        let backend = HashEmbeddingBackend::new(128);
        let a = backend.embed("Kitchen: Flooring!").await.unwrap();
        let b = backend.embed("kitchen flooring").await.unwrap();
        assert_eq!(a, b);
    }
}
