use codegraph_core::config::EmbeddingModelConfig;
use codegraph_core::error::StoreError;
use std::collections::{HashMap, VecDeque};
use tracing::warn;

const DEFAULT_EMBED_CACHE_CAPACITY: usize = 4096;

pub trait EmbeddingProvider: Send {
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;

    fn embed(&mut self, input: &str) -> Result<Vec<f32>, StoreError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&input.to_string()))?;
        vectors
            .pop()
            .ok_or_else(|| StoreError::external("embedding provider returned no vector"))
    }
}

pub fn build_embedding_provider(
    config: &EmbeddingModelConfig,
) -> Result<Box<dyn EmbeddingProvider + Send>, StoreError> {
    match config.provider.trim().to_ascii_lowercase().as_str() {
        #[cfg(feature = "fastembed")]
        "fastembed" => Ok(Box::new(fastembed_provider::FastEmbedProvider::new(
            config,
        )?)),
        _ => Ok(Box::new(DeterministicEmbedder::new(
            &config.model,
            config.dimensions,
        ))),
    }
}

/// Deterministic local embedder: unit-norm vectors drawn from a blake3
/// extendable-output stream over the input text. No model download, stable
/// across processes, good enough for tests and offline deployments.
pub struct DeterministicEmbedder {
    model_id: String,
    dimensions: usize,
    cache: HashMap<String, Vec<f32>>,
    cache_order: VecDeque<String>,
    cache_capacity: usize,
}

impl DeterministicEmbedder {
    pub fn new(model_id: &str, dimensions: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            dimensions,
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            cache_capacity: DEFAULT_EMBED_CACHE_CAPACITY,
        }
    }

    fn insert_cache_entry(&mut self, input: String, vector: Vec<f32>) {
        if self.cache_capacity == 0 {
            return;
        }
        while self.cache.len() >= self.cache_capacity {
            let Some(evicted) = self.cache_order.pop_front() else {
                break;
            };
            self.cache.remove(&evicted);
        }
        self.cache_order.push_back(input.clone());
        self.cache.insert(input, vector);
    }
}

impl EmbeddingProvider for DeterministicEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut output = Vec::with_capacity(inputs.len());
        for input in inputs {
            if let Some(cached) = self.cache.get(input) {
                output.push(cached.clone());
                continue;
            }
            let vector = deterministic_embedding(input, self.dimensions);
            self.insert_cache_entry(input.clone(), vector.clone());
            output.push(vector);
        }
        Ok(output)
    }
}

/// Unit-norm pseudo-random vector derived from the input text.
///
/// Each dimension takes four bytes from the blake3 XOF stream, mapped into
/// [-1, 1] before normalization.
pub fn deterministic_embedding(input: &str, dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }
    let mut hasher = blake3::Hasher::new();
    hasher.update(input.as_bytes());
    let mut stream = hasher.finalize_xof();

    let mut chunk = [0u8; 4];
    let mut samples = Vec::with_capacity(dimensions);
    for _ in 0..dimensions {
        stream.fill(&mut chunk);
        let raw = u32::from_le_bytes(chunk);
        samples.push(f64::from(raw) / f64::from(u32::MAX) * 2.0 - 1.0);
    }

    let norm = samples.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm == 0.0 {
        return samples.into_iter().map(|v| v as f32).collect();
    }
    samples.into_iter().map(|v| (v / norm) as f32).collect()
}

/// Cosine similarity between two vectors of equal length.
///
/// Dimension mismatches are a configuration error (`DimensionMismatch`); the
/// pipeline logs them and scores the pair as zero rather than failing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, StoreError> {
    if a.len() != b.len() {
        return Err(StoreError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = f64::from(*x);
        let y = f64::from(*y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Cosine similarity with the pipeline's degradation policy applied: a
/// mismatch is logged once per call site and scored as zero.
pub fn cosine_similarity_or_zero(a: &[f32], b: &[f32]) -> f64 {
    match cosine_similarity(a, b) {
        Ok(similarity) => similarity,
        Err(err) => {
            warn!(error = %err, "embedding comparison failed; scoring pair as zero");
            0.0
        }
    }
}

#[cfg(feature = "fastembed")]
mod fastembed_provider {
    use super::*;
    use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
    use std::sync::{Arc, Mutex};

    pub struct FastEmbedProvider {
        model_id: String,
        dimensions: usize,
        batch_size: usize,
        runtime: Option<Arc<Mutex<TextEmbedding>>>,
    }

    impl FastEmbedProvider {
        pub fn new(config: &EmbeddingModelConfig) -> Result<Self, StoreError> {
            let model: EmbeddingModel = config
                .model
                .parse()
                .map_err(|_| StoreError::external(format!("unknown fastembed model: {}", config.model)))?;
            let options = TextInitOptions::new(model).with_show_download_progress(false);
            let runtime = match TextEmbedding::try_new(options) {
                Ok(runtime) => Some(Arc::new(Mutex::new(runtime))),
                Err(err) => {
                    warn!(
                        model = config.model,
                        error = %err,
                        "fastembed initialization failed, falling back to deterministic embeddings"
                    );
                    None
                }
            };
            Ok(Self {
                model_id: config.model.clone(),
                dimensions: config.dimensions,
                batch_size: config.batch_size.max(1),
                runtime,
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed_batch(&mut self, inputs: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
            if inputs.is_empty() {
                return Ok(Vec::new());
            }
            if let Some(runtime) = self.runtime.as_ref() {
                let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
                let embedded = runtime
                    .lock()
                    .ok()
                    .and_then(|mut rt| rt.embed(refs, Some(self.batch_size)).ok());
                if let Some(vectors) = embedded {
                    if vectors.iter().all(|v| v.len() == self.dimensions) {
                        return Ok(vectors);
                    }
                    warn!(
                        model = self.model_id,
                        "fastembed returned invalid embedding shape; using deterministic fallback"
                    );
                }
            }
            Ok(inputs
                .iter()
                .map(|input| deterministic_embedding(input, self.dimensions))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_embedding_is_stable_and_unit_norm() {
        let a = deterministic_embedding("PaymentService", 64);
        let b = deterministic_embedding("PaymentService", 64);
        assert_eq!(a, b);

        let norm: f64 = a.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn different_inputs_produce_different_vectors() {
        let a = deterministic_embedding("alpha", 32);
        let b = deterministic_embedding("beta", 32);
        assert_ne!(a, b);
    }

    #[test]
    fn cosine_is_symmetric_and_bounded() {
        let a = deterministic_embedding("alpha", 32);
        let b = deterministic_embedding("beta", 32);
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-12);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn cosine_of_identical_nonzero_vectors_is_one() {
        let a = vec![0.5_f32, -0.25, 0.1];
        let similarity = cosine_similarity(&a, &a).unwrap();
        assert!((similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_rejects_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(err.to_string().contains("dimensions mismatch"));
        assert_eq!(cosine_similarity_or_zero(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn provider_caches_repeated_inputs() {
        let mut provider = DeterministicEmbedder::new("deterministic", 16);
        let first = provider
            .embed_batch(&["alpha".to_string(), "beta".to_string(), "alpha".to_string()])
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0], first[2]);
        assert_eq!(provider.cache.len(), 2);
    }
}
