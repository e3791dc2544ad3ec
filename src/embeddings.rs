//! Proveedores de embeddings.
//!
//! `OpenAiEmbedder` usa Rig contra la API de OpenAI. `HashingEmbedder` es
//! local y determinista (hashing de palabras a cubetas, normalizado L2) y
//! permite construir y consultar índices sin red.

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identificador estable del modelo; se guarda en el índice.
    fn model_id(&self) -> &str;

    /// Calcula un vector por texto, en el mismo orden de entrada.
    async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f64>>>;
}

// ---------------------------------------------------------------------
// OPENAI
// ---------------------------------------------------------------------

pub struct OpenAiEmbedder {
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(model: &str) -> Self {
        use rig::providers::openai::TEXT_EMBEDDING_3_SMALL;

        let model = if model.is_empty() {
            TEXT_EMBEDDING_3_SMALL
        } else {
            model
        };
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f64>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::embeddings::EmbeddingModel as _;
        use rig::providers::openai;

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // La clave se lee de OPENAI_API_KEY, cargada desde el fichero de ajustes.
        let client = openai::Client::from_env();
        let embedding_model = client.embedding_model(&self.model);

        let embeddings = embedding_model
            .embed_texts(texts.to_vec())
            .await
            .map_err(|e| AppError::Dependency(format!("embeddings de OpenAI: {e}")))?;

        if embeddings.len() != texts.len() {
            return Err(AppError::Dependency(format!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                embeddings.len(),
                texts.len()
            )));
        }

        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }
}

// ---------------------------------------------------------------------
// HASHING (offline)
// ---------------------------------------------------------------------

pub const HASHING_DIMENSIONS: usize = 256;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    model: String,
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            model: format!("hashing-{dimensions}"),
            dimensions,
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = fnv1a(word.to_lowercase().as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f64>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
