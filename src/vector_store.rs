//! Índice vectorial persistido en un único fichero JSON versionado.
//!
//! API pública:
//!   - `DocumentIndex::from_chunks(...)` / `save(path)` (constructor)
//!   - `DocumentIndex::load(path)` (servidor, todo o nada)
//!   - `DocumentIndex::search(&[f64], usize)`

use std::cmp::Ordering;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::Chunk;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub embedding_model: String,
    pub dimensions: usize,
    pub built_at: DateTime<Utc>,
    pub document_count: usize,
}

/// Entrada del índice: un chunk con su vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub source: String,
    pub chunk_index: usize,
    pub offset: usize,
    pub text: String,
    pub embedding: Vec<f64>,
    pub embedding_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndex {
    pub format_version: u32,
    pub metadata: IndexMetadata,
    pub entries: Vec<IndexEntry>,
}

/// Resultado de una búsqueda.
#[derive(Debug, Clone)]
pub struct ScoredEntry<'a> {
    pub score: f64,
    pub entry: &'a IndexEntry,
}

impl DocumentIndex {
    /// Ensambla el índice a partir de chunks y vectores en el mismo orden.
    pub fn from_chunks(
        embedding_model: &str,
        document_count: usize,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f64>>,
    ) -> AppResult<Self> {
        if chunks.len() != embeddings.len() {
            return Err(AppError::Dependency(format!(
                "Número de embeddings ({}) distinto al número de chunks ({})",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if embedding.len() != dimensions {
                return Err(AppError::Dependency(format!(
                    "Dimensión inconsistente en {}#{}: {} en lugar de {}",
                    chunk.source,
                    chunk.index,
                    embedding.len(),
                    dimensions
                )));
            }
            entries.push(IndexEntry {
                id: format!("{}#{}", chunk.source, chunk.index),
                source: chunk.source,
                chunk_index: chunk.index,
                offset: chunk.offset,
                text: chunk.text,
                embedding,
                embedding_model: embedding_model.to_string(),
            });
        }

        Ok(Self {
            format_version: FORMAT_VERSION,
            metadata: IndexMetadata {
                embedding_model: embedding_model.to_string(),
                dimensions,
                built_at: Utc::now(),
                document_count,
            },
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Escribe el índice de una sola vez: fichero temporal en el mismo
    /// directorio y `rename` sobre el destino.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        fs::create_dir_all(&dir)?;

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "index.json".to_string());
        let tmp_path = dir.join(format!(".{file_name}.tmp"));

        let bytes = serde_json::to_vec(self)?;
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;

        info!(
            "Índice guardado en {} ({} entradas, {} bytes).",
            path.display(),
            self.entries.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Carga y valida un índice. Cualquier problema es un `AppError::Startup`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::Startup(format!("No se pudo leer el índice {}: {e}", path.display()))
        })?;
        let index: DocumentIndex = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::Startup(format!("Índice corrupto en {}: {e}", path.display()))
        })?;
        index.validate()?;

        info!(
            "Índice cargado desde {}: {} entradas, modelo '{}', construido {}.",
            path.display(),
            index.entries.len(),
            index.metadata.embedding_model,
            index.metadata.built_at.to_rfc3339()
        );
        Ok(index)
    }

    fn validate(&self) -> AppResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(AppError::Startup(format!(
                "Versión de índice no soportada: {} (se esperaba {})",
                self.format_version, FORMAT_VERSION
            )));
        }
        for entry in &self.entries {
            if entry.embedding.len() != self.metadata.dimensions {
                return Err(AppError::Startup(format!(
                    "La entrada {} tiene dimensión {} en lugar de {}",
                    entry.id,
                    entry.embedding.len(),
                    self.metadata.dimensions
                )));
            }
            if entry.embedding_model != self.metadata.embedding_model {
                return Err(AppError::Startup(format!(
                    "La entrada {} usa el modelo '{}' en lugar de '{}'",
                    entry.id, entry.embedding_model, self.metadata.embedding_model
                )));
            }
        }
        Ok(())
    }

    /// Devuelve las `top_k` entradas más similares por coseno, de mayor a
    /// menor. A igualdad de score se conserva el orden del índice.
    pub fn search(&self, query: &[f64], top_k: usize) -> Vec<ScoredEntry<'_>> {
        let mut scored: Vec<ScoredEntry<'_>> = self
            .entries
            .iter()
            .map(|entry| ScoredEntry {
                score: cosine_similarity(query, &entry.embedding),
                entry,
            })
            .collect();

        // sort_by es estable.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
