//! Construcción del índice a partir de un directorio de documentos:
//! lectura → chunks → embeddings → `DocumentIndex` en memoria.
//!
//! Nada se escribe hasta que el índice está completo; el guardado lo hace
//! quien llama, con `DocumentIndex::save`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use futures::{stream, StreamExt, TryStreamExt};
use mime_guess::MimeGuess;
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{
    chunker::Chunker,
    config::AppConfig,
    error::{AppError, AppResult},
    llm::LlmManager,
    models::{Chunk, Document},
    vector_store::DocumentIndex,
};

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub chunks_created: usize,
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos. {} chunks creados.",
            self.files_scanned, self.files_ingested, self.files_skipped, self.chunks_created
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub chunker: Chunker,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl BuildOptions {
    pub fn from_config(cfg: &AppConfig) -> AppResult<Self> {
        Ok(Self {
            chunker: Chunker::new(cfg.chunk_size, cfg.chunk_overlap)?,
            batch_size: cfg.embed_batch_size.max(1),
            concurrency: cfg.embed_concurrency.max(1),
        })
    }
}

/// Recorre `root`, trocea cada documento y calcula sus embeddings. Los lotes
/// se envían en paralelo pero el índice conserva el orden de los chunks.
pub async fn build_index(
    root: &Path,
    llm: &LlmManager,
    opts: &BuildOptions,
) -> AppResult<(DocumentIndex, IngestionSummary)> {
    let root_owned = root.to_path_buf();
    let (documents, mut summary) = tokio::task::spawn_blocking(move || load_documents(&root_owned))
        .await
        .map_err(|e| AppError::Input(format!("Lectura de documentos interrumpida: {e}")))??;

    let chunks: Vec<Chunk> = documents
        .iter()
        .flat_map(|doc| opts.chunker.chunk(doc))
        .collect();
    summary.chunks_created = chunks.len();
    info!(
        "{} documentos troceados en {} chunks. Calculando embeddings con '{}'...",
        documents.len(),
        chunks.len(),
        llm.embedding_model()
    );

    let batches: Vec<Vec<String>> = chunks
        .chunks(opts.batch_size)
        .map(|batch| batch.iter().map(|c| c.text.clone()).collect())
        .collect();
    let total_batches = batches.len();

    let embedded: Vec<Vec<Vec<f64>>> = stream::iter(batches.into_iter().enumerate())
        .map(|(i, batch)| {
            let llm = llm.clone();
            async move {
                let vectors = llm.embed_texts(&batch).await?;
                info!("Lote de embeddings {}/{} completado.", i + 1, total_batches);
                Ok::<_, AppError>(vectors)
            }
        })
        .buffered(opts.concurrency)
        .try_collect()
        .await?;
    let embeddings: Vec<Vec<f64>> = embedded.into_iter().flatten().collect();

    let index = DocumentIndex::from_chunks(
        llm.embedding_model(),
        summary.files_ingested as usize,
        chunks,
        embeddings,
    )?;
    Ok((index, summary))
}

/// Lee todos los documentos con texto útil bajo `root`, en orden de nombre.
pub fn load_documents(root: &Path) -> AppResult<(Vec<Document>, IngestionSummary)> {
    if !root.is_dir() {
        return Err(AppError::Input(format!(
            "La ruta no es un directorio: {}",
            root.display()
        )));
    }
    fs::read_dir(root).map_err(|e| {
        AppError::Input(format!("No se pudo leer el directorio {}: {e}", root.display()))
    })?;

    let mut summary = IngestionSummary::default();
    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Entrada ilegible durante el recorrido: {err}");
                summary.files_skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        summary.files_scanned += 1;
        let path = entry.path();
        match read_document(path) {
            Some(text) => {
                summary.files_ingested += 1;
                documents.push(Document {
                    source: relative_source(root, path),
                    text,
                });
            }
            None => summary.files_skipped += 1,
        }
    }

    info!("Lectura de {} terminada. {}", root.display(), summary);
    Ok((documents, summary))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn relative_source(root: &Path, path: &Path) -> String {
    let relative: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_document(path: &Path) -> Option<String> {
    let extension = path
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("")
        .to_lowercase();

    let text = if extension == "pdf" {
        match pdf_extract::extract_text(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("No se pudo extraer texto del PDF {}: {}. Saltando fichero.", path.display(), e);
                return None;
            }
        }
    } else {
        let mime = MimeGuess::from_path(path).first();
        if let Some(mime) = mime {
            if matches!(mime.type_().as_str(), "image" | "audio" | "video" | "font") {
                info!("Saltando fichero binario ({}): {}", mime, path.display());
                return None;
            }
        }
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("No se pudo leer {}: {}", path.display(), e);
                return None;
            }
        };
        match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                warn!("Saltando fichero no-texto o no-UTF8: {}", path.display());
                return None;
            }
        }
    };

    if text.trim().is_empty() {
        warn!("Fichero vacío o sin texto útil: {}", path.display());
        return None;
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedder, HashingEmbedder};
    use crate::llm::{CallPolicy, ExtractiveGenerator};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn offline_llm() -> LlmManager {
        LlmManager::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(ExtractiveGenerator),
            CallPolicy::default(),
        )
    }

    fn options(size: usize, overlap: usize, batch_size: usize) -> BuildOptions {
        BuildOptions {
            chunker: Chunker::new(size, overlap).unwrap(),
            batch_size,
            concurrency: 4,
        }
    }

    fn write_corpus(dir: &Path) {
        fs::write(dir.join("cielo.txt"), "The sky is blue.").unwrap();
        fs::create_dir_all(dir.join("notas")).unwrap();
        fs::write(
            dir.join("notas").join("campo.md"),
            "Grass is green in spring. Cows eat the grass all day long.",
        )
        .unwrap();
        fs::write(dir.join(".oculto.txt"), "no debería indexarse").unwrap();
        fs::write(dir.join("logo.png"), [0x89, 0x50, 0x4e, 0x47]).unwrap();
        fs::write(dir.join("binario.dat"), [0xff, 0xfe, 0x00, 0x9f]).unwrap();
        fs::write(dir.join("vacio.txt"), "   \n").unwrap();
    }

    #[test]
    fn loads_text_documents_in_name_order() {
        let dir = tempdir().unwrap();
        write_corpus(dir.path());

        let (docs, summary) = load_documents(dir.path()).unwrap();
        let sources: Vec<&str> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["cielo.txt", "notas/campo.md"]);
        assert_eq!(
            summary,
            IngestionSummary {
                files_scanned: 5,
                files_ingested: 2,
                files_skipped: 3,
                chunks_created: 0,
            }
        );
    }

    #[test]
    fn missing_directory_is_an_input_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-existe");
        assert!(matches!(load_documents(&missing), Err(AppError::Input(_))));

        let file = dir.path().join("fichero.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(load_documents(&file), Err(AppError::Input(_))));
    }

    #[tokio::test]
    async fn builds_index_with_chunks_in_document_order() {
        let dir = tempdir().unwrap();
        write_corpus(dir.path());

        let (index, summary) = build_index(dir.path(), &offline_llm(), &options(4, 1, 1))
            .await
            .unwrap();

        assert_eq!(summary.chunks_created, index.len());
        assert_eq!(index.metadata.embedding_model, "hashing-256");
        assert_eq!(index.metadata.document_count, 2);
        assert_eq!(index.entries[0].id, "cielo.txt#0");
        assert_eq!(index.entries[0].text, "The sky is blue.");

        let embedder = HashingEmbedder::default();
        for (i, entry) in index.entries.iter().enumerate().skip(1) {
            assert_eq!(entry.source, "notas/campo.md");
            assert_eq!(entry.chunk_index, i - 1);
            // Los lotes concurrentes no desordenan los vectores.
            assert_eq!(entry.embedding, embedder.embed(&entry.text));
        }
    }

    #[tokio::test]
    async fn querying_with_a_chunk_text_retrieves_that_chunk() {
        let dir = tempdir().unwrap();
        write_corpus(dir.path());
        let llm = offline_llm();
        let (index, _) = build_index(dir.path(), &llm, &options(5, 0, 2)).await.unwrap();

        for entry in &index.entries {
            let query = llm.embed_query(&entry.text).await.unwrap();
            let hits = index.search(&query, 3);
            assert!(hits.iter().any(|h| h.entry.id == entry.id), "{} no recuperado", entry.id);
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_id(&self) -> &str {
            "roto"
        }

        async fn embed_texts(&self, _texts: &[String]) -> AppResult<Vec<Vec<f64>>> {
            Err(AppError::Dependency("cuota agotada".into()))
        }
    }

    #[tokio::test]
    async fn embedding_failures_abort_the_build() {
        let dir = tempdir().unwrap();
        write_corpus(dir.path());
        let llm = LlmManager::new(
            Arc::new(FailingEmbedder),
            Arc::new(ExtractiveGenerator),
            CallPolicy {
                timeout: Duration::from_secs(1),
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
            },
        );

        let result = build_index(dir.path(), &llm, &options(4, 1, 8)).await;
        assert!(matches!(result, Err(AppError::Dependency(_))));
    }

    #[tokio::test]
    async fn empty_directory_builds_an_empty_index() {
        let dir = tempdir().unwrap();
        let (index, summary) = build_index(dir.path(), &offline_llm(), &options(4, 1, 8))
            .await
            .unwrap();
        assert!(index.is_empty());
        assert_eq!(summary.files_scanned, 0);
    }
}
