use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    llm::LlmManager,
    vector_store::DocumentIndex,
};

/// Estado compartido del servidor. El índice es de sólo lectura durante
/// toda la vida del proceso; reindexar exige reiniciar.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub index: Arc<DocumentIndex>,
    pub llm_manager: LlmManager,
}

impl AppState {
    /// Comprueba que el embedder de consultas es el mismo que construyó el índice.
    pub fn new(config: AppConfig, index: DocumentIndex, llm_manager: LlmManager) -> AppResult<Self> {
        let index_model = &index.metadata.embedding_model;
        if !index.is_empty() && index_model != llm_manager.embedding_model() {
            return Err(AppError::Startup(format!(
                "El índice se construyó con '{}' pero el servidor consulta con '{}'",
                index_model,
                llm_manager.embedding_model()
            )));
        }

        Ok(Self {
            config: Arc::new(config),
            index: Arc::new(index),
            llm_manager,
        })
    }
}
