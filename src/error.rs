//! Taxonomía de errores del servidor y del constructor del índice.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Entrada del cliente mal formada o ausente (payload, directorio, fichero).
    #[error("Entrada inválida: {0}")]
    Input(String),

    /// Fallo del servicio externo de embeddings o de generación.
    #[error("Fallo del servicio de modelos: {0}")]
    Dependency(String),

    /// Índice ausente o corrupto al arrancar. Es fatal.
    #[error("Error de arranque: {0}")]
    Startup(String),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Input(_) => StatusCode::BAD_REQUEST,
            AppError::Dependency(_) => StatusCode::BAD_GATEWAY,
            AppError::Startup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, AppError::Dependency(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!("Petición fallida ({}): {}", status, self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
