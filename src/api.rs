use std::path::{Path, PathBuf};

use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Json, Multipart, State,
    },
    response::Response,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    models::ChatPayload,
    rag, streaming,
};

pub const HELLO_MESSAGE: &str = "Hello from Monday Bot Server!";

// --- Payloads y Respuestas de la API ---

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let upload_limit = app_state.config.upload_limit_bytes;
    Router::new()
        .route("/hello", get(hello_handler))
        .route("/api/bot/ask", post(ask_handler))
        .route(
            "/api/docs/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn hello_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": HELLO_MESSAGE }))
}

/// Responde a la conversación con texto plano emitido en tramos. La respuesta
/// se calcula entera antes de emitir el primer tramo.
#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(payload) = payload.map_err(|e| AppError::Input(e.body_text()))?;

    let answer = rag::answer_payload(
        &state.index,
        &state.llm_manager,
        &payload,
        state.config.top_k,
    )
    .await?;

    Ok(streaming::stream_text(answer))
}

/// Guarda el fichero subido en `UPLOAD_DIR`. No reindexa: el índice cargado
/// no cambia hasta reconstruirlo y reiniciar.
#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::Input(e.body_text()))?;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Input(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::Input("El campo 'file' no trae nombre de fichero".into()))?;
        let target = upload_target(&state.config.upload_dir, &filename)?;

        tokio::fs::create_dir_all(&state.config.upload_dir)
            .await
            .map_err(storage_error)?;

        // Se escribe a un temporal y se renombra al final: un cuerpo cortado a
        // medias no toca el fichero existente con el mismo nombre.
        let tmp_path = state
            .config
            .upload_dir
            .join(format!(".{filename}.{}.part", Uuid::new_v4()));
        let written = match write_field(&mut field, &tmp_path).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        if let Err(e) = tokio::fs::rename(&tmp_path, &target).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(storage_error(e));
        }

        info!("Fichero subido: {} ({} bytes)", target.display(), written);
        return Ok(Json(UploadResponse { filename }));
    }

    Err(AppError::Input("Falta el campo 'file' en el formulario".into()))
}

// --- Utilidades ---

async fn write_field(field: &mut Field<'_>, path: &Path) -> AppResult<usize> {
    let mut file = tokio::fs::File::create(path).await.map_err(storage_error)?;
    let mut written = 0usize;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::Input(e.body_text()))?
    {
        file.write_all(&chunk).await.map_err(storage_error)?;
        written += chunk.len();
    }
    file.flush().await.map_err(storage_error)?;
    file.sync_all().await.map_err(storage_error)?;
    Ok(written)
}

/// Ruta de destino para `filename` dentro de `dir`. Rechaza nombres que
/// podrían salir del directorio.
fn upload_target(dir: &Path, filename: &str) -> AppResult<PathBuf> {
    let invalid = filename.trim().is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        return Err(AppError::Input(format!("Nombre de fichero no permitido: '{filename}'")));
    }
    Ok(dir.join(filename))
}

fn storage_error(e: std::io::Error) -> AppError {
    AppError::Dependency(format!("Error de almacenamiento: {e}"))
}
