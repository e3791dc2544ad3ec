use anyhow::{Context, Result};
use axum::Router;
use monday_bot_server::{
    api,
    app_state::AppState,
    config::AppConfig,
    llm::LlmManager,
    logging,
    vector_store::DocumentIndex,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar configuración (app.env / local.env) e inicializar logging
    let cfg = AppConfig::load().context("Error al cargar la configuración")?;
    let _log_guard = logging::init_logging(&cfg)?;
    info!(
        "Entorno '{}' (ajustes: {}), proveedor {:?}.",
        cfg.env_name,
        cfg.settings_file.display(),
        cfg.llm_provider
    );

    // 2. Inicializar gestor de LLMs
    let llm_manager = LlmManager::from_config(&cfg);
    info!(
        "Modelos: embeddings '{}', chat '{}'.",
        llm_manager.embedding_model(),
        llm_manager.generator.model_id()
    );

    // 3. Cargar el índice. Si falta o está corrupto, el proceso no arranca.
    let index = DocumentIndex::load(&cfg.index_path).map_err(|e| {
        error!("{e}");
        e
    })?;

    // 4. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), index, llm_manager).map_err(|e| {
        error!("{e}");
        e
    })?;

    // 5. Configurar el router de la API
    let app = Router::new()
        .merge(api::create_router(app_state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
