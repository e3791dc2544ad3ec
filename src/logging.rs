//! Logging a consola y a un fichero de sólo anexado.

use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Inicializa `tracing` con dos salidas: consola y `LOG_DIR/LOG_FILE`.
///
/// El `WorkerGuard` devuelto debe vivir tanto como el proceso; al soltarlo se
/// vacía el escritor del fichero.
pub fn init_logging(cfg: &AppConfig) -> Result<WorkerGuard> {
    fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("No se pudo crear el directorio de logs {}", cfg.log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&cfg.log_dir, &cfg.log_file);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .with_context(|| format!("LOG_LEVEL inválido: '{}'", cfg.log_level))?;

    let console_layer = fmt::layer().with_target(false);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("El logging ya estaba inicializado")?;

    Ok(guard)
}
