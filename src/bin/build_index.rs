//! Constructor offline del índice de documentos.
//!
//! Uso:
//!   build_index --data-dir data --output doc-indices/docs_index.json
//!
//! Sin argumentos usa `DATA_DIR` e `INDEX_PATH` de la configuración. El
//! servidor no ve el índice nuevo hasta que se reinicia.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use monday_bot_server::{
    config::AppConfig,
    ingest::{self, BuildOptions},
    llm::LlmManager,
    logging,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "build_index")]
#[command(about = "Construye el índice de embeddings a partir de un directorio de documentos")]
struct Args {
    /// Directorio con los documentos de origen
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Ruta del índice a escribir (se sobrescribe)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = AppConfig::load().context("Error al cargar la configuración")?;
    let _log_guard = logging::init_logging(&cfg)?;

    let data_dir = args.data_dir.unwrap_or_else(|| cfg.data_dir.clone());
    let output = args.output.unwrap_or_else(|| cfg.index_path.clone());

    let llm_manager = LlmManager::from_config(&cfg);
    let options = BuildOptions::from_config(&cfg)?;

    info!(
        "Construyendo índice de {} con '{}'...",
        data_dir.display(),
        llm_manager.embedding_model()
    );
    let (index, summary) = ingest::build_index(&data_dir, &llm_manager, &options).await?;

    index
        .save(&output)
        .with_context(|| format!("No se pudo escribir el índice en {}", output.display()))?;

    info!("{summary}");
    println!("Build index completed! {} -> {}", summary, output.display());
    Ok(())
}
