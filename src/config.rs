//! Carga y gestión de configuración de la aplicación (servidor + constructor).
//!
//! `ENV=prod` carga `app.env`; cualquier otro valor carga `local.env`. Las
//! variables ya presentes en el proceso tienen prioridad sobre el fichero.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    /// Embeddings por hashing y respuestas extractivas, sin red.
    Offline,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "offline" => Ok(Self::Offline),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub env_name: String,
    pub settings_file: PathBuf,
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,

    pub index_path: PathBuf,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_file: String,
    pub log_level: String,

    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
    pub embed_concurrency: usize,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub upload_limit_bytes: usize,
}

/// Fichero de ajustes asociado a un entorno.
pub fn settings_file_for(env_name: &str) -> &'static str {
    if env_name == "prod" {
        "app.env"
    } else {
        "local.env"
    }
}

impl AppConfig {
    /// Carga el fichero de ajustes del entorno y construye la configuración
    /// a partir de las variables del proceso.
    pub fn load() -> Result<Self> {
        let env_name = env::var("ENV").unwrap_or_default();
        // Si el fichero no existe se usan sólo las variables del proceso.
        dotenvy::from_filename(settings_file_for(&env_name)).ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la configuración con una función de búsqueda arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let env_name = get("ENV", "local");
        let settings_file = PathBuf::from(settings_file_for(&env_name));

        let llm_provider = LlmProvider::from_str(&get("LLM_PROVIDER", "openai"))?;
        // Rig lee la clave del entorno del proceso; aquí sólo se exige que exista.
        let has_api_key = lookup("OPENAI_API_KEY").is_some_and(|k| !k.trim().is_empty());
        if llm_provider == LlmProvider::OpenAI && !has_api_key {
            return Err(anyhow!(
                "Falta OPENAI_API_KEY en el entorno ({})",
                settings_file.display()
            ));
        }

        let chunk_size: usize = parse_or(&lookup, "CHUNK_SIZE", 512)?;
        let chunk_overlap: usize = parse_or(&lookup, "CHUNK_OVERLAP", 20)?;
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({chunk_overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }

        let timeout_secs: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;

        Ok(Self {
            env_name,
            settings_file,
            server_addr: get("SERVER_ADDR", "127.0.0.1:8000"),
            llm_provider,
            llm_embedding_model: get("LLM_EMBEDDING_MODEL", "text-embedding-3-small"),
            llm_chat_model: get("LLM_CHAT_MODEL", "gpt-4o-mini"),
            index_path: PathBuf::from(get("INDEX_PATH", "doc-indices/docs_index.json")),
            data_dir: PathBuf::from(get("DATA_DIR", "data")),
            upload_dir: PathBuf::from(get("UPLOAD_DIR", "app_data")),
            log_dir: PathBuf::from(get("LOG_DIR", "logs")),
            log_file: get("LOG_FILE", "app.log"),
            log_level: get("LOG_LEVEL", "info"),
            top_k: parse_or::<_, usize>(&lookup, "TOP_K", 3)?.max(1),
            chunk_size,
            chunk_overlap,
            embed_batch_size: parse_or::<_, usize>(&lookup, "EMBED_BATCH_SIZE", 32)?.max(1),
            embed_concurrency: parse_or::<_, usize>(&lookup, "EMBED_CONCURRENCY", 4)?.max(1),
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            max_retries: parse_or(&lookup, "MAX_RETRIES", 2)?,
            upload_limit_bytes: parse_or(&lookup, "UPLOAD_LIMIT_BYTES", 25 * 1024 * 1024)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Valor inválido para {key}: '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn prod_env_selects_app_env_file() {
        assert_eq!(settings_file_for("prod"), "app.env");
        assert_eq!(settings_file_for("local"), "local.env");
        assert_eq!(settings_file_for(""), "local.env");
    }

    #[test]
    fn defaults_apply_for_offline_provider() {
        let cfg = config_from(&[("LLM_PROVIDER", "offline")]).unwrap();
        assert_eq!(cfg.llm_provider, LlmProvider::Offline);
        assert_eq!(cfg.index_path, PathBuf::from("doc-indices/docs_index.json"));
        assert_eq!(cfg.upload_dir, PathBuf::from("app_data"));
        assert_eq!(cfg.top_k, 3);
        assert_eq!(cfg.chunk_size, 512);
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn openai_requires_a_credential() {
        let err = config_from(&[("LLM_PROVIDER", "openai")]).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let cfg = config_from(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(cfg.llm_provider, LlmProvider::OpenAI);

        let blank = config_from(&[("OPENAI_API_KEY", "   ")]).unwrap_err();
        assert!(blank.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn rejects_bad_numbers_and_providers() {
        assert!(config_from(&[("LLM_PROVIDER", "offline"), ("TOP_K", "muchos")]).is_err());
        assert!(config_from(&[("LLM_PROVIDER", "gemini")]).is_err());
        assert!(config_from(&[
            ("LLM_PROVIDER", "offline"),
            ("CHUNK_SIZE", "10"),
            ("CHUNK_OVERLAP", "10"),
        ])
        .is_err());
    }
}
