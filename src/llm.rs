//! Abstracción sobre Rig para embeddings y generación, con timeout y
//! reintentos acotados alrededor de cada llamada al servicio externo.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::{AppConfig, LlmProvider};
use crate::embeddings::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::error::{AppError, AppResult};

/// Preámbulo usado cuando el cliente no envía `prompt`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Monday Bot, a helpful assistant. \
Answer using only the information in the provided context. \
If the context does not contain the answer, say that you don't know.";

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    /// Genera la respuesta a `question` a partir del prompt de sistema y del
    /// contexto recuperado.
    async fn answer(&self, system_prompt: &str, context: &str, question: &str)
        -> AppResult<String>;
}

// ---------------------------------------------------------------------
// CHAT / COMPLETION
// ---------------------------------------------------------------------

pub struct OpenAiGenerator {
    model: String,
}

impl OpenAiGenerator {
    pub fn new(model: &str) -> Self {
        let model = if model.is_empty() { "gpt-4o-mini" } else { model };
        Self {
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn answer(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> AppResult<String> {
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt;
        use rig::providers::openai;

        let client = openai::Client::from_env();

        let full_context = format!(
            "Context:\n{}\n\nUser question:\n{}",
            context, question
        );

        let agent = client
            .agent(&self.model)
            .preamble(system_prompt)
            .context(&full_context)
            .build();

        agent
            .prompt(question)
            .await
            .map_err(|e| AppError::Dependency(format!("generación de OpenAI: {e}")))
    }
}

/// Generador local: responde con los pasajes recuperados, sin modelo externo.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerator;

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn model_id(&self) -> &str {
        "extractive"
    }

    async fn answer(
        &self,
        _system_prompt: &str,
        context: &str,
        _question: &str,
    ) -> AppResult<String> {
        let passages: Vec<&str> = context
            .split(CONTEXT_SEPARATOR)
            .map(|p| strip_source_header(p).trim())
            .filter(|p| !p.is_empty())
            .collect();
        Ok(passages.join("\n\n"))
    }
}

/// Separador entre pasajes en el contexto que se entrega al generador.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Cabecera de fuente que precede a cada pasaje (`[source: ruta]`).
pub fn source_header(source: &str) -> String {
    format!("[source: {source}]\n")
}

fn strip_source_header(passage: &str) -> &str {
    let trimmed = passage.trim_start();
    if trimmed.starts_with("[source: ") {
        trimmed.split_once('\n').map(|(_, rest)| rest).unwrap_or("")
    } else {
        passage
    }
}

// ---------------------------------------------------------------------
// POLÍTICA DE LLAMADAS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl CallPolicy {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            timeout: cfg.request_timeout,
            max_retries: cfg.max_retries,
            initial_backoff: Duration::from_millis(500),
        }
    }

    /// Ejecuta `op` con timeout; reintenta sólo los `AppError::Dependency`,
    /// duplicando la espera entre intentos.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Dependency(format!(
                    "{what}: sin respuesta tras {:?}",
                    self.timeout
                ))),
            };

            match result {
                Err(err) if err.is_dependency() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} falló (intento {}/{}): {}. Reintentando en {:?}...",
                        what,
                        attempt,
                        self.max_retries + 1,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// Gestor de LLMs y embeddings compartido por el servidor y el constructor.
#[derive(Clone)]
pub struct LlmManager {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub policy: CallPolicy,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let policy = CallPolicy::from_config(cfg);
        match cfg.llm_provider {
            LlmProvider::OpenAI => Self::new(
                Arc::new(OpenAiEmbedder::new(&cfg.llm_embedding_model)),
                Arc::new(OpenAiGenerator::new(&cfg.llm_chat_model)),
                policy,
            ),
            LlmProvider::Offline => Self::new(
                Arc::new(HashingEmbedder::default()),
                Arc::new(ExtractiveGenerator),
                policy,
            ),
        }
    }

    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        policy: CallPolicy,
    ) -> Self {
        Self {
            embedder,
            generator,
            policy,
        }
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_id()
    }

    pub async fn embed_texts(&self, texts: &[String]) -> AppResult<Vec<Vec<f64>>> {
        let vectors = self
            .policy
            .run("embeddings", || self.embedder.embed_texts(texts))
            .await?;
        if vectors.len() != texts.len() {
            return Err(AppError::Dependency(format!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    pub async fn embed_query(&self, query: &str) -> AppResult<Vec<f64>> {
        let texts = [query.to_string()];
        self.embed_texts(&texts)
            .await?
            .pop()
            .ok_or_else(|| AppError::Dependency("No se pudo generar embedding de la query".into()))
    }

    pub async fn answer_with_context(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> AppResult<String> {
        let system_prompt = if system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            system_prompt
        };
        self.policy
            .run("generación", || {
                self.generator.answer(system_prompt, context, question)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_dependency_errors_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast_policy(2)
            .run("prueba", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::Dependency("429".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = fast_policy(1)
            .run("prueba", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Dependency("caído".into()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Dependency(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn input_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = fast_policy(3)
            .run("prueba", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Input("mal".into()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Input(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_calls_time_out_as_dependency_errors() {
        let result: AppResult<()> = fast_policy(0)
            .run("lento", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Dependency(msg)) if msg.contains("lento")));
    }

    #[tokio::test]
    async fn extractive_answer_drops_source_headers() {
        let context = format!(
            "{}The sky is blue.{}{}Grass is green.",
            source_header("cielo.txt"),
            CONTEXT_SEPARATOR,
            source_header("campo.txt")
        );
        let answer = ExtractiveGenerator
            .answer("You are a bot.", &context, "hello")
            .await
            .unwrap();
        assert_eq!(answer, "The sky is blue.\n\nGrass is green.");
    }
}
