//! Consulta RAG contra el índice cargado en memoria.
//!
//! Flujo:
//!   1. Sin mensajes → saludo fijo.
//!   2. Embedding del contenido del último mensaje.
//!   3. Top-K por similitud coseno sobre todas las entradas.
//!   4. El LLM responde con el prompt del cliente, el contexto y la pregunta.
//!   5. Pregunta y respuesta quedan registradas en el log.

use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppResult,
    llm::{source_header, LlmManager, CONTEXT_SEPARATOR},
    models::ChatPayload,
    vector_store::DocumentIndex,
};

pub const GREETING: &str = "Hi, I'm Monday Bot. How can I help you today?";

pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information in the documents to answer this question.";

/// Respuesta de una consulta junto con los chunks usados.
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub matches: Vec<(String, f64)>,
}

/// Atiende un `ChatPayload` completo y devuelve el texto a emitir.
pub async fn answer_payload(
    index: &DocumentIndex,
    llm: &LlmManager,
    payload: &ChatPayload,
    top_k: usize,
) -> AppResult<String> {
    let request_id = Uuid::new_v4();
    info!(
        "[{}] Query: {} mensajes, modelo '{}', última: {:?}",
        request_id,
        payload.messages.len(),
        payload.model.id,
        payload.effective_query()
    );

    let Some(query) = payload.effective_query() else {
        info!("[{}] Response: {}", request_id, GREETING);
        return Ok(GREETING.to_string());
    };

    let result = rag_query(index, llm, &payload.prompt, query, top_k).await?;
    info!(
        "[{}] Response ({} chunks: {:?}): {}",
        request_id,
        result.matches.len(),
        result.matches,
        result.answer
    );
    Ok(result.answer)
}

/// Lanza una consulta RAG:
/// - Recupera los `top_k` chunks más similares a `question`.
/// - Llama al LLM con el contexto concatenado.
pub async fn rag_query(
    index: &DocumentIndex,
    llm: &LlmManager,
    system_prompt: &str,
    question: &str,
    top_k: usize,
) -> AppResult<RagAnswer> {
    if index.is_empty() {
        return Ok(RagAnswer {
            answer: NO_CONTEXT_ANSWER.to_string(),
            matches: Vec::new(),
        });
    }

    let query_vec = llm.embed_query(question).await?;
    let hits = index.search(&query_vec, top_k);

    let context = hits
        .iter()
        .map(|hit| format!("{}{}", source_header(&hit.entry.source), hit.entry.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    let matches = hits
        .iter()
        .map(|hit| (hit.entry.id.clone(), hit.score))
        .collect();

    let answer = llm.answer_with_context(system_prompt, &context, question).await?;
    Ok(RagAnswer { answer, matches })
}
