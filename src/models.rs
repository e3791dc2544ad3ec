//! Modelos de dominio (documentos, chunks) y payloads de la API de chat.

use serde::{Deserialize, Serialize};

/// Documento leído del directorio de origen. Sólo vive durante la construcción.
#[derive(Debug, Clone)]
pub struct Document {
    /// Ruta relativa a la raíz, separada por `/`.
    pub source: String,
    pub text: String,
}

/// Trozo contiguo de un documento, unidad de recuperación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    pub index: usize,
    /// Offset en bytes del inicio del chunk dentro del documento.
    pub offset: usize,
    pub text: String,
}

impl Chunk {
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

// --- Payloads de la API ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub role: String,
}

/// Descriptor del modelo que envía el cliente. Se acepta pero no se usa.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub max_length: u64,
    pub name: String,
    pub token_limit: u64,
}

/// Cuerpo de `POST /api/bot/ask`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub key: String,
    pub messages: Vec<Message>,
    pub model: ModelDescriptor,
    pub prompt: String,
}

impl ChatPayload {
    /// Contenido del último mensaje, tal cual, o `None` si no hay mensajes.
    pub fn effective_query(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_payload_with_camel_case_model() {
        let raw = r#"{
            "key": "",
            "messages": [
                {"content": "primera", "role": "user"},
                {"content": "  write code to resize image  ", "role": "user"}
            ],
            "model": {"id": "gpt-3.5-turbo", "maxLength": 12000, "name": "GPT-3.5", "tokenLimit": 4000},
            "prompt": "You are a bot."
        }"#;
        let payload: ChatPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.model.max_length, 12000);
        assert_eq!(payload.model.token_limit, 4000);
        assert_eq!(payload.effective_query(), Some("  write code to resize image  "));
    }

    #[test]
    fn missing_fields_are_rejected() {
        let raw = r#"{"messages": [], "prompt": "x"}"#;
        assert!(serde_json::from_str::<ChatPayload>(raw).is_err());
    }

    #[test]
    fn empty_messages_have_no_query() {
        let raw = r#"{"key":"","messages":[],"model":{"id":"x","maxLength":1,"name":"x","tokenLimit":1},"prompt":""}"#;
        let payload: ChatPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.effective_query(), None);
    }
}
