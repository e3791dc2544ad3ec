//! Troceado de documentos en ventanas de tokens con solapamiento.
//!
//! Un token es una secuencia de caracteres no blancos más los blancos que la
//! siguen; los blancos iniciales pertenecen al primer token. Así los chunks
//! son cortes exactos del texto y, leídos en orden, lo cubren sin huecos.

use crate::error::{AppError, AppResult};
use crate::models::{Chunk, Document};

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> AppResult<Self> {
        if size == 0 || overlap >= size {
            return Err(AppError::Input(format!(
                "Ventana de chunk inválida: tamaño {size}, solapamiento {overlap}"
            )));
        }
        Ok(Self { size, overlap })
    }

    /// Divide un documento en chunks. Los documentos en blanco no producen ninguno.
    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let text = doc.text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        let starts = token_starts(text);
        let total = starts.len();
        let boundary = |token: usize| starts.get(token).copied().unwrap_or(text.len());
        let step = self.size - self.overlap;

        let mut chunks = Vec::new();
        let mut first = 0;
        loop {
            let last = (first + self.size).min(total);
            let (start, end) = (boundary(first), boundary(last));
            chunks.push(Chunk {
                source: doc.source.clone(),
                index: chunks.len(),
                offset: start,
                text: text[start..end].to_string(),
            });
            if last == total {
                break;
            }
            first += step;
        }
        chunks
    }
}

fn token_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let mut seen_word = false;
    let mut prev_blank = false;
    for (i, c) in text.char_indices() {
        let blank = c.is_whitespace();
        if !blank {
            if seen_word && prev_blank {
                starts.push(i);
            }
            seen_word = true;
        }
        prev_blank = blank;
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            source: "notas.txt".to_string(),
            text: text.to_string(),
        }
    }

    /// Reconstruye el texto a partir de los chunks usando sus offsets.
    fn rebuild(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for c in chunks {
            assert!(c.offset <= out.len(), "hueco antes del chunk {}", c.index);
            let already = out.len() - c.offset;
            out.push_str(&c.text[already..]);
        }
        out
    }

    #[test]
    fn short_document_is_a_single_chunk() {
        let chunks = Chunker::new(512, 20).unwrap().chunk(&doc("The sky is blue."));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "The sky is blue.");
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].source, "notas.txt");
    }

    #[test]
    fn windows_overlap_and_cover_the_document() {
        let text = "  uno dos tres\ncuatro  cinco seis siete ocho nueve diez once\n";
        let chunks = Chunker::new(4, 1).unwrap().chunk(&doc(text));

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "  uno dos tres\ncuatro  ");
        assert_eq!(chunks[1].text, "cuatro  cinco seis siete ");
        assert_eq!(chunks.last().unwrap().end(), text.len());
        assert_eq!(rebuild(&chunks), text);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn windows_without_overlap_are_adjacent() {
        let text = "a b c d e f g";
        let chunks = Chunker::new(3, 0).unwrap().chunk(&doc(text));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["a b c ", "d e f ", "g"]);
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn multibyte_text_is_cut_on_char_boundaries() {
        let text = "canción año pingüino ñandú";
        let chunks = Chunker::new(2, 1).unwrap().chunk(&doc(text));
        assert_eq!(rebuild(&chunks), text);
    }

    #[test]
    fn blank_documents_produce_no_chunks() {
        let chunker = Chunker::new(8, 2).unwrap();
        assert!(chunker.chunk(&doc("")).is_empty());
        assert!(chunker.chunk(&doc(" \n\t ")).is_empty());
    }

    #[test]
    fn invalid_windows_are_input_errors() {
        assert!(matches!(Chunker::new(0, 0), Err(AppError::Input(_))));
        assert!(matches!(Chunker::new(4, 4), Err(AppError::Input(_))));
    }
}
