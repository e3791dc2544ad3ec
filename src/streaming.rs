//! Emisión de una respuesta ya calculada como cuerpo HTTP troceado.
//!
//! La respuesta completa existe antes de emitir el primer trozo; esto sólo
//! adapta el transporte a clientes que leen en streaming.

use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
};
use futures::stream;

pub const FRAME_SIZE: usize = 1024;

/// Divide `bytes` en tramos consecutivos de `frame_size` bytes (el último puede
/// ser más corto). Una entrada vacía no produce tramos.
pub fn split_frames(bytes: Bytes, frame_size: usize) -> Vec<Bytes> {
    let frame_size = frame_size.max(1);
    (0..bytes.len())
        .step_by(frame_size)
        .map(|start| bytes.slice(start..(start + frame_size).min(bytes.len())))
        .collect()
}

/// Respuesta `text/plain` cuyo cuerpo se emite en tramos de `FRAME_SIZE`.
pub fn stream_text(answer: String) -> Response {
    let frames = split_frames(Bytes::from(answer), FRAME_SIZE);
    let body = Body::from_stream(stream::iter(
        frames.into_iter().map(Ok::<_, std::io::Error>),
    ));
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
