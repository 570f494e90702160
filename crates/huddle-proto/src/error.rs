//! Protocol-level errors.

use thiserror::Error;

/// Errors produced while decoding or encoding wire frames.
///
/// Decode failures are connection-boundary events: the gateway drops the
/// offending frame (or the connection, during the handshake) and the
/// registry never sees it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or did not match the closed vocabulary.
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),
}
