//! Error types for the protocol layer.
//!
//! Each crate in Tablehub defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in serialization, not in
//! networking or room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated frames.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Command parameters did not match the shape the command expects.
    ///
    /// The frame itself was valid JSON, but e.g. `join-room` arrived
    /// without a `roomID`.
    #[error("invalid parameters for {kind}: {source}")]
    InvalidParams {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
