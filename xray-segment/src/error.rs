use thiserror::Error;

/// Errors surfaced by the segment recording pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid user-supplied configuration, raised synchronously at setup time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The emitter rejected a closed segment.
    #[error("segment emission failed: {0}")]
    Emit(String),
}
