//! Error types for the enhancement pipeline.

use thiserror::Error;

/// Result type for all fallible pipeline operations.
pub type Result<T> = std::result::Result<T, DenoiseError>;

/// Pipeline error taxonomy.
///
/// Structural errors (`InvalidConfig`, `InvalidWindowConfig`, `StateShape`,
/// `IncompatibleModel`, `UnknownModelType`) are fatal at construction time:
/// no partial pipeline is ever returned. `OutOfRangeParameter` is only
/// produced by the strict tuning constructor; the lenient path clamps and
/// warns instead.
#[derive(Error, Debug)]
pub enum DenoiseError {
    /// Non-positive or inconsistent framing parameters.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Window/hop pair does not satisfy constant overlap-add.
    #[error("invalid window config: {0}")]
    InvalidWindowConfig(String),

    /// Hidden-state dimensions do not match the configured layer sizes.
    #[error("hidden state shape mismatch: {0}")]
    StateShape(String),

    /// Weight tensor shapes do not match the configured layer dimensions.
    #[error("incompatible model: {0}")]
    IncompatibleModel(String),

    /// Model-type tag has no registered constructor.
    #[error("unknown model type: {0:?}")]
    UnknownModelType(String),

    /// Audio sample rate the pipeline cannot consume.
    #[error("unsupported sample rate: {0} Hz (supported: 8000, 16000)")]
    UnsupportedSampleRate(u32),

    /// Tuning parameter outside its valid range (strict constructor only).
    #[error("parameter out of range: {0}")]
    OutOfRangeParameter(String),

    /// I/O error from the table writer or WAV drivers.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
