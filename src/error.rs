//! Error types for index construction, queries and container I/O.

use thiserror::Error;

/// Error variants for building, opening and querying an index.
#[derive(Debug, Error)]
pub enum Error {
    /// An empty text cannot be indexed.
    #[error("cannot index an empty text")]
    EmptyText,

    /// The last byte of the text must not occur anywhere else in it.
    #[error("text must end with a unique sentinel byte")]
    MissingSentinel,

    /// Text length exceeds what the container format can address.
    #[error("text length {0} exceeds the maximum supported size")]
    TextTooLarge(usize),

    /// The learned-rank strides are inconsistent.
    #[error("coarse stride must be a positive multiple of the micro stride")]
    InvalidStrides,

    /// The suffix array sampling rate must be at least 1.
    #[error("suffix array sampling rate must be positive")]
    InvalidSamplingRate,

    /// A container file failed validation and was not mapped.
    #[error("invalid index container: {0}")]
    Format(String),

    /// An I/O error occurred while writing or mapping a container.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal consistency check failed during a query. This indicates a
    /// bug or a tampered container and is fatal for the affected index.
    #[error("index corruption detected: {0}")]
    Corruption(String),
}

/// A specialized Result type for index operations.
pub type Result<T> = std::result::Result<T, Error>;
