use thiserror::Error;

use crate::source::footprint::MemoryReport;

#[derive(Error, Debug)]
pub enum SkymapError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scan stream: {0}")]
    InvalidStream(String),

    #[error("Degenerate map geometry: {size_x}x{size_y} pixels")]
    DegenerateGeometry { size_x: i64, size_y: i64 },

    #[error("{0}")]
    InsufficientMemory(Box<MemoryReport>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty scan sequence")]
    EmptySequence,

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SkymapError>;
