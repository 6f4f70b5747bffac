use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset must contain a '{0}' column (case-insensitive)")]
    MissingColumn(&'static str),

    #[error("symptom corpus has no rows")]
    EmptyCorpus,

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("embedding failed: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, TriageError>;
