use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("Comparison key shapes differ: baseline [{baseline}] vs comparison [{comparison}]")]
    KeyShapeMismatch { baseline: String, comparison: String },

    #[error("Side effect has no organ system mapping: {0}")]
    UnmappedSideEffect(String),

    #[error("Empty selection: {0}")]
    EmptySelection(String),

    #[error("Data parsing error: {0}")]
    ParseError(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
