//! Error types shared by every stage of a forecasting run.

use thiserror::Error;

/// Result type alias using [`ForecastError`].
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Top-level error for loading, windowing, training and persistence.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Invalid configuration, detected before any data is touched.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed or insufficient input data.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// A loss evaluated to NaN or infinity; the run is aborted.
    #[error("non-finite {stage} loss at epoch {epoch}, batch {batch}")]
    NonFiniteLoss {
        /// Stage in which the loss was computed.
        stage: Stage,
        /// Zero-based epoch (0 for test runs).
        epoch: usize,
        /// Zero-based batch index within the stage.
        batch: usize,
    },

    /// Tensor dimensions disagree with the model.
    #[error("shape mismatch: expected {expected}, got {got}")]
    Shape {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        got: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ForecastError {
    fn from(error: serde_json::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

impl From<bincode::Error> for ForecastError {
    fn from(error: bincode::Error) -> Self {
        ForecastError::Serialization(error.to_string())
    }
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must lie strictly between 0 and 1, got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be positive")]
    ZeroValue { name: &'static str },

    #[error("{name} must be finite and non-negative, got {value}")]
    InvalidNumber { name: &'static str, value: f64 },

    #[error("splitting {total} time indices with {name} = {fraction} leaves an empty partition")]
    EmptySplit {
        name: &'static str,
        fraction: f64,
        total: usize,
    },

    #[error("validation loss is monitored but no validation batches are available")]
    MissingValidation,
}

/// Data errors raised while loading or windowing series.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("column '{0}' is not present in the feature set")]
    MissingColumn(String),

    #[error("malformed timestamp '{value}' on row {row}")]
    MalformedTimestamp { row: usize, value: String },

    #[error("timestamps must be strictly increasing: row {row} ({current}) does not follow {previous}")]
    UnorderedTimestamps {
        row: usize,
        previous: String,
        current: String,
    },

    #[error("non-numeric value '{value}' in column '{column}' on row {row}")]
    MalformedValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("group '{group}' has {available} observations but a window needs {required}")]
    SeriesTooShort {
        group: String,
        required: usize,
        available: usize,
    },

    #[error("unsupported frequency '{0}'")]
    UnsupportedFrequency(String),

    #[error("record '{item}' starts at {start}, which is not aligned to the {freq} grid of the earliest record")]
    MisalignedRecord {
        item: String,
        start: String,
        freq: String,
    },

    #[error("item id '{0}' appears in more than one record")]
    DuplicateItem(String),

    #[error("records use mixed frequencies ({first} and {second})")]
    MixedFrequencies { first: String, second: String },

    #[error("{0} contains no observations")]
    Empty(String),
}

/// Stage of a run in which a loss is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Train,
    Validation,
    Test,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Train => write!(f, "train"),
            Stage::Validation => write!(f, "validation"),
            Stage::Test => write!(f, "test"),
        }
    }
}
