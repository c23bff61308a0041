#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown filter config type: {0:?}")]
    UnknownFilterType(String),

    #[error("Filter config block has no valid type: {0}")]
    InvalidFilterType(String),

    #[error("Initialize filter module {type_name:?} failed: {source} (config: {raw})")]
    FilterInitFailed {
        type_name: String,
        raw: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Field not found: {0}")]
    MissingField(String),

    #[error("Field is not a sequence: {0}")]
    NotASequence(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Failed to send event downstream")]
    PipelineSend,

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
