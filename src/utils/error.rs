use thiserror::Error;

/// Question length ceiling, in characters, enforced at submission time.
pub const MAX_QUESTION_CHARS: usize = 1000;

#[derive(Error, Debug)]
pub enum DivinationError {
    #[error("Invalid cast: {message}")]
    InvalidCast { message: String },

    #[error("Invalid hexagram code: {code}")]
    InvalidHexagramCode { code: String },

    #[error("No hexagram found for code {code}")]
    HexagramNotFound { code: String },

    #[error("Reference dataset error: {message}")]
    DatasetError { message: String },

    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Question is {length} characters, maximum is {max}")]
    QuestionTooLong { length: usize, max: usize },

    #[error("Insufficient funds for interpretation")]
    InsufficientFunds,

    #[error("Interpretation failed: {message}")]
    InterpretationFailed { message: String },

    #[error("Session is in the wrong state: {message}")]
    InvalidState { message: String },

    #[error("Remote service returned {status}: {message}")]
    RemoteError { status: u16, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl DivinationError {
    /// True for failures the caller can resolve by re-prompting or retrying,
    /// as opposed to programmer errors and dataset corruption.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuestion
                | Self::QuestionTooLong { .. }
                | Self::InsufficientFunds
                | Self::InterpretationFailed { .. }
                | Self::ApiError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DivinationError>;
