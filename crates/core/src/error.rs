use thiserror::Error;

use crate::models::Stage;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("download from {locator} returned {status}")]
    Download { locator: String, status: String },

    #[error("unsupported document locator: {0}")]
    UnsupportedLocator(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("multimodal OCR failed: {0}")]
    OcrFailed(String),

    #[error("document has no readable text: {0}")]
    EmptyDocument(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding count {actual} doesn't match input count {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed while building index: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector for chunk {position} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        position: u64,
        expected: usize,
        actual: usize,
    },

    #[error("vector for chunk {0} contains non-finite values")]
    NonFinite(u64),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("query vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query vector contains non-finite values")]
    NonFinite,

    #[error("result count must be at least 1")]
    ZeroK,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("structured output could not be parsed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("generator returned {actual} answers for {expected} questions")]
    Misaligned { expected: usize, actual: usize },

    #[error("generator misconfigured: {0}")]
    Config(String),
}

/// Malformed input rejected before any stage runs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("documents locator is empty")]
    MissingDocument,

    #[error("questions list is empty")]
    NoQuestions,

    #[error("question {0} is blank")]
    BlankQuestion(usize),
}

/// The closed set of failures that abort a whole request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("failed to load document: {0}")]
    Acquisition(#[from] LoadError),

    #[error("document produced no chunks")]
    Segmentation,

    #[error("failed to build similarity index: {0}")]
    Index(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl PipelineError {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Request(_) => None,
            PipelineError::Acquisition(_) => Some(Stage::Load),
            PipelineError::Segmentation => Some(Stage::Chunk),
            PipelineError::Index(_) => Some(Stage::Index),
            PipelineError::Generation(_) => Some(Stage::Generate),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Request(_))
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
