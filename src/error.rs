//! Error taxonomy of the extraction pipeline.
//!
//! Every stage returns either a complete value or one of these typed failures.
//! All of them are terminal for the current request.

use thiserror::Error;

/// Bad field specification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Field `{0}` is declared more than once")]
    DuplicateField(String),
    #[error("Field names must not be empty")]
    EmptyFieldName,
}

/// Bad or empty source content.
#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Invalid JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("No content to extract from")]
    EmptyContent,
    #[error("Source responded with status {0}")]
    UnexpectedStatus(u16),
    #[error("Readability extraction failed: {0}")]
    Readability(String),
}

/// Failure while retrieving raw content.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Page responded with status {0}")]
    Status(u16),
    #[error("Invalid header `{0}`")]
    InvalidHeader(String),
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),
    #[error("Response body is not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
}

/// Backend or model failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("Refusing to extract from empty content")]
    EmptyContent,
    #[error("Backend failure for {model}: {reason}")]
    BackendFailure { model: String, reason: String },
}

impl DispatchError {
    pub(crate) fn backend(model: &str, reason: impl std::fmt::Display) -> Self {
        Self::BackendFailure {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Unknown pricing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CostError {
    #[error("No pricing known for model: {0}")]
    UnknownModel(String),
}

/// Failure while turning structured output into exportable artifacts.
#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("Structured data is not a records container")]
    NotAContainer,
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Export is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Any failure that aborts a scrape request.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}
