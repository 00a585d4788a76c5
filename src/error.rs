use std::time::Duration;

use thiserror::Error;

use crate::api_connection::connection::ApiConnectionError;

/// Rejected construction of a domain record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecordError {
    #[error("item name must not be empty")]
    MissingName,
    #[error("grocery list must contain at least one item")]
    EmptyList,
    #[error("price for '{name}' must not be negative (got {price})")]
    NegativePrice { name: String, price: f64 },
    #[error("budget must not be negative (got {0})")]
    NegativeBudget(f64),
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
}

/// A completion that did not yield the payload we asked for.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MalformedGenerationError {
    #[error("completion was empty")]
    Empty,
    #[error("completion is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("completion does not match the expected schema: {0}")]
    Schema(String),
    #[error("completion contains an invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
}

#[derive(Debug, Error)]
pub enum LookupUnavailableError {
    #[error("price lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("price lookup failed: {0}")]
    Service(String),
}

/// Unrecoverable failure of a workflow run. Carried in the run outcome
/// rather than returned, so partial artifacts survive.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    LookupUnavailable(#[from] LookupUnavailableError),
    #[error("text completion failed: {0}")]
    Completion(#[from] ApiConnectionError),
    #[error(transparent)]
    InvalidRecord(#[from] RecordError),
}
