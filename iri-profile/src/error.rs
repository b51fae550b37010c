//! Error types for iri-profile
//!
//! Errors are split by pipeline stage. Transient remote problems surface as
//! [`ClientError`] and are retried; parse problems as [`ParseError`]; batch
//! contract violations as [`AggregateError`].

use std::path::PathBuf;
use thiserror::Error;

/// Interactive automation session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// HTTP failure talking to the automation endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Automation endpoint answered with something unexpected
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No element matched the locator
    #[error("No such element: {0}")]
    NoSuchElement(String),

    /// Script evaluation inside the page failed
    #[error("Script error: {0}")]
    Script(String),

    /// A bounded wait inside the session expired
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Plain network fetch of an artifact failed
    #[error("Fetch failed: {0}")]
    Fetch(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SessionError::Timeout(err.to_string())
        } else {
            SessionError::Transport(err.to_string())
        }
    }
}

/// Best-effort form step failure
///
/// Recorded in the form report; never aborts an attempt.
#[derive(Debug, Error)]
#[error("{step}: {source}")]
pub struct FieldError {
    /// Step name (form field name or selector step)
    pub step: String,
    /// Underlying session failure
    #[source]
    pub source: SessionError,
}

/// Remote model client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Query parameters are unusable (non-finite numbers)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Unrecoverable session fault
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Form page did not become ready within the per-attempt timeout
    #[error("Page not ready within {0:?}")]
    NavigationTimeout(std::time::Duration),

    /// Result indicator never appeared after submission
    #[error("No result indicator within {0:?}")]
    ResultTimeout(std::time::Duration),

    /// Neither a download link nor usable inline text was found
    #[error("Result content not found")]
    NoContent,

    /// Writing the destination file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The automation session panicked mid-attempt
    #[error("Session panicked: {0}")]
    Panicked(String),

    /// Every attempt failed
    #[error("Failed to retrieve profile after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl ClientError {
    /// Whether a fresh attempt may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ClientError::InvalidQuery(_) | ClientError::RetriesExhausted { .. }
        )
    }
}

/// Profile text parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// Input is not addressed to a text artifact
    #[error("Input file must be txt: {0}")]
    NotText(PathBuf),

    /// Fewer lines than the fixed header position requires
    #[error("Only {0} lines present")]
    TooShort(usize),

    /// Time header line absent
    #[error("Time header not found on line {0}")]
    MissingHeader(usize),

    /// Time header present but not resolvable to a timestamp
    #[error("Bad time header: {0}")]
    BadHeader(String),

    /// No data rows recovered
    #[error("No data rows found")]
    NoRows,

    /// Altitudes are duplicated or out of order
    #[error("Altitude not increasing at row {index}: {previous} -> {current}")]
    NonMonotonicAltitude {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Series aggregation errors
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Time and coordinate arrays differ in length
    #[error("The lengths of times ({times}) and coordinates ({coordinates}) must be same")]
    LengthMismatch { times: usize, coordinates: usize },

    /// Coordinate array is not N x 3
    #[error("Coordinate shape error: expected (N, 3), got {0:?}")]
    BadShape(Vec<usize>),

    /// Coordinate transform collaborator failed
    #[error("Coordinate transform failed: {0}")]
    Transform(String),

    /// Input time not representable as a calendar timestamp
    #[error("Bad input time: {0}")]
    Time(#[from] iri_common::Error),

    /// A timestep could not be retrieved
    #[error("Retrieval failed at index {index}: {source}")]
    Retrieval {
        index: usize,
        #[source]
        source: ClientError,
    },

    /// A retrieved profile could not be parsed
    #[error("Profile parse failed at index {index}")]
    Parse { index: usize },
}
