//! Error types shared across the aggregation pipeline.
//!
//! Source-level errors are always recoverable: they are logged and the
//! affected source contributes nothing to the merged document. Only
//! configuration errors abort startup.

use std::time::Duration;

/// Failure to parse a text exposition document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// 1-based line number in the source text.
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("invalid metric name {0:?}")]
    InvalidMetricName(String),

    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),

    #[error("malformed label set: {0}")]
    MalformedLabels(&'static str),

    #[error("invalid sample value {0:?}")]
    InvalidValue(String),

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("unexpected trailing text {0:?}")]
    TrailingText(String),

    #[error("unknown metric type {0:?}")]
    UnknownType(String),

    #[error("incomplete {0} line")]
    IncompleteComment(&'static str),

    #[error("second HELP line for metric name {0:?}")]
    DuplicateHelp(String),

    #[error("second TYPE line for metric name {0:?}, or TYPE reported after samples")]
    DuplicateType(String),

    #[error("sample {sample:?} is missing the {label:?} label required by its family type")]
    MissingLabel { sample: String, label: &'static str },

    #[error("invalid UTF-8 in exposition body")]
    InvalidUtf8,
}

impl ParseError {
    pub fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

/// Per-source failure. Never propagated beyond the aggregator.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed exposition text: {0}")]
    Malformed(#[from] ParseError),

    #[error("local read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("collector task aborted: {0}")]
    TaskFailed(String),
}

impl SourceError {
    /// Whether the failure means the upstream could not be reached at all,
    /// as opposed to answering with something unusable.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, SourceError::Malformed(_))
    }
}

/// Invalid configuration detected at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid duration {value:?} for {field}: {reason}")]
    InvalidDuration {
        field: String,
        value: String,
        reason: String,
    },

    #[error("duration for {0} must be greater than zero")]
    ZeroDuration(String),

    #[error("invalid bind address {bind:?}: {reason}")]
    InvalidBind { bind: String, reason: String },

    #[error("upstream source {index} has an empty url")]
    EmptyUrl { index: usize },

    #[error("upstream source {source_name:?}: invalid label name {label:?}")]
    InvalidLabelName { source_name: String, label: String },

    #[error("unknown metric collector {0:?}, expected one of: meminfo, gotrue, postgrest")]
    UnknownCollector(String),

    #[error("{0}")]
    Tls(String),

    #[error("failed to build HTTP client for {name:?}: {source}")]
    HttpClient {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure of a whole refresh round. The aggregator isolates every source,
/// so this only surfaces when the refresh machinery itself breaks.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh task failed: {0}")]
    Failed(String),
}
