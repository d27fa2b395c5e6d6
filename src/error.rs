// src/error.rs
use thiserror::Error;

/// Hard failures of an aggregation call. Per-source errors are not here:
/// they are recovered and reported as [`crate::aggregate::SourceFailure`]s.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// The registry had no sources when the call started.
    #[error("no sources registered")]
    NoSources,
}

impl AggregateError {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AggregateError::NoSources => "no_sources",
        }
    }
}
