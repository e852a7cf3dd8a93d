//! Error types.

use thiserror::Error;

/// Boxed error carried out of a failing page task.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid construction parameters.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bucket count must be greater than zero")]
    ZeroBuckets,

    #[error("page size must be greater than zero")]
    ZeroPageSize,

    #[error("pages in flight must be greater than zero")]
    ZeroMaxInFlight,
}

/// Failure of a parallel aggregation run.
///
/// Every dispatched page is joined before one of these is returned; when
/// several pages fail, the one dispatched first wins.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {index} failed: {source}")]
    Page {
        index: usize,
        #[source]
        source: BoxError,
    },

    #[error("page {index} panicked: {message}")]
    PagePanicked { index: usize, message: String },
}

impl AggregateError {
    /// Dispatch index of the failing page, if the failure came from a page task.
    pub fn page_index(&self) -> Option<usize> {
        match self {
            AggregateError::Page { index, .. } | AggregateError::PagePanicked { index, .. } => {
                Some(*index)
            }
            AggregateError::Config(_) | AggregateError::Io(_) => None,
        }
    }
}
