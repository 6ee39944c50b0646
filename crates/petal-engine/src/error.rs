//! Error type for `petal-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Rejected before any side effect.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("payload of {size} bytes exceeds the {max} byte limit")]
  PayloadTooLarge { size: usize, max: usize },

  #[error("unsupported media type: {0}")]
  UnsupportedMedia(String),

  /// The encoder or vector index could not serve the request.
  #[error("dependency unavailable: {0}")]
  Unavailable(String),

  /// Every visual-search slot stayed taken for the whole queue timeout.
  #[error("visual search is saturated, retry later")]
  Busy,

  #[error("timed out: {0}")]
  Timeout(String),

  #[error("a graph build is already running")]
  BuildInProgress,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl Error {
  pub(crate) fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<petal_core::Error> for Error {
  fn from(e: petal_core::Error) -> Self {
    use petal_core::Error as Core;
    if e.is_validation() {
      return Self::Validation(e.to_string());
    }
    match e {
      Core::DependencyUnavailable(m) => Self::Unavailable(m),
      // A vector of the wrong shape can only come from the encoder.
      Core::DimensionMismatch { .. } | Core::KindMismatch { .. } => Self::Unavailable(e.to_string()),
      other => Self::store(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
