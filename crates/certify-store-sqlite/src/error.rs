//! Error type for `certify-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] certify_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("no survey for spec version {0}")]
  SurveyNotFound(String),

  #[error("a survey for spec version {0} already exists")]
  SurveyExists(String),

  #[error("{username} has no response for spec version {spec_version}")]
  ResponseNotFound {
    username:     String,
    spec_version: String,
  },

  /// A stored row could not be turned back into a domain value.
  #[error("corrupt row: {0}")]
  Corrupt(String),
}

impl Error {
  /// Whether the error was caused by the caller's input rather than by the
  /// store itself.
  pub fn is_invalid_request(&self) -> bool {
    matches!(
      self,
      Self::Core(_)
        | Self::SurveyNotFound(_)
        | Self::SurveyExists(_)
        | Self::ResponseNotFound { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
