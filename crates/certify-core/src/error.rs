//! Error types for `certify-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A question definition is malformed: bad number, empty required field,
  /// inconsistent sub-question wiring.
  #[error("invalid question format: {0}")]
  QuestionFormat(String),

  #[error("invalid evidence pattern {pattern:?}: {source}")]
  InvalidEvidencePattern {
    pattern: String,
    #[source]
    source:  regex::Error,
  },

  #[error("duplicate question number: {0}")]
  DuplicateQuestion(String),

  /// An unrecognised question or answer type tag.
  #[error("unknown question type: {0:?}")]
  QuestionType(String),

  /// A responder value that is not a recognised choice, or an answer whose
  /// shape does not fit its question.
  #[error("invalid answer: {0}")]
  InvalidAnswer(String),

  /// An answer references a question number absent from the target survey.
  #[error("question {0} does not exist in this survey")]
  UnknownQuestion(String),

  #[error("section {0:?} does not exist in this survey")]
  UnknownSection(String),

  #[error("questions may not be removed from a survey: {}", .0.join(", "))]
  QuestionsRemoved(Vec<String>),

  #[error("survey has no top-level questions")]
  EmptySurvey,

  #[error("submission is incomplete; invalid or missing answers for: {}", .0.join(", "))]
  IncompleteSubmission(Vec<String>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
