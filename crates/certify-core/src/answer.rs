//! Answers: the values a responder gives to questions.
//!
//! Answer variants mirror question kinds. Equality is structural: two
//! answers are equal when they carry the same value, the same evidence text,
//! and (for sub-question groups) equal child maps regardless of insertion
//! order. The reconciliation engine relies on this to detect no-op updates.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Answers keyed by question-number label.
pub type AnswerMap = BTreeMap<String, Answer>;

// ─── YesNo ───────────────────────────────────────────────────────────────────

/// The value a responder selects for a yes/no style question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YesNo {
  Yes,
  No,
  NotApplicable,
  NotAnswered,
}

impl YesNo {
  /// Stable storage spelling.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Yes => "Yes",
      Self::No => "No",
      Self::NotApplicable => "NotApplicable",
      Self::NotAnswered => "NotAnswered",
    }
  }

  /// Parse a responder's raw input: `YES`, `NO` or `NA`, trimmed and
  /// case-insensitive.
  pub fn from_input(raw: &str) -> Result<Self> {
    match raw.trim().to_ascii_uppercase().as_str() {
      "YES" => Ok(Self::Yes),
      "NO" => Ok(Self::No),
      "NA" => Ok(Self::NotApplicable),
      _ => Err(Error::InvalidAnswer(format!("invalid yes/no value {raw:?}"))),
    }
  }
}

impl FromStr for YesNo {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "Yes" => Ok(Self::Yes),
      "No" => Ok(Self::No),
      "NotApplicable" => Ok(Self::NotApplicable),
      "NotAnswered" => Ok(Self::NotAnswered),
      other => Err(Error::InvalidAnswer(format!("unknown yes/no value {other:?}"))),
    }
  }
}

impl fmt::Display for YesNo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Answer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
  YesNo {
    value: YesNo,
  },
  /// Evidence text is informational and never affects correctness.
  YesNoEvidence {
    value:    YesNo,
    evidence: Option<String>,
  },
  /// Child answers of a sub-question group, keyed by child number.
  SubQuestions {
    children: AnswerMap,
  },
}

impl Answer {
  pub fn yes_no(value: YesNo) -> Self { Self::YesNo { value } }

  pub fn with_evidence(value: YesNo, evidence: Option<String>) -> Self {
    Self::YesNoEvidence { value, evidence }
  }

  pub fn sub_questions(children: AnswerMap) -> Self {
    Self::SubQuestions { children }
  }

  /// The selected yes/no value, if this is a yes/no style answer.
  pub fn value(&self) -> Option<YesNo> {
    match self {
      Self::YesNo { value } | Self::YesNoEvidence { value, .. } => Some(*value),
      Self::SubQuestions { .. } => None,
    }
  }

  pub fn evidence(&self) -> Option<&str> {
    match self {
      Self::YesNoEvidence { evidence, .. } => evidence.as_deref(),
      _ => None,
    }
  }

  pub fn children(&self) -> Option<&AnswerMap> {
    match self {
      Self::SubQuestions { children } => Some(children),
      _ => None,
    }
  }
}
