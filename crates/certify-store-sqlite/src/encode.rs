//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings and UUIDs as hyphenated
//! lowercase strings. Yes/no values use the spelling of
//! [`YesNo::as_str`]. An answer row carries no kind of its own; it is decoded
//! against the question it answers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use certify_core::{
  answer::{Answer, AnswerMap, YesNo},
  question::{Question, QuestionKind},
  response::SurveyResponse,
  survey::Survey,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Answer ──────────────────────────────────────────────────────────────────

/// Split an answer into its `(answer, evidence)` columns.
pub fn encode_answer(answer: &Answer) -> (Option<&'static str>, Option<String>) {
  match answer {
    Answer::YesNo { value } => (Some(value.as_str()), None),
    Answer::YesNoEvidence { value, evidence } => (Some(value.as_str()), evidence.clone()),
    Answer::SubQuestions { .. } => (None, None),
  }
}

/// Whether a stored row has the shape `question` answers take: a value for
/// yes/no style questions, none for groups.
pub fn answer_shape_fits(question: &Question, answer: Option<&str>) -> bool {
  let is_group = matches!(question.kind, QuestionKind::SubQuestions { .. });
  answer.is_some() != is_group
}

/// Rebuild an answer row as the variant `question` takes. Group answers come
/// back empty; [`Survey::assemble_answers`] fills in their children.
pub fn decode_answer(
  question: &Question,
  answer: Option<&str>,
  evidence: Option<String>,
) -> Result<Answer> {
  let value = || -> Result<YesNo> {
    let raw = answer.ok_or_else(|| {
      Error::Corrupt(format!("answer to {} has no value", question.number))
    })?;
    Ok(raw.parse()?)
  };
  Ok(match question.kind {
    QuestionKind::YesNo { .. } | QuestionKind::YesNoNotApplicable { .. } => {
      Answer::yes_no(value()?)
    }
    QuestionKind::YesNoEvidence { .. } => Answer::with_evidence(value()?, evidence),
    QuestionKind::SubQuestions { .. } => Answer::sub_questions(AnswerMap::new()),
  })
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// A `survey_responses` row as read from SQLite.
pub struct RawResponse {
  pub response_id:  String,
  pub username:     String,
  pub spec_version: String,
  pub submitted:    bool,
  pub approved:     bool,
  pub rejected:     bool,
  pub created_at:   String,
  pub updated_at:   String,
}

pub const RESPONSE_COLUMNS: &str = "response_id, username, spec_version, submitted, \
                                    approved, rejected, created_at, updated_at";

impl RawResponse {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      response_id:  row.get(0)?,
      username:     row.get(1)?,
      spec_version: row.get(2)?,
      submitted:    row.get(3)?,
      approved:     row.get(4)?,
      rejected:     row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn into_response(self, survey: Arc<Survey>, answers: AnswerMap) -> Result<SurveyResponse> {
    Ok(SurveyResponse {
      id: decode_uuid(&self.response_id)?,
      username: self.username,
      survey,
      answers,
      submitted: self.submitted,
      approved: self.approved,
      rejected: self.rejected,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// An `answers` row as read from SQLite.
pub struct RawAnswer {
  pub number:   String,
  pub answer:   Option<String>,
  pub evidence: Option<String>,
}

impl RawAnswer {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      number:   row.get(0)?,
      answer:   row.get(1)?,
      evidence: row.get(2)?,
    })
  }
}
