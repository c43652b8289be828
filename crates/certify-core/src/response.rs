//! Survey responses, their status lifecycle, and the scoring read-model.
//!
//! A [`SurveyResponse`] is one user's answers to one spec version. A
//! [`Submission`] is the reporting projection of a response; it is derived on
//! demand and never stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  answer::AnswerMap,
  question::Question,
  survey::Survey,
  version::SpecVersion,
};

// ─── Scoring ─────────────────────────────────────────────────────────────────

fn top_level_count(survey: &Survey) -> Result<usize> {
  match survey.top_level_questions().count() {
    0 => Err(Error::EmptySurvey),
    n => Ok(n),
  }
}

/// Percentage of top-level questions that have any answer at all.
pub fn percent_complete(survey: &Survey, answers: &AnswerMap) -> Result<u8> {
  let total = top_level_count(survey)?;
  let answered = survey
    .top_level_questions()
    .filter(|q| answers.contains_key(q.number.as_str()))
    .count();
  Ok((answered * 100 / total) as u8)
}

/// Percentage of top-level questions answered correctly. Unanswered
/// questions count as incorrect.
pub fn score(survey: &Survey, answers: &AnswerMap) -> Result<u8> {
  let total = top_level_count(survey)?;
  let correct = survey
    .top_level_questions()
    .filter(|q| {
      answers
        .get(q.number.as_str())
        .is_some_and(|answer| q.validate(answer))
    })
    .count();
  Ok((correct * 100 / total) as u8)
}

// ─── Responder input ─────────────────────────────────────────────────────────

/// One answer as typed by a responder: `YES`, `NO` or `NA` plus optional
/// evidence text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAnswer {
  pub number:   String,
  #[serde(default)]
  pub value:    String,
  #[serde(default)]
  pub evidence: Option<String>,
}

/// Overlay responder input on `base` and regroup sub-question answers.
///
/// Blank values are skipped, except for sub-question groups which take no
/// value of their own. Evidence that misses its pattern is kept and logged.
/// A number that is not in the survey fails the whole call.
pub fn desired_answers(
  survey: &Survey,
  base: &AnswerMap,
  inputs: &[ResponseAnswer],
) -> Result<AnswerMap> {
  let mut flat = base.clone();
  for input in inputs {
    let question = survey
      .question(&input.number)
      .ok_or_else(|| Error::UnknownQuestion(input.number.clone()))?;
    if input.value.trim().is_empty() && question.children().is_none() {
      tracing::warn!(number = %input.number, "skipping blank answer");
      continue;
    }
    if let Some(evidence) = &input.evidence
      && !question.validate_evidence(evidence)
    {
      tracing::warn!(number = %input.number, "evidence does not match the expected pattern");
    }
    let answer = question.answer_from_input(&input.value, input.evidence.clone())?;
    flat.insert(input.number.clone(), answer);
  }
  Ok(survey.assemble_answers(flat))
}

// ─── SurveyResponse ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyResponse {
  pub id:         Uuid,
  pub username:   String,
  pub survey:     Arc<Survey>,
  pub answers:    AnswerMap,
  pub submitted:  bool,
  pub approved:   bool,
  pub rejected:   bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl SurveyResponse {
  /// A fresh, empty response.
  pub fn new(username: impl Into<String>, survey: Arc<Survey>) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      username: username.into(),
      survey,
      answers: AnswerMap::new(),
      submitted: false,
      approved: false,
      rejected: false,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn spec_version(&self) -> &SpecVersion { &self.survey.spec_version }

  /// Top-level questions that are unanswered or answered incorrectly.
  pub fn invalid_answers(&self) -> Vec<&Question> {
    self
      .survey
      .top_level_questions()
      .filter(|q| {
        !self
          .answers
          .get(q.number.as_str())
          .is_some_and(|answer| q.validate(answer))
      })
      .collect()
  }

  pub fn percent_complete(&self) -> Result<u8> {
    percent_complete(&self.survey, &self.answers)
  }

  pub fn score(&self) -> Result<u8> { score(&self.survey, &self.answers) }

  /// Final submission. Submitted responses are approved automatically.
  pub fn submit(&mut self) -> Result<()> {
    let invalid = self.invalid_answers();
    if !invalid.is_empty() {
      return Err(Error::IncompleteSubmission(
        invalid.iter().map(|q| q.number.to_string()).collect(),
      ));
    }
    self.submitted = true;
    self.approved = true;
    self.rejected = false;
    Ok(())
  }

  pub fn unsubmit(&mut self) {
    self.submitted = false;
    self.approved = false;
    self.rejected = false;
  }

  pub fn approve(&mut self) {
    self.approved = true;
    self.rejected = false;
  }

  pub fn reject(&mut self) {
    self.rejected = true;
    self.approved = false;
  }
}

// ─── Submission ──────────────────────────────────────────────────────────────

/// Reporting projection of a [`SurveyResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
  pub username:         String,
  pub spec_version:     SpecVersion,
  pub submitted:        bool,
  pub approved:         bool,
  pub rejected:         bool,
  pub percent_complete: u8,
  pub score:            u8,
}

impl Submission {
  pub fn from_response(response: &SurveyResponse) -> Result<Self> {
    Ok(Self {
      username:         response.username.clone(),
      spec_version:     response.spec_version().clone(),
      submitted:        response.submitted,
      approved:         response.approved,
      rejected:         response.rejected,
      percent_complete: response.percent_complete()?,
      score:            response.score()?,
    })
  }
}
