//! Questions: the closed set of question kinds and their validation rules.
//!
//! A [`Question`] carries its position (section, number, spec version) and a
//! [`QuestionKind`] payload. Validation dispatches on the answer's variant;
//! an answer of the wrong kind validates to `false`.

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  answer::{Answer, AnswerMap, YesNo},
  number::QuestionNumber,
  version::SpecVersion,
};

/// Prompt shown next to the not-applicable choice when none is configured.
pub const DEFAULT_NOT_APPLICABLE_PROMPT: &str = "Not required by IL";

// ─── Question type tags ──────────────────────────────────────────────────────

/// Stable type tag used in import rows and persisted question rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
  #[serde(rename = "YES_NO")]
  YesNo,
  #[serde(rename = "YES_NO_EVIDENCE")]
  YesNoEvidence,
  #[serde(rename = "YES_NO_NA")]
  YesNoNotApplicable,
  #[serde(rename = "SUBQUESTIONS")]
  SubQuestions,
}

impl QuestionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::YesNo => "YES_NO",
      Self::YesNoEvidence => "YES_NO_EVIDENCE",
      Self::YesNoNotApplicable => "YES_NO_NA",
      Self::SubQuestions => "SUBQUESTIONS",
    }
  }
}

impl FromStr for QuestionType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim() {
      "YES_NO" => Ok(Self::YesNo),
      "YES_NO_EVIDENCE" => Ok(Self::YesNoEvidence),
      "YES_NO_NA" => Ok(Self::YesNoNotApplicable),
      "SUBQUESTIONS" => Ok(Self::SubQuestions),
      other => Err(Error::QuestionType(other.to_owned())),
    }
  }
}

impl fmt::Display for QuestionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Correct answers ─────────────────────────────────────────────────────────

/// The expectation a yes/no style question holds its answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrectAnswer {
  Yes,
  No,
  NotApplicable,
  /// Every answer value is acceptable.
  Any,
  YesNotApplicable,
  NoNotApplicable,
}

impl CorrectAnswer {
  pub fn accepts(&self, value: YesNo) -> bool {
    match self {
      Self::Any => true,
      Self::Yes => value == YesNo::Yes,
      Self::No => value == YesNo::No,
      Self::NotApplicable => value == YesNo::NotApplicable,
      Self::YesNotApplicable => {
        matches!(value, YesNo::Yes | YesNo::NotApplicable)
      }
      Self::NoNotApplicable => matches!(value, YesNo::No | YesNo::NotApplicable),
    }
  }

  /// Whether a not-applicable answer can ever satisfy this expectation.
  fn mentions_not_applicable(&self) -> bool {
    matches!(
      self,
      Self::NotApplicable | Self::YesNotApplicable | Self::NoNotApplicable
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Yes => "Yes",
      Self::No => "No",
      Self::NotApplicable => "NotApplicable",
      Self::Any => "Any",
      Self::YesNotApplicable => "YesNotApplicable",
      Self::NoNotApplicable => "NoNotApplicable",
    }
  }
}

impl FromStr for CorrectAnswer {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "yes" => Ok(Self::Yes),
      "no" => Ok(Self::No),
      "na" | "notapplicable" => Ok(Self::NotApplicable),
      "any" => Ok(Self::Any),
      "yesnotapplicable" => Ok(Self::YesNotApplicable),
      "nonotapplicable" => Ok(Self::NoNotApplicable),
      _ => Err(Error::QuestionFormat(format!("invalid correct answer {s:?}"))),
    }
  }
}

impl fmt::Display for CorrectAnswer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Evidence pattern ────────────────────────────────────────────────────────

/// A validation pattern for free-text evidence with full-match semantics.
#[derive(Debug, Clone)]
pub struct EvidencePattern {
  source: String,
  regex:  Regex,
}

impl EvidencePattern {
  pub fn new(source: impl Into<String>) -> Result<Self> {
    let source = source.into();
    let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
      Error::InvalidEvidencePattern {
        pattern: source.clone(),
        source:  e,
      }
    })?;
    Ok(Self { source, regex })
  }

  pub fn as_str(&self) -> &str { &self.source }

  /// `true` when the whole of `text` matches the pattern.
  pub fn is_match(&self, text: &str) -> bool { self.regex.is_match(text) }
}

impl PartialEq for EvidencePattern {
  fn eq(&self, other: &Self) -> bool { self.source == other.source }
}

impl Eq for EvidencePattern {}

// ─── Question kinds ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
  YesNo {
    correct_answer: CorrectAnswer,
  },
  YesNoEvidence {
    correct_answer:      CorrectAnswer,
    evidence_prompt:     String,
    evidence_validation: Option<EvidencePattern>,
  },
  YesNoNotApplicable {
    correct_answer:        CorrectAnswer,
    not_applicable_prompt: String,
  },
  /// Satisfied when at least `min_valid_answers` children validate.
  SubQuestions {
    min_valid_answers: u32,
    children:          BTreeMap<String, Question>,
  },
}

impl QuestionKind {
  pub fn question_type(&self) -> QuestionType {
    match self {
      Self::YesNo { .. } => QuestionType::YesNo,
      Self::YesNoEvidence { .. } => QuestionType::YesNoEvidence,
      Self::YesNoNotApplicable { .. } => QuestionType::YesNoNotApplicable,
      Self::SubQuestions { .. } => QuestionType::SubQuestions,
    }
  }

  /// Compare definitions, looking only at which child numbers a group has.
  fn equivalent(&self, other: &Self) -> bool {
    match (self, other) {
      (
        Self::SubQuestions {
          min_valid_answers: a_min,
          children:          a_children,
        },
        Self::SubQuestions {
          min_valid_answers: b_min,
          children:          b_children,
        },
      ) => a_min == b_min && a_children.keys().eq(b_children.keys()),
      (a, b) => a == b,
    }
  }
}

// ─── Question ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
  pub text:            String,
  pub section_name:    String,
  pub number:          QuestionNumber,
  pub spec_version:    SpecVersion,
  /// Free-text reference into the specification document.
  pub spec_reference:  Option<String>,
  /// Number of the sub-question group this question belongs to.
  pub sub_question_of: Option<String>,
  pub kind:            QuestionKind,
}

impl Question {
  /// Build a question, parsing `number` under the scheme of `spec_version`.
  ///
  /// Fails with [`Error::QuestionFormat`] when the section name is empty, the
  /// number does not parse, a plain yes/no question expects a not-applicable
  /// answer, or a sub-question group holds children that do not point back at
  /// it.
  pub fn new(
    text: impl Into<String>,
    section_name: impl Into<String>,
    number: &str,
    spec_version: &SpecVersion,
    kind: QuestionKind,
  ) -> Result<Self> {
    let section_name = section_name.into();
    if section_name.trim().is_empty() {
      return Err(Error::QuestionFormat(format!(
        "question {number:?} has no section name"
      )));
    }
    let number = QuestionNumber::parse(number, spec_version)?;

    match &kind {
      QuestionKind::YesNo { correct_answer }
      | QuestionKind::YesNoEvidence { correct_answer, .. }
        if correct_answer.mentions_not_applicable() =>
      {
        return Err(Error::QuestionFormat(format!(
          "question {number} cannot expect {correct_answer} without a \
           not-applicable choice"
        )));
      }
      QuestionKind::SubQuestions { children, .. } => {
        for (key, child) in children {
          let points_back =
            child.sub_question_of.as_deref() == Some(number.as_str());
          if key != child.number.as_str()
            || !points_back
            || child.section_name != section_name
            || child.spec_version != *spec_version
          {
            return Err(Error::QuestionFormat(format!(
              "question {key} is not a valid child of {number}"
            )));
          }
        }
      }
      _ => {}
    }

    Ok(Self {
      text: text.into(),
      section_name,
      number,
      spec_version: spec_version.clone(),
      spec_reference: None,
      sub_question_of: None,
      kind,
    })
  }

  pub fn with_spec_reference(mut self, reference: impl Into<String>) -> Self {
    self.spec_reference = Some(reference.into());
    self
  }

  /// Mark this question as a child of the sub-question group `parent`.
  pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
    self.sub_question_of = Some(parent.into());
    self
  }

  pub fn question_type(&self) -> QuestionType { self.kind.question_type() }

  pub fn is_top_level(&self) -> bool { self.sub_question_of.is_none() }

  pub fn correct_answer(&self) -> Option<CorrectAnswer> {
    match &self.kind {
      QuestionKind::YesNo { correct_answer }
      | QuestionKind::YesNoEvidence { correct_answer, .. }
      | QuestionKind::YesNoNotApplicable { correct_answer, .. } => {
        Some(*correct_answer)
      }
      QuestionKind::SubQuestions { .. } => None,
    }
  }

  pub fn children(&self) -> Option<&BTreeMap<String, Question>> {
    match &self.kind {
      QuestionKind::SubQuestions { children, .. } => Some(children),
      _ => None,
    }
  }

  /// Whether `answer` is a correct answer to this question.
  pub fn validate(&self, answer: &Answer) -> bool {
    match &self.kind {
      QuestionKind::YesNo { correct_answer }
      | QuestionKind::YesNoEvidence { correct_answer, .. }
      | QuestionKind::YesNoNotApplicable { correct_answer, .. } => {
        answer.value().is_some_and(|v| correct_answer.accepts(v))
      }
      QuestionKind::SubQuestions {
        min_valid_answers,
        children,
      } => {
        let Answer::SubQuestions { children: answers } = answer else {
          return false;
        };
        let valid = answers
          .iter()
          .filter(|(number, child_answer)| {
            children
              .get(*number)
              .is_some_and(|child| child.validate(child_answer))
          })
          .count();
        valid >= *min_valid_answers as usize
      }
    }
  }

  /// Whether `answer` has the variant this question's answers are stored as.
  pub fn answer_kind_matches(&self, answer: &Answer) -> bool {
    matches!(
      (&self.kind, answer),
      (
        QuestionKind::YesNo { .. } | QuestionKind::YesNoNotApplicable { .. },
        Answer::YesNo { .. }
      ) | (QuestionKind::YesNoEvidence { .. }, Answer::YesNoEvidence { .. })
        | (QuestionKind::SubQuestions { .. }, Answer::SubQuestions { .. })
    )
  }

  /// Check evidence text against the configured pattern. Questions without a
  /// pattern accept anything.
  pub fn validate_evidence(&self, text: &str) -> bool {
    match &self.kind {
      QuestionKind::YesNoEvidence {
        evidence_validation: Some(pattern),
        ..
      } => pattern.is_match(text),
      _ => true,
    }
  }

  /// Compare definitions for the survey update path. Child questions are
  /// compared by number only; their own changes are reported separately.
  pub fn equivalent(&self, other: &Self) -> bool {
    self.text == other.text
      && self.section_name == other.section_name
      && self.number == other.number
      && self.spec_version == other.spec_version
      && self.spec_reference == other.spec_reference
      && self.sub_question_of == other.sub_question_of
      && self.kind.equivalent(&other.kind)
  }

  /// Position order: spec version first, then question number.
  pub fn cmp_position(&self, other: &Self) -> Ordering {
    self
      .spec_version
      .cmp_ordinal(&other.spec_version)
      .then_with(|| self.number.cmp(&other.number))
  }

  /// Build the answer a responder's raw input stands for.
  pub fn answer_from_input(
    &self,
    value: &str,
    evidence: Option<String>,
  ) -> Result<Answer> {
    match &self.kind {
      QuestionKind::YesNo { .. } | QuestionKind::YesNoNotApplicable { .. } => {
        Ok(Answer::yes_no(YesNo::from_input(value)?))
      }
      QuestionKind::YesNoEvidence { .. } => {
        Ok(Answer::with_evidence(YesNo::from_input(value)?, evidence))
      }
      QuestionKind::SubQuestions { .. } => {
        Ok(Answer::sub_questions(AnswerMap::new()))
      }
    }
  }

  /// This question followed by all of its descendants, depth first.
  pub fn flatten(&self) -> Vec<&Question> {
    let mut out = vec![self];
    if let Some(children) = self.children() {
      for child in children.values() {
        out.extend(child.flatten());
      }
    }
    out
  }
}
