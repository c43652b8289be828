//! Flat question rows and the two-pass survey builder.
//!
//! Bulk imports and persisted surveys both arrive as flat rows in which a
//! sub-question names its parent by number. [`build_survey`] turns such rows
//! into a [`Survey`] tree:
//!
//! 1. every row is parsed into a childless [`Question`] and children are
//!    grouped under their parent number;
//! 2. each sub-question group is constructed once, fully populated, from its
//!    collected children.
//!
//! A single bad row fails the whole build.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  question::{
    DEFAULT_NOT_APPLICABLE_PROMPT, EvidencePattern, Question, QuestionKind,
    QuestionType,
  },
  survey::{Section, Survey},
  version::SpecVersion,
};

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One question as it appears in a bulk import or a storage row.
///
/// For `SUBQUESTIONS` rows `correct_answer` holds the minimum number of
/// children that must validate. For `YES_NO_NA` rows `evidence_prompt` holds
/// the not-applicable prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRow {
  pub section_name:        String,
  pub number:              String,
  #[serde(default)]
  pub spec_reference:      Option<String>,
  pub question_text:       String,
  #[serde(rename = "type")]
  pub question_type:       String,
  pub correct_answer:      String,
  #[serde(default)]
  pub evidence_prompt:     Option<String>,
  #[serde(default)]
  pub evidence_validation: Option<String>,
  #[serde(default, rename = "subQuestionNumber", alias = "subQuestionOf")]
  pub sub_question_of:     Option<String>,
}

/// Section header: the title shown for a section name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRow {
  pub name:  String,
  pub title: String,
}

/// A complete questionnaire definition for one spec version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyImport {
  pub spec_version: String,
  #[serde(default)]
  pub sections:     Vec<SectionRow>,
  pub questions:    Vec<QuestionRow>,
}

impl SurveyImport {
  pub fn build(&self) -> Result<Survey> {
    let version = SpecVersion::new(self.spec_version.as_str())?;
    build_survey(&version, &self.sections, &self.questions)
  }
}

fn non_empty(value: &Option<String>) -> Option<String> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}

impl QuestionRow {
  /// Parse this row into a question without children.
  pub fn to_question(&self, version: &SpecVersion) -> Result<Question> {
    let kind = match self.question_type.parse::<QuestionType>()? {
      QuestionType::YesNo => QuestionKind::YesNo {
        correct_answer: self.correct_answer.parse()?,
      },
      QuestionType::YesNoEvidence => QuestionKind::YesNoEvidence {
        correct_answer:      self.correct_answer.parse()?,
        evidence_prompt:     non_empty(&self.evidence_prompt).unwrap_or_default(),
        evidence_validation: non_empty(&self.evidence_validation)
          .map(EvidencePattern::new)
          .transpose()?,
      },
      QuestionType::YesNoNotApplicable => QuestionKind::YesNoNotApplicable {
        correct_answer:        self.correct_answer.parse()?,
        not_applicable_prompt: non_empty(&self.evidence_prompt)
          .unwrap_or_else(|| DEFAULT_NOT_APPLICABLE_PROMPT.to_owned()),
      },
      QuestionType::SubQuestions => QuestionKind::SubQuestions {
        min_valid_answers: self.correct_answer.trim().parse().map_err(|_| {
          Error::QuestionFormat(format!(
            "question {}: minimum valid answers must be a non-negative integer, \
             got {:?}",
            self.number, self.correct_answer
          ))
        })?,
        children:          BTreeMap::new(),
      },
    };

    let mut question = Question::new(
      self.question_text.as_str(),
      self.section_name.trim(),
      &self.number,
      version,
      kind,
    )?;
    question.spec_reference = non_empty(&self.spec_reference);
    question.sub_question_of = non_empty(&self.sub_question_of);
    Ok(question)
  }

  /// The row a question is stored as. Children are not included.
  pub fn from_question(question: &Question) -> Self {
    let (correct_answer, evidence_prompt, evidence_validation) =
      match &question.kind {
        QuestionKind::YesNo { correct_answer } => {
          (correct_answer.to_string(), None, None)
        }
        QuestionKind::YesNoEvidence {
          correct_answer,
          evidence_prompt,
          evidence_validation,
        } => (
          correct_answer.to_string(),
          Some(evidence_prompt.clone()),
          evidence_validation.as_ref().map(|p| p.as_str().to_owned()),
        ),
        QuestionKind::YesNoNotApplicable {
          correct_answer,
          not_applicable_prompt,
        } => (
          correct_answer.to_string(),
          Some(not_applicable_prompt.clone()),
          None,
        ),
        QuestionKind::SubQuestions {
          min_valid_answers, ..
        } => (min_valid_answers.to_string(), None, None),
      };

    Self {
      section_name: question.section_name.clone(),
      number: question.number.to_string(),
      spec_reference: question.spec_reference.clone(),
      question_text: question.text.clone(),
      question_type: question.question_type().as_str().to_owned(),
      correct_answer,
      evidence_prompt,
      evidence_validation,
      sub_question_of: question.sub_question_of.clone(),
    }
  }
}

// ─── Two-pass build ──────────────────────────────────────────────────────────

/// Build a survey from section headers and flat question rows.
///
/// Row order does not matter: a sub-question may appear before its parent.
/// Sections named by a row but missing from `sections` get an empty title.
pub fn build_survey(
  version: &SpecVersion,
  sections: &[SectionRow],
  rows: &[QuestionRow],
) -> Result<Survey> {
  // Pass 1: parse every row and group children by parent number.
  let mut seen = HashSet::new();
  let mut roots = Vec::new();
  let mut children_of: HashMap<String, Vec<Question>> = HashMap::new();
  for row in rows {
    let question = row.to_question(version)?;
    if !seen.insert(question.number.to_string()) {
      return Err(Error::DuplicateQuestion(question.number.to_string()));
    }
    match question.sub_question_of.clone() {
      Some(parent) => children_of.entry(parent).or_default().push(question),
      None => roots.push(question),
    }
  }

  // Pass 2: construct each group once from its collected children.
  let roots = roots
    .into_iter()
    .map(|q| attach_children(q, &mut children_of))
    .collect::<Result<Vec<_>>>()?;

  if let Some((parent, orphans)) = children_of.iter().next() {
    let numbers: Vec<String> = orphans.iter().map(|q| q.number.to_string()).collect();
    return Err(Error::QuestionFormat(format!(
      "sub-questions {} refer to parent {parent}, which is missing or not \
       reachable from a top-level question",
      numbers.join(", ")
    )));
  }

  let mut by_name: BTreeMap<String, Section> = sections
    .iter()
    .map(|s| (s.name.trim().to_owned(), Section::new(s.name.trim(), s.title.as_str())))
    .collect();
  for question in roots {
    by_name
      .entry(question.section_name.clone())
      .or_insert_with(|| Section::new(question.section_name.as_str(), ""))
      .questions
      .push(question);
  }

  Survey::new(version.clone(), by_name.into_values().collect())
}

fn attach_children(
  question: Question,
  children_of: &mut HashMap<String, Vec<Question>>,
) -> Result<Question> {
  let Some(children) = children_of.remove(question.number.as_str()) else {
    return Ok(question);
  };
  let QuestionKind::SubQuestions {
    min_valid_answers, ..
  } = question.kind
  else {
    return Err(Error::QuestionFormat(format!(
      "question {} has sub-questions but is of type {}",
      question.number,
      question.question_type()
    )));
  };

  let mut built = BTreeMap::new();
  for child in children {
    let child = attach_children(child, children_of)?;
    built.insert(child.number.to_string(), child);
  }

  let mut group = Question::new(
    question.text,
    question.section_name,
    question.number.as_str(),
    &question.spec_version,
    QuestionKind::SubQuestions {
      min_valid_answers,
      children: built,
    },
  )?;
  group.spec_reference = question.spec_reference;
  group.sub_question_of = question.sub_question_of;
  Ok(group)
}
