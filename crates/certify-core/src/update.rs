//! The audited survey update path.
//!
//! A published survey may have question wording, evidence rules and section
//! titles revised, and questions added, but no question may ever be removed:
//! stored responses refer to questions by number.

use std::{collections::BTreeMap, fmt};

use crate::{
  Error, Result,
  question::Question,
  survey::Survey,
};

/// The changes that bring an existing survey in line with a revised one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurveyUpdatePlan {
  /// Questions whose numbers are new to the survey.
  pub added:          Vec<Question>,
  /// Questions whose definition changed.
  pub updated:        Vec<Question>,
  /// New titles, keyed by section name.
  pub section_titles: BTreeMap<String, String>,
}

impl SurveyUpdatePlan {
  pub fn num_changes(&self) -> usize {
    self.added.len() + self.updated.len() + self.section_titles.len()
  }

  pub fn is_empty(&self) -> bool { self.num_changes() == 0 }
}

fn write_numbers(
  f: &mut fmt::Formatter<'_>,
  verb: &str,
  questions: &[Question],
) -> fmt::Result {
  let numbers: Vec<String> = questions.iter().map(|q| q.number.to_string()).collect();
  let noun = if questions.len() == 1 { "question" } else { "questions" };
  write!(f, "{verb} {} {noun}: {}.", questions.len(), numbers.join(", "))
}

impl fmt::Display for SurveyUpdatePlan {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return f.write_str("No changes");
    }
    let mut parts = 0;
    if !self.added.is_empty() {
      write_numbers(f, "Added", &self.added)?;
      parts += 1;
    }
    if !self.updated.is_empty() {
      if parts > 0 {
        f.write_str(" ")?;
      }
      write_numbers(f, "Updated", &self.updated)?;
      parts += 1;
    }
    if !self.section_titles.is_empty() {
      if parts > 0 {
        f.write_str(" ")?;
      }
      let names: Vec<&str> = self.section_titles.keys().map(String::as_str).collect();
      write!(f, "Retitled sections: {}.", names.join(", "))?;
    }
    Ok(())
  }
}

/// Compare `incoming` against `existing` and plan the update.
///
/// Fails when the spec versions differ, when `incoming` introduces a section
/// the survey does not have, or when it drops any existing question. An
/// existing question keeps its type and parent: stored answers are shaped by
/// both.
pub fn plan_survey_update(
  existing: &Survey,
  incoming: &Survey,
) -> Result<SurveyUpdatePlan> {
  if existing.spec_version != incoming.spec_version {
    return Err(Error::QuestionFormat(format!(
      "cannot update spec version {} from a survey for {}",
      existing.spec_version, incoming.spec_version
    )));
  }

  let mut plan = SurveyUpdatePlan::default();
  for section in &incoming.sections {
    let name = section.name.as_deref().unwrap_or_default();
    let current = existing
      .section(name)
      .ok_or_else(|| Error::UnknownSection(name.to_owned()))?;
    if current.title != section.title {
      plan.section_titles.insert(name.to_owned(), section.title.clone());
    }
  }

  let incoming_numbers = incoming.question_numbers();
  let mut removed: Vec<&Question> = existing
    .questions()
    .filter(|q| !incoming_numbers.contains(q.number.as_str()))
    .collect();
  if !removed.is_empty() {
    removed.sort_by(|a, b| a.cmp_position(b));
    return Err(Error::QuestionsRemoved(
      removed.iter().map(|q| q.number.to_string()).collect(),
    ));
  }

  for question in incoming.questions() {
    match existing.question(question.number.as_str()) {
      Some(current) if current.equivalent(question) => {}
      Some(current) => {
        check_shape_kept(current, question)?;
        plan.updated.push(question.clone());
      }
      None => plan.added.push(question.clone()),
    }
  }
  plan.added.sort_by(Question::cmp_position);
  plan.updated.sort_by(Question::cmp_position);

  Ok(plan)
}

fn check_shape_kept(current: &Question, revised: &Question) -> Result<()> {
  if current.question_type() != revised.question_type() {
    return Err(Error::QuestionFormat(format!(
      "question {} cannot change type from {} to {}",
      current.number,
      current.question_type(),
      revised.question_type()
    )));
  }
  if current.sub_question_of != revised.sub_question_of {
    return Err(Error::QuestionFormat(format!(
      "question {} cannot move from parent {:?} to {:?}",
      current.number, current.sub_question_of, revised.sub_question_of
    )));
  }
  Ok(())
}
