//! The survey aggregate: one spec version, its sections and their questions.
//!
//! Sections hold top-level questions only. Sub-questions live inside their
//! parent's [`QuestionKind::SubQuestions`](crate::question::QuestionKind)
//! payload, so structural queries here walk the tree.

use std::{cmp::Ordering, collections::HashSet};

use crate::{
  Error, Result,
  answer::{Answer, AnswerMap},
  import::QuestionRow,
  question::Question,
  version::SpecVersion,
};

// ─── Section ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
  pub name:      Option<String>,
  pub title:     String,
  pub questions: Vec<Question>,
}

impl Section {
  pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
    Self {
      name:      Some(name.into()),
      title:     title.into(),
      questions: Vec::new(),
    }
  }

  /// Order by name, ignoring ASCII case. A section without a name sorts last.
  pub fn cmp_name(&self, other: &Self) -> Ordering {
    match (&self.name, &other.name) {
      (Some(a), Some(b)) => a
        .bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
      (Some(_), None) => Ordering::Less,
      (None, Some(_)) => Ordering::Greater,
      (None, None) => Ordering::Equal,
    }
  }

  pub fn sort_questions(&mut self) {
    self.questions.sort_by(Question::cmp_position);
  }
}

// ─── Survey ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Survey {
  pub spec_version: SpecVersion,
  pub sections:     Vec<Section>,
}

impl Survey {
  /// Assemble a survey, sorting sections by name and questions by number.
  ///
  /// Fails when a question number appears twice anywhere in the tree, when a
  /// question belongs to another spec version or section, or when a section
  /// lists a sub-question as a top-level entry.
  pub fn new(spec_version: SpecVersion, mut sections: Vec<Section>) -> Result<Self> {
    sections.sort_by(Section::cmp_name);
    for section in &mut sections {
      section.sort_questions();
    }
    let survey = Self {
      spec_version,
      sections,
    };
    survey.verify()?;
    Ok(survey)
  }

  fn verify(&self) -> Result<()> {
    let mut seen = HashSet::new();
    for section in &self.sections {
      let section_name = section.name.as_deref().unwrap_or_default();
      for top in &section.questions {
        if !top.is_top_level() {
          return Err(Error::QuestionFormat(format!(
            "sub-question {} is listed as a top-level question",
            top.number
          )));
        }
        for question in top.flatten() {
          if question.spec_version != self.spec_version {
            return Err(Error::QuestionFormat(format!(
              "question {} belongs to spec version {}, not {}",
              question.number, question.spec_version, self.spec_version
            )));
          }
          if question.section_name != section_name {
            return Err(Error::QuestionFormat(format!(
              "question {} is filed under section {:?} but names {:?}",
              question.number, section_name, question.section_name
            )));
          }
          if !seen.insert(question.number.as_str()) {
            return Err(Error::DuplicateQuestion(question.number.to_string()));
          }
        }
      }
    }
    Ok(())
  }

  /// Every question, depth first, section by section.
  pub fn questions(&self) -> impl Iterator<Item = &Question> {
    self
      .sections
      .iter()
      .flat_map(|s| s.questions.iter())
      .flat_map(Question::flatten)
  }

  /// Questions with no parent group; the scoring denominator.
  pub fn top_level_questions(&self) -> impl Iterator<Item = &Question> {
    self
      .sections
      .iter()
      .flat_map(|s| s.questions.iter())
      .filter(|q| q.is_top_level())
  }

  /// The number of every question in the survey, sub-questions included.
  pub fn question_numbers(&self) -> HashSet<String> {
    self.questions().map(|q| q.number.to_string()).collect()
  }

  pub fn question(&self, number: &str) -> Option<&Question> {
    self.questions().find(|q| q.number.as_str() == number)
  }

  pub fn section(&self, name: &str) -> Option<&Section> {
    self.sections.iter().find(|s| s.name.as_deref() == Some(name))
  }

  pub fn section_questions(&self, name: &str) -> Option<&[Question]> {
    self.section(name).map(|s| s.questions.as_slice())
  }

  /// Check that every answer has the variant its question's kind stores,
  /// walking into group answers. A nested answer must belong to a child of
  /// its group. Top-level numbers missing from the survey are left for
  /// reconciliation to reject.
  pub fn check_answer_kinds(&self, answers: &AnswerMap) -> Result<()> {
    for (number, answer) in answers {
      if let Some(question) = self.question(number) {
        self.check_answer_kind(question, answer)?;
      }
    }
    Ok(())
  }

  fn check_answer_kind(&self, question: &Question, answer: &Answer) -> Result<()> {
    if !question.answer_kind_matches(answer) {
      return Err(Error::InvalidAnswer(format!(
        "answer to {} does not fit a {} question",
        question.number,
        question.question_type()
      )));
    }
    let (Some(nested), Some(children)) = (answer.children(), question.children()) else {
      return Ok(());
    };
    for (number, child_answer) in nested {
      match children.get(number) {
        Some(child) => self.check_answer_kind(child, child_answer)?,
        None if self.question(number).is_some() => {
          return Err(Error::InvalidAnswer(format!(
            "answer to {number} is nested under {}, which is not its group",
            question.number
          )));
        }
        None => return Err(Error::UnknownQuestion(number.clone())),
      }
    }
    Ok(())
  }

  /// Flatten the survey into import rows, parents before their children.
  pub fn to_rows(&self) -> Vec<QuestionRow> {
    self.questions().map(QuestionRow::from_question).collect()
  }

  /// Regroup flat answers into the response shape.
  ///
  /// Every answer stays under its own number. In addition, each sub-question
  /// group gets an [`Answer::SubQuestions`] entry holding its children's
  /// answers, nested groups included. A child answer found only inside its
  /// group entry is given its own entry too; where both exist the child's own
  /// entry wins. Groups with no answered children and no entry of their own
  /// are left out.
  pub fn assemble_answers(
    &self,
    flat: impl IntoIterator<Item = (String, Answer)>,
  ) -> AnswerMap {
    let mut answers: AnswerMap = flat.into_iter().collect();
    for question in self.sections.iter().flat_map(|s| s.questions.iter()) {
      assemble_group(question, &mut answers);
    }
    answers
  }
}

fn assemble_group(question: &Question, answers: &mut AnswerMap) {
  let Some(children) = question.children() else {
    return;
  };
  let key = question.number.as_str();

  // Answers nested only inside the group entry get an entry of their own.
  if let Some(Answer::SubQuestions { children: nested }) = answers.get(key).cloned() {
    for (number, answer) in nested {
      if children.contains_key(&number) {
        answers.entry(number).or_insert(answer);
      }
    }
  }

  let mut grouped = AnswerMap::new();
  for (number, child) in children {
    assemble_group(child, answers);
    if let Some(answer) = answers.get(number) {
      grouped.insert(number.clone(), answer.clone());
    }
  }
  if !grouped.is_empty() || answers.contains_key(key) {
    answers.insert(key.to_owned(), Answer::sub_questions(grouped));
  }
}
