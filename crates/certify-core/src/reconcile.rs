//! Answer reconciliation: desired answers → minimal store mutations.
//!
//! Computes the adds, updates and deletes needed to move a response's stored
//! answers to match the answers a caller wants to keep. The computation is
//! pure; applying the plan atomically is the store's job.

use std::collections::HashSet;

use crate::{
  Error, Result,
  answer::{Answer, AnswerMap},
};

/// The result of reconciling desired answers against stored answers.
///
/// Every list is ordered by question number and no number appears in more
/// than one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
  pub adds:    Vec<(String, Answer)>,
  pub updates: Vec<(String, Answer)>,
  pub deletes: Vec<String>,
}

/// Row counts per mutation class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCounts {
  pub adds:    usize,
  pub updates: usize,
  pub deletes: usize,
}

/// Intended versus actually applied row counts for one applied plan.
///
/// Stores report the two side by side; a mismatch is an operational alarm,
/// not a failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
  pub planned: MutationCounts,
  pub applied: MutationCounts,
}

impl ApplyReport {
  pub fn is_consistent(&self) -> bool { self.planned == self.applied }
}

impl MutationPlan {
  pub fn is_empty(&self) -> bool {
    self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
  }

  pub fn counts(&self) -> MutationCounts {
    MutationCounts {
      adds:    self.adds.len(),
      updates: self.updates.len(),
      deletes: self.deletes.len(),
    }
  }

  /// Apply the plan to an in-memory answer map.
  pub fn apply_to(&self, answers: &mut AnswerMap) {
    for (number, answer) in self.adds.iter().chain(&self.updates) {
      answers.insert(number.clone(), answer.clone());
    }
    for number in &self.deletes {
      answers.remove(number);
    }
  }
}

/// Compute the mutations that turn `stored` into `desired`.
///
/// Every desired key must be in `valid_numbers`, including the child keys
/// nested inside group answers; otherwise the whole call fails with
/// [`Error::UnknownQuestion`] before anything is planned.
pub fn reconcile(
  desired: &AnswerMap,
  stored: &AnswerMap,
  valid_numbers: &HashSet<String>,
) -> Result<MutationPlan> {
  if let Some(unknown) = find_unknown(desired, valid_numbers) {
    return Err(Error::UnknownQuestion(unknown.clone()));
  }

  let mut plan = MutationPlan::default();
  for (number, answer) in desired {
    match stored.get(number) {
      // Unchanged.
      Some(existing) if existing == answer => {}
      Some(_) => plan.updates.push((number.clone(), answer.clone())),
      None => plan.adds.push((number.clone(), answer.clone())),
    }
  }

  // Anything stored but no longer desired was removed by the caller.
  plan.deletes = stored
    .keys()
    .filter(|n| !desired.contains_key(*n))
    .cloned()
    .collect();

  Ok(plan)
}

fn find_unknown<'a>(
  answers: &'a AnswerMap,
  valid_numbers: &HashSet<String>,
) -> Option<&'a String> {
  answers.iter().find_map(|(number, answer)| {
    if !valid_numbers.contains(number) {
      return Some(number);
    }
    answer
      .children()
      .and_then(|children| find_unknown(children, valid_numbers))
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::answer::YesNo;

  fn map(pairs: &[(&str, Answer)]) -> AnswerMap {
    pairs
      .iter()
      .map(|(n, a)| ((*n).to_owned(), a.clone()))
      .collect()
  }

  fn valid(numbers: &[&str]) -> HashSet<String> {
    numbers.iter().map(|n| (*n).to_owned()).collect()
  }

  fn yes() -> Answer { Answer::yes_no(YesNo::Yes) }

  fn no() -> Answer { Answer::yes_no(YesNo::No) }

  #[test]
  fn empty_stored_means_all_adds() {
    let desired = map(&[("1", yes()), ("2", no())]);
    let plan = reconcile(&desired, &AnswerMap::new(), &valid(&["1", "2"])).unwrap();
    assert_eq!(plan.adds.len(), 2);
    assert!(plan.updates.is_empty());
    assert!(plan.deletes.is_empty());
  }

  #[test]
  fn changed_value_is_update() {
    let stored = map(&[("1", yes())]);
    let desired = map(&[("1", no())]);
    let plan = reconcile(&desired, &stored, &valid(&["1"])).unwrap();
    assert_eq!(plan.updates, vec![("1".to_owned(), no())]);
    assert!(plan.adds.is_empty() && plan.deletes.is_empty());
  }

  #[test]
  fn changed_evidence_is_update() {
    let stored = map(&[("1", Answer::with_evidence(YesNo::Yes, Some("a".into())))]);
    let desired = map(&[("1", Answer::with_evidence(YesNo::Yes, Some("b".into())))]);
    let plan = reconcile(&desired, &stored, &valid(&["1"])).unwrap();
    assert_eq!(plan.counts().updates, 1);
  }

  #[test]
  fn absent_answer_is_delete() {
    let stored = map(&[("1", yes()), ("2", no())]);
    let desired = map(&[("1", yes())]);
    let plan = reconcile(&desired, &stored, &valid(&["1", "2"])).unwrap();
    assert_eq!(plan.deletes, vec!["2".to_owned()]);
    assert!(plan.adds.is_empty() && plan.updates.is_empty());
  }

  #[test]
  fn unknown_question_is_rejected() {
    let desired = map(&[("99.z", yes())]);
    let err = reconcile(&desired, &AnswerMap::new(), &valid(&["1.a"]));
    assert!(matches!(err, Err(Error::UnknownQuestion(n)) if n == "99.z"));
  }

  #[test]
  fn unknown_question_rejects_the_whole_update() {
    let stored = map(&[("1", yes())]);
    let desired = map(&[("1", no()), ("2", yes()), ("7", yes())]);
    let err = reconcile(&desired, &stored, &valid(&["1", "2"]));
    assert!(matches!(err, Err(Error::UnknownQuestion(n)) if n == "7"));
  }

  #[test]
  fn unknown_number_inside_a_group_is_rejected() {
    let desired = map(&[("4", Answer::sub_questions(map(&[("99.z", yes())])))]);
    let err = reconcile(&desired, &AnswerMap::new(), &valid(&["4", "4.a"]));
    assert!(matches!(err, Err(Error::UnknownQuestion(n)) if n == "99.z"));
  }

  #[test]
  fn report_with_lost_rows_is_inconsistent() {
    let plan = MutationPlan {
      adds:    vec![("1".to_owned(), yes())],
      updates: vec![],
      deletes: vec!["2".to_owned()],
    };
    let mut report = ApplyReport {
      planned: plan.counts(),
      applied: plan.counts(),
    };
    assert!(report.is_consistent());

    report.applied.deletes = 0;
    assert!(!report.is_consistent());
    assert_eq!(report.planned.deletes, 1);
  }

  #[test]
  fn reconcile_is_idempotent() {
    let previous = map(&[("1", yes()), ("3", no())]);
    let desired = map(&[
      ("1", no()),
      ("2", yes()),
      (
        "4",
        Answer::sub_questions(map(&[("4.a", yes()), ("4.b", no())])),
      ),
      ("4.a", yes()),
      ("4.b", no()),
    ]);
    let numbers = valid(&["1", "2", "3", "4", "4.a", "4.b"]);

    let first = reconcile(&desired, &previous, &numbers).unwrap();
    assert!(!first.is_empty());

    let mut stored = previous.clone();
    first.apply_to(&mut stored);
    assert_eq!(stored, desired);

    let second = reconcile(&desired, &stored, &numbers).unwrap();
    assert!(second.is_empty(), "{second:?}");
  }

  #[test]
  fn plan_partitions_stored_and_desired() {
    let stored = map(&[("1", yes()), ("2", yes()), ("3", yes()), ("5", no())]);
    let desired = map(&[("1", yes()), ("2", no()), ("4", yes()), ("5", yes())]);
    let numbers = valid(&["1", "2", "3", "4", "5"]);
    let plan = reconcile(&desired, &stored, &numbers).unwrap();

    let adds: Vec<&str> = plan.adds.iter().map(|(n, _)| n.as_str()).collect();
    let updates: Vec<&str> = plan.updates.iter().map(|(n, _)| n.as_str()).collect();
    let deletes: Vec<&str> = plan.deletes.iter().map(String::as_str).collect();
    assert_eq!(adds, ["4"]);
    assert_eq!(updates, ["2", "5"]);
    assert_eq!(deletes, ["3"]);

    // Each key of stored ∪ desired is either untouched (equal in both) or in
    // exactly one list.
    let all: HashSet<&String> = stored.keys().chain(desired.keys()).collect();
    for key in all {
      let hits = adds.contains(&key.as_str()) as usize
        + updates.contains(&key.as_str()) as usize
        + deletes.contains(&key.as_str()) as usize;
      let unchanged = stored.get(key).is_some() && stored.get(key) == desired.get(key);
      assert_eq!(hits + unchanged as usize, 1, "key {key}");
    }
  }

  #[test]
  fn group_answer_changes_are_updates() {
    let stored = map(&[("4", Answer::sub_questions(map(&[("4.a", yes())])))]);
    let desired = map(&[(
      "4",
      Answer::sub_questions(map(&[("4.a", yes()), ("4.b", yes())])),
    )]);
    let plan = reconcile(&desired, &stored, &valid(&["4", "4.a", "4.b"])).unwrap();
    assert_eq!(plan.counts(), MutationCounts {
      adds:    0,
      updates: 1,
      deletes: 0,
    });
  }
}
