//! Integration tests for `SqliteStore` against an in-memory database.

use certify_core::{
  answer::{Answer, AnswerMap, YesNo},
  import::{QuestionRow, SectionRow, build_survey},
  reconcile::ApplyReport,
  response::ResponseAnswer,
  store::SurveyStore,
  survey::Survey,
  version::SpecVersion,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn v(version: &str) -> SpecVersion { SpecVersion::new(version).unwrap() }

fn row(
  section: &str,
  number: &str,
  kind: &str,
  correct: &str,
  parent: Option<&str>,
) -> QuestionRow {
  QuestionRow {
    section_name:        section.into(),
    number:              number.into(),
    spec_reference:      None,
    question_text:       format!("Question {number}"),
    question_type:       kind.into(),
    correct_answer:      correct.into(),
    evidence_prompt:     None,
    evidence_validation: None,
    sub_question_of:     parent.map(str::to_owned),
  }
}

fn sections() -> Vec<SectionRow> {
  vec![
    SectionRow {
      name:  "G1".into(),
      title: "General".into(),
    },
    SectionRow {
      name:  "G2".into(),
      title: "Governance".into(),
    },
  ]
}

/// Questions 1 (yes/no), 2 (evidence, `https?://.+`), 3 (group of 3.a and
/// 3.b, one must be valid) and 4 (yes/no/NA expecting Yes or NA).
fn rows() -> Vec<QuestionRow> {
  let mut evidence = row("G1", "2", "YES_NO_EVIDENCE", "Yes", None);
  evidence.evidence_prompt = Some("Link to the policy".into());
  evidence.evidence_validation = Some("https?://.+".into());
  vec![
    row("G1", "1", "YES_NO", "Yes", None),
    evidence,
    row("G2", "3.a", "YES_NO", "Yes", Some("3")),
    row("G2", "3", "SUBQUESTIONS", "1", None),
    row("G2", "3.b", "YES_NO", "No", Some("3")),
    row("G2", "4", "YES_NO_NA", "YesNotApplicable", None),
  ]
}

fn survey(version: &str) -> Survey { build_survey(&v(version), &sections(), &rows()).unwrap() }

async fn seeded() -> SqliteStore {
  let s = store().await;
  s.add_survey(survey("1.0.2")).await.unwrap();
  s
}

/// A seeded store on disk, plus a second raw connection to the same file for
/// changing rows behind the store's back.
async fn seeded_on_disk() -> (SqliteStore, rusqlite::Connection, std::path::PathBuf) {
  let dir = std::env::temp_dir().join(format!("certify-{}", uuid::Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let s = SqliteStore::open(dir.join("store.db")).await.unwrap();
  s.add_survey(survey("1.0.2")).await.unwrap();
  let raw = rusqlite::Connection::open(dir.join("store.db")).unwrap();
  (s, raw, dir)
}

fn input(number: &str, value: &str) -> ResponseAnswer {
  ResponseAnswer {
    number:   number.into(),
    value:    value.into(),
    evidence: None,
  }
}

fn complete_inputs() -> Vec<ResponseAnswer> {
  vec![
    input("1", "YES"),
    ResponseAnswer {
      number:   "2".into(),
      value:    "YES".into(),
      evidence: Some("https://example.org/policy".into()),
    },
    input("3", ""),
    input("3.a", "YES"),
    input("4", "NA"),
  ]
}

// ─── Surveys ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_survey() {
  let s = seeded().await;
  let loaded = s.get_survey(Some(v("1.0.2"))).await.unwrap().unwrap();
  assert_eq!(*loaded, survey("1.0.2"));
  assert_eq!(loaded.sections.len(), 2);
  assert_eq!(loaded.question("3").unwrap().children().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_survey_is_none() {
  let s = seeded().await;
  assert!(s.get_survey(Some(v("9.9"))).await.unwrap().is_none());
  assert!(store().await.get_survey(None).await.unwrap().is_none());
}

#[tokio::test]
async fn adding_a_version_twice_fails() {
  let s = seeded().await;
  let err = s.add_survey(survey("1.0.2")).await.unwrap_err();
  assert!(matches!(err, Error::SurveyExists(ref version) if version == "1.0.2"));
  assert!(err.is_invalid_request());
}

#[tokio::test]
async fn latest_version_compares_numerically() {
  let s = store().await;
  for version in ["1.0.9", "1.0.10", "1.0.2"] {
    s.add_survey(survey(version)).await.unwrap();
  }
  assert_eq!(s.latest_spec_version().await.unwrap(), Some(v("1.0.10")));
  let versions: Vec<String> = s
    .list_spec_versions()
    .await
    .unwrap()
    .into_iter()
    .map(String::from)
    .collect();
  assert_eq!(versions, ["1.0.2", "1.0.9", "1.0.10"]);

  let latest = s.get_survey(None).await.unwrap().unwrap();
  assert_eq!(latest.spec_version, v("1.0.10"));
}

#[tokio::test]
async fn update_survey_adds_and_rewords() {
  let s = seeded().await;
  let mut rows = rows();
  rows[0].question_text = "Reworded".into();
  rows.push(row("G2", "3.c", "YES_NO", "Yes", Some("3")));
  let mut sections = sections();
  sections[1].title = "Oversight".into();
  let incoming = build_survey(&v("1.0.2"), &sections, &rows).unwrap();

  let plan = s.update_survey(incoming.clone()).await.unwrap();
  let added: Vec<String> = plan.added.iter().map(|q| q.number.to_string()).collect();
  let updated: Vec<String> = plan.updated.iter().map(|q| q.number.to_string()).collect();
  assert_eq!(added, ["3.c"]);
  assert_eq!(updated, ["1", "3"]);
  assert_eq!(plan.section_titles["G2"], "Oversight");

  let loaded = s.get_survey(Some(v("1.0.2"))).await.unwrap().unwrap();
  assert_eq!(*loaded, incoming);

  let again = s.update_survey(incoming).await.unwrap();
  assert!(again.is_empty());
}

#[tokio::test]
async fn update_survey_rejects_removed_questions() {
  let s = seeded().await;
  let mut rows = rows();
  rows.retain(|r| r.number != "4");
  let incoming = build_survey(&v("1.0.2"), &sections(), &rows).unwrap();
  let err = s.update_survey(incoming).await.unwrap_err();
  assert!(
    matches!(err, Error::Core(certify_core::Error::QuestionsRemoved(ref n)) if n == &["4"])
  );

  // Nothing was written.
  let loaded = s.get_survey(Some(v("1.0.2"))).await.unwrap().unwrap();
  assert!(loaded.question("4").is_some());
}

#[tokio::test]
async fn update_survey_keeps_question_types_and_parents() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES"), input("3.a", "NO")])
    .await
    .unwrap();
  s.record_answers("bob".into(), v("1.0.2"), vec![input("1", "YES")])
    .await
    .unwrap();

  // Group 3 becomes a plain question and its children move to the top level.
  let mut flattened = rows();
  for r in &mut flattened {
    match r.number.as_str() {
      "3" => {
        r.question_type = "YES_NO".into();
        r.correct_answer = "Yes".into();
      }
      "3.a" | "3.b" => r.sub_question_of = None,
      _ => {}
    }
  }
  let incoming = build_survey(&v("1.0.2"), &sections(), &flattened).unwrap();
  let err = s.update_survey(incoming).await.unwrap_err();
  assert!(matches!(err, Error::Core(certify_core::Error::QuestionFormat(_))));

  // Only the parent changes.
  let mut moved = rows();
  moved.push(row("G2", "5", "SUBQUESTIONS", "1", None));
  for r in &mut moved {
    if r.number == "3.b" {
      r.sub_question_of = Some("5".into());
    }
  }
  let incoming = build_survey(&v("1.0.2"), &sections(), &moved).unwrap();
  let err = s.update_survey(incoming).await.unwrap_err();
  assert!(matches!(err, Error::Core(certify_core::Error::QuestionFormat(_))));

  let alice = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(alice.answers["3.a"], Answer::yes_no(YesNo::No));
  assert!(alice.answers["3"].children().is_some());
  assert_eq!(s.submissions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn update_of_unknown_version_fails() {
  let s = seeded().await;
  let err = s.update_survey(survey("2.0")).await.unwrap_err();
  assert!(matches!(err, Error::SurveyNotFound(_)));
}

// ─── Answers ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_answers_creates_response() {
  let s = seeded().await;
  assert!(s.get_response("alice".into(), v("1.0.2")).await.unwrap().is_none());

  let report = s
    .record_answers("alice".into(), v("1.0.2"), vec![input("1", "yes"), input("3.a", "NO")])
    .await
    .unwrap();
  // 1, 3.a and the group entry for 3.
  assert_eq!(report.planned.adds, 3);
  assert!(report.is_consistent());

  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(response.answers["1"], Answer::yes_no(YesNo::Yes));
  assert_eq!(
    response.answers["3"],
    Answer::sub_questions(AnswerMap::from([(
      "3.a".to_owned(),
      Answer::yes_no(YesNo::No)
    )]))
  );
  assert!(!response.submitted);
  assert_eq!(response.percent_complete().unwrap(), 50);
  assert_eq!(response.score().unwrap(), 25);
}

#[tokio::test]
async fn record_answers_keeps_unmentioned_answers() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES")])
    .await
    .unwrap();
  let report = s
    .record_answers("alice".into(), v("1.0.2"), vec![input("4", "NA")])
    .await
    .unwrap();
  assert_eq!(report.planned.adds, 1);
  assert_eq!(report.planned.deletes, 0);

  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(response.answers.len(), 2);
}

#[tokio::test]
async fn reapplying_the_same_answers_is_a_no_op() {
  let s = seeded().await;
  let first = s
    .record_answers("alice".into(), v("1.0.2"), complete_inputs())
    .await
    .unwrap();
  assert!(first.planned.adds > 0);

  let second = s
    .record_answers("alice".into(), v("1.0.2"), complete_inputs())
    .await
    .unwrap();
  assert_eq!(second, ApplyReport::default());

  let stored = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap().answers;
  let third = s
    .update_answers("alice".into(), v("1.0.2"), stored)
    .await
    .unwrap();
  assert_eq!(third, ApplyReport::default());
}

#[tokio::test]
async fn update_answers_replaces_the_whole_map() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), complete_inputs())
    .await
    .unwrap();

  let desired = AnswerMap::from([
    ("1".to_owned(), Answer::yes_no(YesNo::No)),
    (
      "2".to_owned(),
      Answer::with_evidence(YesNo::Yes, Some("https://example.org/v2".into())),
    ),
  ]);
  let report = s
    .update_answers("alice".into(), v("1.0.2"), desired.clone())
    .await
    .unwrap();
  assert_eq!(report.planned.adds, 0);
  assert_eq!(report.planned.updates, 2);
  // 3, 3.a and 4.
  assert_eq!(report.planned.deletes, 3);
  assert!(report.is_consistent());

  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(response.answers, desired);
}

#[tokio::test]
async fn unknown_question_rejects_the_whole_update() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES")])
    .await
    .unwrap();

  let desired = AnswerMap::from([
    ("1".to_owned(), Answer::yes_no(YesNo::No)),
    ("99.z".to_owned(), Answer::yes_no(YesNo::Yes)),
  ]);
  let err = s
    .update_answers("alice".into(), v("1.0.2"), desired)
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::Core(certify_core::Error::UnknownQuestion(ref n)) if n == "99.z")
  );
  assert!(err.is_invalid_request());

  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(response.answers["1"], Answer::yes_no(YesNo::Yes));
}

#[tokio::test]
async fn mismatched_answer_kind_is_rejected() {
  let s = seeded().await;
  let desired = AnswerMap::from([(
    "1".to_owned(),
    Answer::with_evidence(YesNo::Yes, Some("x".into())),
  )]);
  let err = s
    .update_answers("alice".into(), v("1.0.2"), desired)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(certify_core::Error::InvalidAnswer(_))));
  assert!(s.get_response("alice".into(), v("1.0.2")).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_number_nested_in_a_group_is_rejected() {
  let s = seeded().await;
  let desired = AnswerMap::from([(
    "3".to_owned(),
    Answer::sub_questions(AnswerMap::from([(
      "99.z".to_owned(),
      Answer::yes_no(YesNo::Yes),
    )])),
  )]);
  let err = s
    .update_answers("alice".into(), v("1.0.2"), desired)
    .await
    .unwrap_err();
  assert!(
    matches!(err, Error::Core(certify_core::Error::UnknownQuestion(ref n)) if n == "99.z")
  );
  assert!(s.get_response("alice".into(), v("1.0.2")).await.unwrap().is_none());
}

#[tokio::test]
async fn rows_that_no_longer_fit_their_question_are_skipped() {
  let (s, raw, dir) = seeded_on_disk().await;
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES"), input("3.a", "YES")])
    .await
    .unwrap();
  s.record_answers("bob".into(), v("1.0.2"), vec![input("4", "NA")])
    .await
    .unwrap();

  // A yes/no row without a value, and a group row with one.
  raw
    .execute_batch(
      "UPDATE answers SET answer = NULL WHERE number = '1';
       UPDATE answers SET answer = 'Yes' WHERE number = '3';",
    )
    .unwrap();

  let alice = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert!(!alice.answers.contains_key("1"));
  assert_eq!(alice.answers["3.a"], Answer::yes_no(YesNo::Yes));
  assert_eq!(alice.answers["3"].children().unwrap().len(), 1);
  assert_eq!(s.submissions().await.unwrap().len(), 2);

  // The skipped row can be answered again.
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "NO")])
    .await
    .unwrap();
  let alice = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(alice.answers["1"], Answer::yes_no(YesNo::No));

  drop(raw);
  std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn count_drift_is_reported_and_committed() {
  let (s, raw, dir) = seeded_on_disk().await;
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES"), input("4", "NA")])
    .await
    .unwrap();

  // Deletes are silently dropped, so the applied count falls short.
  raw
    .execute_batch(
      "CREATE TRIGGER keep_answers BEFORE DELETE ON answers
       BEGIN SELECT RAISE(IGNORE); END;",
    )
    .unwrap();

  let desired = AnswerMap::from([("1".to_owned(), Answer::yes_no(YesNo::No))]);
  let report = s
    .update_answers("alice".into(), v("1.0.2"), desired)
    .await
    .unwrap();
  assert!(!report.is_consistent());
  assert_eq!((report.planned.updates, report.applied.updates), (1, 1));
  assert_eq!((report.planned.deletes, report.applied.deletes), (1, 0));

  let alice = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(alice.answers["1"], Answer::yes_no(YesNo::No));
  assert_eq!(alice.answers["4"], Answer::yes_no(YesNo::NotApplicable));

  drop(raw);
  std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn answers_for_missing_survey_fail() {
  let s = seeded().await;
  let err = s
    .record_answers("alice".into(), v("3.0"), vec![input("1", "YES")])
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SurveyNotFound(_)));
}

#[tokio::test]
async fn responses_are_per_user_and_version() {
  let s = seeded().await;
  s.add_survey(survey("1.0.3")).await.unwrap();
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES")])
    .await
    .unwrap();
  s.record_answers("alice".into(), v("1.0.3"), vec![input("1", "NO")])
    .await
    .unwrap();
  s.record_answers("bob".into(), v("1.0.2"), vec![input("4", "NA")])
    .await
    .unwrap();

  let old = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  let new = s.get_response("alice".into(), v("1.0.3")).await.unwrap().unwrap();
  assert_ne!(old.id, new.id);
  assert_eq!(old.answers["1"], Answer::yes_no(YesNo::Yes));
  assert_eq!(new.answers["1"], Answer::yes_no(YesNo::No));

  let listed: Vec<(String, String)> = s
    .list_responses()
    .await
    .unwrap()
    .into_iter()
    .map(|r| (r.username.clone(), r.spec_version().to_string()))
    .collect();
  assert_eq!(listed, [
    ("alice".to_owned(), "1.0.2".to_owned()),
    ("alice".to_owned(), "1.0.3".to_owned()),
    ("bob".to_owned(), "1.0.2".to_owned()),
  ]);
}

#[tokio::test]
async fn reset_clears_answers_and_status() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), complete_inputs())
    .await
    .unwrap();
  s.submit("alice".into(), v("1.0.2")).await.unwrap();

  s.reset_answers("alice".into(), v("1.0.2")).await.unwrap();
  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert!(response.answers.is_empty());
  assert!(!response.submitted && !response.approved && !response.rejected);

  let err = s.reset_answers("bob".into(), v("1.0.2")).await.unwrap_err();
  assert!(matches!(err, Error::ResponseNotFound { .. }));
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn incomplete_response_cannot_be_submitted() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES"), input("3.b", "YES")])
    .await
    .unwrap();

  let err = s.submit("alice".into(), v("1.0.2")).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(certify_core::Error::IncompleteSubmission(ref n)) if n == &["2", "3", "4"]
  ));
  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert!(!response.submitted);
}

#[tokio::test]
async fn submit_approve_reject_unsubmit() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), complete_inputs())
    .await
    .unwrap();

  let submitted = s.submit("alice".into(), v("1.0.2")).await.unwrap();
  assert!(submitted.submitted && submitted.approved && !submitted.rejected);

  let rejected = s.reject("alice".into(), v("1.0.2")).await.unwrap();
  assert!(rejected.rejected && !rejected.approved);

  let approved = s.approve("alice".into(), v("1.0.2")).await.unwrap();
  assert!(approved.approved && !approved.rejected);

  let reloaded = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert!(reloaded.submitted && reloaded.approved);

  let reopened = s.unsubmit("alice".into(), v("1.0.2")).await.unwrap();
  assert!(!reopened.submitted && !reopened.approved && !reopened.rejected);
}

#[tokio::test]
async fn status_change_without_response_fails() {
  let s = seeded().await;
  let err = s.approve("nobody".into(), v("1.0.2")).await.unwrap_err();
  assert!(matches!(err, Error::ResponseNotFound { ref username, .. } if username == "nobody"));
}

#[tokio::test]
async fn submissions_report_scores() {
  let s = seeded().await;
  s.record_answers("alice".into(), v("1.0.2"), complete_inputs())
    .await
    .unwrap();
  s.submit("alice".into(), v("1.0.2")).await.unwrap();
  s.record_answers("bob".into(), v("1.0.2"), vec![input("1", "NO")])
    .await
    .unwrap();

  let submissions = s.submissions().await.unwrap();
  assert_eq!(submissions.len(), 2);

  let alice = &submissions[0];
  assert_eq!(alice.username, "alice");
  assert!(alice.submitted && alice.approved);
  assert_eq!((alice.percent_complete, alice.score), (100, 100));

  let bob = &submissions[1];
  assert_eq!(bob.username, "bob");
  assert!(!bob.submitted);
  assert_eq!((bob.percent_complete, bob.score), (25, 0));
}

#[tokio::test]
async fn store_survives_reopen() {
  let dir = std::env::temp_dir().join(format!("certify-{}", uuid::Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("store.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.add_survey(survey("1.0.2")).await.unwrap();
    s.record_answers("alice".into(), v("1.0.2"), vec![input("1", "YES")])
      .await
      .unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let response = s.get_response("alice".into(), v("1.0.2")).await.unwrap().unwrap();
  assert_eq!(response.answers["1"], Answer::yes_no(YesNo::Yes));

  std::fs::remove_dir_all(&dir).ok();
}
