//! Subcommand handlers. Each runs against any [`SurveyStore`] and prints a
//! short human-readable report to stdout.

use std::path::Path;

use anyhow::Context as _;
use certify_core::{
  answer::{Answer, AnswerMap},
  import::SurveyImport,
  reconcile::ApplyReport,
  response::{ResponseAnswer, SurveyResponse, desired_answers},
  store::SurveyStore,
  version::SpecVersion,
};

/// The response a subcommand acts on.
#[derive(clap::Args, Debug, Clone)]
pub struct Target {
  pub username:     String,
  /// Defaults to the latest stored version.
  #[arg(long)]
  pub spec_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
  Submit,
  Unsubmit,
  Approve,
  Reject,
}

async fn resolve_version<S: SurveyStore>(
  store: &S,
  requested: Option<String>,
) -> anyhow::Result<SpecVersion> {
  match requested {
    Some(version) => Ok(SpecVersion::new(version)?),
    None => store
      .latest_spec_version()
      .await?
      .context("no survey has been imported yet"),
  }
}

// ─── Surveys ─────────────────────────────────────────────────────────────────

pub async fn import<S: SurveyStore>(store: &S, file: &Path) -> anyhow::Result<()> {
  let text = tokio::fs::read_to_string(file)
    .await
    .with_context(|| format!("failed to read {}", file.display()))?;
  let document: SurveyImport = serde_json::from_str(&text)
    .with_context(|| format!("failed to parse {}", file.display()))?;
  let survey = document
    .build()
    .with_context(|| format!("invalid survey in {}", file.display()))?;

  let version = survey.spec_version.clone();
  if store.get_survey(Some(version.clone())).await?.is_some() {
    let plan = store.update_survey(survey).await?;
    println!("Updated spec version {version}: {plan}");
  } else {
    let questions = survey.questions().count();
    store.add_survey(survey).await?;
    println!("Imported spec version {version} with {questions} questions");
  }
  Ok(())
}

pub async fn versions<S: SurveyStore>(store: &S) -> anyhow::Result<()> {
  let versions = store.list_spec_versions().await?;
  if versions.is_empty() {
    println!("No surveys imported");
  }
  let latest = versions.len().saturating_sub(1);
  for (i, version) in versions.iter().enumerate() {
    let marker = if i == latest { " (latest)" } else { "" };
    println!("{version}{marker}");
  }
  Ok(())
}

// ─── Responses ───────────────────────────────────────────────────────────────

pub fn status_label(response: &SurveyResponse) -> &'static str {
  if response.rejected {
    "rejected"
  } else if response.submitted && response.approved {
    "approved"
  } else if response.submitted {
    "submitted"
  } else {
    "in progress"
  }
}

pub fn describe_answer(answer: &Answer) -> String {
  match answer {
    Answer::YesNo { value } => value.to_string(),
    Answer::YesNoEvidence { value, evidence } => match evidence {
      Some(text) => format!("{value} ({text})"),
      None => value.to_string(),
    },
    Answer::SubQuestions { children } => format!("{} answered", children.len()),
  }
}

pub async fn show<S: SurveyStore>(store: &S, target: Target) -> anyhow::Result<()> {
  let version = resolve_version(store, target.spec_version).await?;
  let Some(response) = store
    .get_response(target.username.clone(), version.clone())
    .await?
  else {
    println!("{} has not answered spec version {version}", target.username);
    return Ok(());
  };

  println!(
    "{} / spec version {}: {}",
    response.username,
    response.spec_version(),
    status_label(&response)
  );
  println!(
    "complete {}%, score {}%",
    response.percent_complete()?,
    response.score()?
  );
  for question in response.survey.questions() {
    let indent = "  ".repeat(question.number.depth() - 1);
    let answer = response
      .answers
      .get(question.number.as_str())
      .map(describe_answer)
      .unwrap_or_else(|| "-".to_owned());
    println!("{indent}{:<8} {:<12} {}", question.number, answer, question.text);
  }

  let invalid: Vec<String> = response
    .invalid_answers()
    .iter()
    .map(|q| q.number.to_string())
    .collect();
  if !invalid.is_empty() {
    println!("needs attention: {}", invalid.join(", "));
  }
  Ok(())
}

fn print_report(report: &ApplyReport) {
  let applied = report.applied;
  println!(
    "added {}, updated {}, deleted {}",
    applied.adds, applied.updates, applied.deletes
  );
}

pub async fn answer<S: SurveyStore>(
  store: &S,
  target: Target,
  file: &Path,
  replace: bool,
) -> anyhow::Result<()> {
  let version = resolve_version(store, target.spec_version).await?;
  let text = tokio::fs::read_to_string(file)
    .await
    .with_context(|| format!("failed to read {}", file.display()))?;
  let inputs: Vec<ResponseAnswer> = serde_json::from_str(&text)
    .with_context(|| format!("failed to parse {}", file.display()))?;

  let report = if replace {
    let survey = store
      .get_survey(Some(version.clone()))
      .await?
      .with_context(|| format!("no survey for spec version {version}"))?;
    let desired = desired_answers(&survey, &AnswerMap::new(), &inputs)?;
    store.update_answers(target.username, version, desired).await?
  } else {
    store.record_answers(target.username, version, inputs).await?
  };
  print_report(&report);
  Ok(())
}

pub async fn reset<S: SurveyStore>(store: &S, target: Target) -> anyhow::Result<()> {
  let version = resolve_version(store, target.spec_version).await?;
  store
    .reset_answers(target.username.clone(), version.clone())
    .await?;
  println!("Reset {} / spec version {version}", target.username);
  Ok(())
}

// ─── Status ──────────────────────────────────────────────────────────────────

pub async fn change_status<S: SurveyStore>(
  store: &S,
  target: Target,
  change: StatusChange,
) -> anyhow::Result<()> {
  let version = resolve_version(store, target.spec_version).await?;
  let username = target.username;
  let response = match change {
    StatusChange::Submit => store.submit(username, version).await?,
    StatusChange::Unsubmit => store.unsubmit(username, version).await?,
    StatusChange::Approve => store.approve(username, version).await?,
    StatusChange::Reject => store.reject(username, version).await?,
  };
  println!(
    "{} / spec version {}: {}",
    response.username,
    response.spec_version(),
    status_label(&response)
  );
  Ok(())
}

pub async fn submissions<S: SurveyStore>(store: &S) -> anyhow::Result<()> {
  for submission in store.submissions().await? {
    println!("{}", serde_json::to_string(&submission)?);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use certify_core::answer::YesNo;
  use certify_store_sqlite::SqliteStore;

  use super::*;

  const SURVEY: &str = r#"{
    "specVersion": "1.0.2",
    "sections": [{ "name": "G1", "title": "General" }],
    "questions": [
      { "sectionName": "G1", "number": "1", "questionText": "Policy?",
        "type": "YES_NO", "correctAnswer": "Yes" },
      { "sectionName": "G1", "number": "2", "questionText": "Controls",
        "type": "SUBQUESTIONS", "correctAnswer": "1" },
      { "sectionName": "G1", "number": "2.a", "questionText": "Reviewed?",
        "type": "YES_NO", "correctAnswer": "Yes", "subQuestionNumber": "2" }
    ]
  }"#;

  fn temp_file(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("certify-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(&path, contents).unwrap();
    path
  }

  fn target(username: &str) -> Target {
    Target {
      username:     username.into(),
      spec_version: None,
    }
  }

  #[tokio::test]
  async fn import_answer_and_submit() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let survey = temp_file(SURVEY);
    import(&store, &survey).await.unwrap();
    // A second import of the same version goes through the update path.
    import(&store, &survey).await.unwrap();
    assert_eq!(store.list_spec_versions().await.unwrap().len(), 1);

    let answers = temp_file(
      r#"[{ "number": "1", "value": "YES" }, { "number": "2.a", "value": "yes" }]"#,
    );
    answer(&store, target("alice"), &answers, false).await.unwrap();
    change_status(&store, target("alice"), StatusChange::Submit)
      .await
      .unwrap();

    let response = store
      .get_response("alice".into(), SpecVersion::new("1.0.2").unwrap())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(status_label(&response), "approved");
    assert_eq!(response.answers["2.a"], Answer::yes_no(YesNo::Yes));

    std::fs::remove_file(survey).ok();
    std::fs::remove_file(answers).ok();
  }

  #[tokio::test]
  async fn replace_drops_unlisted_answers() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let survey = temp_file(SURVEY);
    import(&store, &survey).await.unwrap();

    let both = temp_file(
      r#"[{ "number": "1", "value": "YES" }, { "number": "2.a", "value": "NO" }]"#,
    );
    answer(&store, target("bob"), &both, false).await.unwrap();
    let only_one = temp_file(r#"[{ "number": "1", "value": "NO" }]"#);
    answer(&store, target("bob"), &only_one, true).await.unwrap();

    let response = store
      .get_response("bob".into(), SpecVersion::new("1.0.2").unwrap())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(
      response.answers,
      AnswerMap::from([("1".to_owned(), Answer::yes_no(YesNo::No))])
    );

    for path in [survey, both, only_one] {
      std::fs::remove_file(path).ok();
    }
  }

  #[tokio::test]
  async fn commands_need_an_imported_survey() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let err = reset(&store, target("alice")).await.unwrap_err();
    assert!(err.to_string().contains("no survey"));
  }

  #[test]
  fn labels_follow_status_flags() {
    let survey = std::sync::Arc::new(
      SurveyImport {
        spec_version: "1.0.2".into(),
        sections:     Vec::new(),
        questions:    Vec::new(),
      }
      .build()
      .unwrap(),
    );
    let mut response = SurveyResponse::new("alice", survey);
    assert_eq!(status_label(&response), "in progress");
    response.submitted = true;
    assert_eq!(status_label(&response), "submitted");
    response.approve();
    assert_eq!(status_label(&response), "approved");
    response.reject();
    assert_eq!(status_label(&response), "rejected");
  }

  #[test]
  fn answers_are_described_briefly() {
    assert_eq!(describe_answer(&Answer::yes_no(YesNo::No)), "No");
    assert_eq!(
      describe_answer(&Answer::with_evidence(YesNo::Yes, Some("ticket 4".into()))),
      "Yes (ticket 4)"
    );
    let group = Answer::sub_questions(AnswerMap::from([(
      "2.a".to_owned(),
      Answer::yes_no(YesNo::Yes),
    )]));
    assert_eq!(describe_answer(&group), "1 answered");
  }
}
