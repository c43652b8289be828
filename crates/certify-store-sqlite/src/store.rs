//! SQLite implementation of [`SurveyStore`]: [`SqliteStore`].

use std::{collections::HashMap, path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use certify_core::{
  answer::AnswerMap,
  import::{QuestionRow, SectionRow, build_survey},
  reconcile::{ApplyReport, reconcile},
  response::{ResponseAnswer, Submission, SurveyResponse, desired_answers},
  store::SurveyStore,
  survey::Survey,
  update::{SurveyUpdatePlan, plan_survey_update},
  version::SpecVersion,
};

use crate::{
  Error, Result,
  encode::{
    RESPONSE_COLUMNS, RawAnswer, RawResponse, answer_shape_fits, decode_answer, encode_answer,
    encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A survey store backed by a single SQLite file.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, used by the tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread and hand back its result.
  async fn call<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

// ─── Surveys ─────────────────────────────────────────────────────────────────

/// The stored spelling of `version`, if any stored version compares equal.
fn resolve_version(
  conn: &rusqlite::Connection,
  version: &SpecVersion,
) -> Result<Option<SpecVersion>> {
  Ok(load_versions(conn)?.into_iter().find(|v| v == version))
}

/// Every stored spec version, oldest first.
fn load_versions(conn: &rusqlite::Connection) -> Result<Vec<SpecVersion>> {
  let mut stmt = conn.prepare("SELECT spec_version FROM specs")?;
  let raws: Vec<String> = stmt
    .query_map([], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let mut versions = raws
    .into_iter()
    .map(SpecVersion::new)
    .collect::<certify_core::Result<Vec<_>>>()?;
  versions.sort();
  Ok(versions)
}

fn load_survey(conn: &rusqlite::Connection, version: &SpecVersion) -> Result<Option<Survey>> {
  let Some(version) = resolve_version(conn, version)? else {
    return Ok(None);
  };

  let mut section_stmt =
    conn.prepare_cached("SELECT name, title FROM sections WHERE spec_version = ?1")?;
  let sections: Vec<SectionRow> = section_stmt
    .query_map(rusqlite::params![version.as_str()], |row| {
      Ok(SectionRow {
        name:  row.get(0)?,
        title: row.get(1)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut question_stmt = conn.prepare_cached(
    "SELECT section_name, number, spec_reference, question_text, question_type,
            correct_answer, evidence_prompt, evidence_validation, subquestion_of
     FROM questions WHERE spec_version = ?1",
  )?;
  let rows: Vec<QuestionRow> = question_stmt
    .query_map(rusqlite::params![version.as_str()], |row| {
      Ok(QuestionRow {
        section_name:        row.get(0)?,
        number:              row.get(1)?,
        spec_reference:      row.get(2)?,
        question_text:       row.get(3)?,
        question_type:       row.get(4)?,
        correct_answer:      row.get(5)?,
        evidence_prompt:     row.get(6)?,
        evidence_validation: row.get(7)?,
        sub_question_of:     row.get(8)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Some(build_survey(&version, &sections, &rows)?))
}

fn require_survey(conn: &rusqlite::Connection, version: &SpecVersion) -> Result<Survey> {
  load_survey(conn, version)?.ok_or_else(|| Error::SurveyNotFound(version.to_string()))
}

fn insert_question(
  conn: &rusqlite::Connection,
  version: &SpecVersion,
  row: &QuestionRow,
) -> Result<usize> {
  Ok(conn.execute(
    "INSERT INTO questions (
       spec_version, number, section_name, question_text, question_type,
       correct_answer, evidence_prompt, evidence_validation, spec_reference,
       subquestion_of
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    rusqlite::params![
      version.as_str(),
      row.number,
      row.section_name,
      row.question_text,
      row.question_type,
      row.correct_answer,
      row.evidence_prompt,
      row.evidence_validation,
      row.spec_reference,
      row.sub_question_of,
    ],
  )?)
}

fn update_question(
  conn: &rusqlite::Connection,
  version: &SpecVersion,
  row: &QuestionRow,
) -> Result<usize> {
  Ok(conn.execute(
    "UPDATE questions SET
       section_name = ?3, question_text = ?4, question_type = ?5,
       correct_answer = ?6, evidence_prompt = ?7, evidence_validation = ?8,
       spec_reference = ?9, subquestion_of = ?10
     WHERE spec_version = ?1 AND number = ?2",
    rusqlite::params![
      version.as_str(),
      row.number,
      row.section_name,
      row.question_text,
      row.question_type,
      row.correct_answer,
      row.evidence_prompt,
      row.evidence_validation,
      row.spec_reference,
      row.sub_question_of,
    ],
  )?)
}

fn insert_survey(conn: &mut rusqlite::Connection, survey: &Survey) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  if let Some(existing) = resolve_version(&tx, &survey.spec_version)? {
    return Err(Error::SurveyExists(existing.to_string()));
  }

  let version = &survey.spec_version;
  tx.execute(
    "INSERT INTO specs (spec_version, created_at) VALUES (?1, ?2)",
    rusqlite::params![version.as_str(), encode_dt(Utc::now())],
  )?;
  for section in &survey.sections {
    tx.execute(
      "INSERT INTO sections (spec_version, name, title) VALUES (?1, ?2, ?3)",
      rusqlite::params![
        version.as_str(),
        section.name.as_deref().unwrap_or_default(),
        section.title,
      ],
    )?;
  }
  let rows = survey.to_rows();
  for row in &rows {
    insert_question(&tx, version, row)?;
  }
  tx.commit()?;

  tracing::info!(spec_version = %version, questions = rows.len(), "added survey");
  Ok(())
}

fn apply_survey_update(
  conn: &mut rusqlite::Connection,
  incoming: &Survey,
) -> Result<SurveyUpdatePlan> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let existing = require_survey(&tx, &incoming.spec_version)?;
  let plan = plan_survey_update(&existing, incoming)?;
  let version = &existing.spec_version;

  for (name, title) in &plan.section_titles {
    let changed = tx.execute(
      "UPDATE sections SET title = ?3 WHERE spec_version = ?1 AND name = ?2",
      rusqlite::params![version.as_str(), name, title],
    )?;
    if changed != 1 {
      tracing::warn!(
        spec_version = %version,
        section = %name,
        changed,
        "section retitle touched an unexpected number of rows"
      );
    }
  }
  for question in &plan.updated {
    let changed = update_question(&tx, version, &QuestionRow::from_question(question))?;
    if changed != 1 {
      tracing::warn!(
        spec_version = %version,
        number = %question.number,
        changed,
        "question update touched an unexpected number of rows"
      );
    }
  }
  for question in &plan.added {
    insert_question(&tx, version, &QuestionRow::from_question(question))?;
  }
  tx.commit()?;

  tracing::info!(spec_version = %version, changes = %plan, "updated survey");
  Ok(plan)
}

// ─── Responses ───────────────────────────────────────────────────────────────

fn load_response_row(
  conn: &rusqlite::Connection,
  username: &str,
  version: &SpecVersion,
) -> Result<Option<RawResponse>> {
  let sql = format!(
    "SELECT {RESPONSE_COLUMNS} FROM survey_responses
     WHERE username = ?1 AND spec_version = ?2"
  );
  Ok(
    conn
      .query_row(
        &sql,
        rusqlite::params![username, version.as_str()],
        RawResponse::from_row,
      )
      .optional()?,
  )
}

/// Load a response's answers and regroup them. Rows whose question is no
/// longer part of the survey, or whose shape no longer fits it, are skipped.
fn load_answers(
  conn: &rusqlite::Connection,
  survey: &Survey,
  response_id: &str,
) -> Result<AnswerMap> {
  let mut stmt = conn
    .prepare_cached("SELECT number, answer, evidence FROM answers WHERE response_id = ?1")?;
  let raws: Vec<RawAnswer> = stmt
    .query_map(rusqlite::params![response_id], RawAnswer::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut flat = Vec::with_capacity(raws.len());
  for raw in raws {
    let Some(question) = survey.question(&raw.number) else {
      tracing::warn!(
        response_id,
        number = %raw.number,
        "skipping answer to unknown question"
      );
      continue;
    };
    if !answer_shape_fits(question, raw.answer.as_deref()) {
      tracing::warn!(
        response_id,
        number = %raw.number,
        question_type = %question.question_type(),
        "skipping answer that does not fit its question"
      );
      continue;
    }
    let answer = decode_answer(question, raw.answer.as_deref(), raw.evidence)?;
    flat.push((raw.number, answer));
  }
  Ok(survey.assemble_answers(flat))
}

fn load_response(
  conn: &rusqlite::Connection,
  username: &str,
  version: &SpecVersion,
) -> Result<Option<SurveyResponse>> {
  let Some(survey) = load_survey(conn, version)? else {
    return Ok(None);
  };
  let Some(raw) = load_response_row(conn, username, &survey.spec_version)? else {
    return Ok(None);
  };
  let answers = load_answers(conn, &survey, &raw.response_id)?;
  Ok(Some(raw.into_response(Arc::new(survey), answers)?))
}

/// The id of the user's response, inserting an empty one if needed.
fn ensure_response(
  conn: &rusqlite::Connection,
  username: &str,
  version: &SpecVersion,
) -> Result<String> {
  if let Some(raw) = load_response_row(conn, username, version)? {
    return Ok(raw.response_id);
  }
  let response_id = encode_uuid(Uuid::new_v4());
  let now = encode_dt(Utc::now());
  conn.execute(
    "INSERT INTO survey_responses (response_id, username, spec_version, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?4)",
    rusqlite::params![response_id, username, version.as_str(), now],
  )?;
  tracing::info!(username, spec_version = %version, "created survey response");
  Ok(response_id)
}

fn touch_response(conn: &rusqlite::Connection, response_id: &str) -> Result<()> {
  conn.execute(
    "UPDATE survey_responses SET updated_at = ?2 WHERE response_id = ?1",
    rusqlite::params![response_id, encode_dt(Utc::now())],
  )?;
  Ok(())
}

fn write_status(conn: &rusqlite::Connection, response: &SurveyResponse) -> Result<()> {
  conn.execute(
    "UPDATE survey_responses
     SET submitted = ?2, approved = ?3, rejected = ?4, updated_at = ?5
     WHERE response_id = ?1",
    rusqlite::params![
      encode_uuid(response.id),
      response.submitted,
      response.approved,
      response.rejected,
      encode_dt(response.updated_at),
    ],
  )?;
  Ok(())
}

// ─── Answer reconciliation ───────────────────────────────────────────────────

/// Read the stored answers, build the desired map from them, reconcile and
/// apply the plan, all inside one immediate transaction.
fn reconcile_answers(
  conn: &mut rusqlite::Connection,
  username: &str,
  version: &SpecVersion,
  make_desired: impl FnOnce(&Survey, &AnswerMap) -> certify_core::Result<AnswerMap>,
) -> Result<ApplyReport> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let survey = require_survey(&tx, version)?;
  let version = &survey.spec_version;

  let stored = match load_response_row(&tx, username, version)? {
    Some(raw) => load_answers(&tx, &survey, &raw.response_id)?,
    None => AnswerMap::new(),
  };
  let desired = make_desired(&survey, &stored)?;
  survey.check_answer_kinds(&desired)?;
  let plan = reconcile(&desired, &stored, &survey.question_numbers())?;
  if plan.is_empty() {
    tracing::debug!(username, spec_version = %version, "answers unchanged");
    return Ok(ApplyReport::default());
  }

  let response_id = ensure_response(&tx, username, version)?;
  let mut report = ApplyReport {
    planned: plan.counts(),
    ..ApplyReport::default()
  };
  {
    // Rows skipped on load are still present, so an add overwrites them.
    let mut insert = tx.prepare_cached(
      "INSERT INTO answers (response_id, number, answer, evidence) VALUES (?1, ?2, ?3, ?4)
       ON CONFLICT (response_id, number)
       DO UPDATE SET answer = excluded.answer, evidence = excluded.evidence",
    )?;
    for (number, answer) in &plan.adds {
      let (value, evidence) = encode_answer(answer);
      report.applied.adds +=
        insert.execute(rusqlite::params![response_id, number, value, evidence])?;
    }

    let mut update = tx.prepare_cached(
      "UPDATE answers SET answer = ?3, evidence = ?4 WHERE response_id = ?1 AND number = ?2",
    )?;
    for (number, answer) in &plan.updates {
      let (value, evidence) = encode_answer(answer);
      report.applied.updates +=
        update.execute(rusqlite::params![response_id, number, value, evidence])?;
    }

    let mut delete =
      tx.prepare_cached("DELETE FROM answers WHERE response_id = ?1 AND number = ?2")?;
    for number in &plan.deletes {
      report.applied.deletes += delete.execute(rusqlite::params![response_id, number])?;
    }
  }
  touch_response(&tx, &response_id)?;
  tx.commit()?;

  log_drift(&report, username, version);
  tracing::debug!(
    username,
    spec_version = %version,
    adds = report.applied.adds,
    updates = report.applied.updates,
    deletes = report.applied.deletes,
    "reconciled answers"
  );
  Ok(report)
}

/// Row counts that differ from the plan are reported, not rejected.
fn log_drift(report: &ApplyReport, username: &str, version: &SpecVersion) {
  let (planned, applied) = (report.planned, report.applied);
  let classes = [
    ("add", planned.adds, applied.adds),
    ("update", planned.updates, applied.updates),
    ("delete", planned.deletes, applied.deletes),
  ];
  for (class, planned, applied) in classes {
    if planned != applied {
      tracing::warn!(
        username,
        spec_version = %version,
        class,
        planned,
        applied,
        "applied answer count differs from plan"
      );
    }
  }
}

fn reset_response(
  conn: &mut rusqlite::Connection,
  username: &str,
  version: &SpecVersion,
) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let survey = require_survey(&tx, version)?;
  let raw = load_response_row(&tx, username, &survey.spec_version)?.ok_or_else(|| {
    Error::ResponseNotFound {
      username:     username.to_owned(),
      spec_version: version.to_string(),
    }
  })?;

  let deleted = tx.execute(
    "DELETE FROM answers WHERE response_id = ?1",
    rusqlite::params![raw.response_id],
  )?;
  tx.execute(
    "UPDATE survey_responses
     SET submitted = 0, approved = 0, rejected = 0, updated_at = ?2
     WHERE response_id = ?1",
    rusqlite::params![raw.response_id, encode_dt(Utc::now())],
  )?;
  tx.commit()?;

  tracing::info!(username, spec_version = %survey.spec_version, deleted, "reset survey response");
  Ok(())
}

// ─── Status ──────────────────────────────────────────────────────────────────

fn change_status(
  conn: &mut rusqlite::Connection,
  username: &str,
  version: &SpecVersion,
  change: impl FnOnce(&mut SurveyResponse) -> certify_core::Result<()>,
) -> Result<SurveyResponse> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  require_survey(&tx, version)?;
  let mut response =
    load_response(&tx, username, version)?.ok_or_else(|| Error::ResponseNotFound {
      username:     username.to_owned(),
      spec_version: version.to_string(),
    })?;

  change(&mut response)?;
  response.updated_at = Utc::now();
  write_status(&tx, &response)?;
  tx.commit()?;

  tracing::info!(
    username,
    spec_version = %response.spec_version(),
    submitted = response.submitted,
    approved = response.approved,
    rejected = response.rejected,
    "changed response status"
  );
  Ok(response)
}

fn load_all_responses(conn: &rusqlite::Connection) -> Result<Vec<SurveyResponse>> {
  let mut stmt = conn.prepare(&format!("SELECT {RESPONSE_COLUMNS} FROM survey_responses"))?;
  let raws: Vec<RawResponse> = stmt
    .query_map([], RawResponse::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut surveys: HashMap<String, Arc<Survey>> = HashMap::new();
  let mut responses = Vec::with_capacity(raws.len());
  for raw in raws {
    let survey = match surveys.get(&raw.spec_version) {
      Some(survey) => survey.clone(),
      None => {
        let version = SpecVersion::new(raw.spec_version.as_str())?;
        let survey = load_survey(conn, &version)?
          .map(Arc::new)
          .ok_or_else(|| {
            Error::Corrupt(format!("response {} has no survey", raw.response_id))
          })?;
        surveys.insert(raw.spec_version.clone(), survey.clone());
        survey
      }
    };
    let answers = load_answers(conn, &survey, &raw.response_id)?;
    responses.push(raw.into_response(survey, answers)?);
  }

  responses.sort_by(|a, b| {
    a.username
      .cmp(&b.username)
      .then_with(|| a.spec_version().cmp(b.spec_version()))
  });
  Ok(responses)
}

// ─── SurveyStore impl ────────────────────────────────────────────────────────

impl SurveyStore for SqliteStore {
  type Error = Error;

  // ── Surveys ───────────────────────────────────────────────────────────────

  async fn add_survey(&self, survey: Survey) -> Result<()> {
    self.call(move |conn| insert_survey(conn, &survey)).await
  }

  async fn get_survey(&self, spec_version: Option<SpecVersion>) -> Result<Option<Arc<Survey>>> {
    self
      .call(move |conn| {
        let version = match spec_version {
          Some(version) => Some(version),
          None => load_versions(conn)?.pop(),
        };
        match version {
          Some(version) => Ok(load_survey(conn, &version)?.map(Arc::new)),
          None => Ok(None),
        }
      })
      .await
  }

  async fn latest_spec_version(&self) -> Result<Option<SpecVersion>> {
    self.call(|conn| Ok(load_versions(conn)?.pop())).await
  }

  async fn list_spec_versions(&self) -> Result<Vec<SpecVersion>> {
    self.call(|conn| load_versions(conn)).await
  }

  async fn update_survey(&self, survey: Survey) -> Result<SurveyUpdatePlan> {
    self.call(move |conn| apply_survey_update(conn, &survey)).await
  }

  // ── Responses ─────────────────────────────────────────────────────────────

  async fn get_response(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> Result<Option<SurveyResponse>> {
    self
      .call(move |conn| load_response(conn, &username, &spec_version))
      .await
  }

  async fn update_answers(
    &self,
    username: String,
    spec_version: SpecVersion,
    desired: AnswerMap,
  ) -> Result<ApplyReport> {
    self
      .call(move |conn| {
        reconcile_answers(conn, &username, &spec_version, |survey, _stored| {
          survey.check_answer_kinds(&desired)?;
          Ok(survey.assemble_answers(desired))
        })
      })
      .await
  }

  async fn record_answers(
    &self,
    username: String,
    spec_version: SpecVersion,
    inputs: Vec<ResponseAnswer>,
  ) -> Result<ApplyReport> {
    self
      .call(move |conn| {
        reconcile_answers(conn, &username, &spec_version, |survey, stored| {
          desired_answers(survey, stored, &inputs)
        })
      })
      .await
  }

  async fn reset_answers(&self, username: String, spec_version: SpecVersion) -> Result<()> {
    self
      .call(move |conn| reset_response(conn, &username, &spec_version))
      .await
  }

  // ── Status ────────────────────────────────────────────────────────────────

  async fn submit(&self, username: String, spec_version: SpecVersion) -> Result<SurveyResponse> {
    self
      .call(move |conn| change_status(conn, &username, &spec_version, SurveyResponse::submit))
      .await
  }

  async fn unsubmit(&self, username: String, spec_version: SpecVersion) -> Result<SurveyResponse> {
    self
      .call(move |conn| {
        change_status(conn, &username, &spec_version, |response| {
          response.unsubmit();
          Ok(())
        })
      })
      .await
  }

  async fn approve(&self, username: String, spec_version: SpecVersion) -> Result<SurveyResponse> {
    self
      .call(move |conn| {
        change_status(conn, &username, &spec_version, |response| {
          response.approve();
          Ok(())
        })
      })
      .await
  }

  async fn reject(&self, username: String, spec_version: SpecVersion) -> Result<SurveyResponse> {
    self
      .call(move |conn| {
        change_status(conn, &username, &spec_version, |response| {
          response.reject();
          Ok(())
        })
      })
      .await
  }

  // ── Reporting ─────────────────────────────────────────────────────────────

  async fn list_responses(&self) -> Result<Vec<SurveyResponse>> {
    self.call(|conn| load_all_responses(conn)).await
  }

  async fn submissions(&self) -> Result<Vec<Submission>> {
    let responses = self.list_responses().await?;
    Ok(
      responses
        .iter()
        .map(Submission::from_response)
        .collect::<certify_core::Result<Vec<_>>>()?,
    )
  }
}
