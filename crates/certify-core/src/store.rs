//! The `SurveyStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `certify-store-sqlite`).
//! Backends own the transactional boundary: each answer update reads the
//! stored answers, runs [`reconcile`](crate::reconcile::reconcile) and applies
//! the resulting plan as one atomic unit.

use std::{future::Future, sync::Arc};

use crate::{
  answer::AnswerMap,
  reconcile::ApplyReport,
  response::{ResponseAnswer, Submission, SurveyResponse},
  survey::Survey,
  update::SurveyUpdatePlan,
  version::SpecVersion,
};

/// Abstraction over a survey and response store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait SurveyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Surveys ───────────────────────────────────────────────────────────

  /// Persist a new spec version. Fails if the version already exists.
  fn add_survey(
    &self,
    survey: Survey,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Load the survey for `spec_version`, or for the latest version when
  /// `None`. Returns `None` if there is no such survey.
  fn get_survey(
    &self,
    spec_version: Option<SpecVersion>,
  ) -> impl Future<Output = Result<Option<Arc<Survey>>, Self::Error>> + Send + '_;

  fn latest_spec_version(
    &self,
  ) -> impl Future<Output = Result<Option<SpecVersion>, Self::Error>> + Send + '_;

  /// All stored spec versions, oldest first.
  fn list_spec_versions(
    &self,
  ) -> impl Future<Output = Result<Vec<SpecVersion>, Self::Error>> + Send + '_;

  /// Apply a revised definition of an existing spec version.
  ///
  /// Questions may be added or reworded and sections retitled; removing a
  /// question is an error. Returns the applied plan.
  fn update_survey(
    &self,
    survey: Survey,
  ) -> impl Future<Output = Result<SurveyUpdatePlan, Self::Error>> + Send + '_;

  // ── Responses ─────────────────────────────────────────────────────────

  /// Returns `None` if `username` has not answered anything for the version.
  fn get_response(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> impl Future<Output = Result<Option<SurveyResponse>, Self::Error>> + Send + '_;

  /// Replace the stored answers with `desired`, creating the response on
  /// first use. Answers absent from `desired` are deleted.
  fn update_answers(
    &self,
    username: String,
    spec_version: SpecVersion,
    desired: AnswerMap,
  ) -> impl Future<Output = Result<ApplyReport, Self::Error>> + Send + '_;

  /// Overlay responder input on the stored answers. Existing answers not
  /// mentioned in `inputs` are kept.
  fn record_answers(
    &self,
    username: String,
    spec_version: SpecVersion,
    inputs: Vec<ResponseAnswer>,
  ) -> impl Future<Output = Result<ApplyReport, Self::Error>> + Send + '_;

  /// Delete every answer and clear the status flags.
  fn reset_answers(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Status ────────────────────────────────────────────────────────────

  /// Final submission; fails unless every top-level answer validates.
  fn submit(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> impl Future<Output = Result<SurveyResponse, Self::Error>> + Send + '_;

  fn unsubmit(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> impl Future<Output = Result<SurveyResponse, Self::Error>> + Send + '_;

  fn approve(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> impl Future<Output = Result<SurveyResponse, Self::Error>> + Send + '_;

  fn reject(
    &self,
    username: String,
    spec_version: SpecVersion,
  ) -> impl Future<Output = Result<SurveyResponse, Self::Error>> + Send + '_;

  // ── Reporting ─────────────────────────────────────────────────────────

  /// Every response, ordered by username then spec version.
  fn list_responses(
    &self,
  ) -> impl Future<Output = Result<Vec<SurveyResponse>, Self::Error>> + Send + '_;

  /// Submission projections, ordered by username.
  fn submissions(
    &self,
  ) -> impl Future<Output = Result<Vec<Submission>, Self::Error>> + Send + '_;
}
