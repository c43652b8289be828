//! Core types and trait definitions for the certification survey engine.
//!
//! Holds the versioned questionnaire model, answer validation, the
//! reconciliation engine and the scoring rules. Nothing here touches a
//! database; storage backends implement [`store::SurveyStore`].

pub mod answer;
pub mod error;
pub mod import;
pub mod number;
pub mod question;
pub mod reconcile;
pub mod response;
pub mod store;
pub mod survey;
pub mod update;
pub mod version;

pub use error::{Error, Result};
