//! Specification versions.
//!
//! A [`SpecVersion`] names one revision of the questionnaire. It selects the
//! survey snapshot a response belongs to and the numbering scheme its question
//! labels are written in.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, number::NumberingScheme};

/// The first version whose question numbers use the alpha-roman scheme.
pub const ALPHA_ROMAN_SINCE: &str = "1.0.2";

/// An opaque, dot-separated version string such as `"1.0.2"`.
///
/// Ordering is segment-wise: numeric segments compare as integers, anything
/// else compares ASCII-case-insensitively, and a shorter prefix sorts first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SpecVersion(String);

impl SpecVersion {
  pub fn new(version: impl Into<String>) -> Result<Self> {
    let version = version.into();
    let trimmed = version.trim();
    if trimmed.is_empty() {
      return Err(Error::QuestionFormat("spec version must not be empty".into()));
    }
    Ok(Self(trimmed.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The question-number grammar used by this version.
  pub fn numbering_scheme(&self) -> NumberingScheme {
    if compare_segments(&self.0, ALPHA_ROMAN_SINCE) == Ordering::Less {
      NumberingScheme::Numeric
    } else {
      NumberingScheme::AlphaRoman
    }
  }

  /// Case-insensitive ordinal comparison of the raw strings.
  pub fn cmp_ordinal(&self, other: &Self) -> Ordering {
    cmp_ignore_case(&self.0, &other.0)
  }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
  a.bytes()
    .map(|c| c.to_ascii_lowercase())
    .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

fn compare_segments(a: &str, b: &str) -> Ordering {
  let mut left = a.split('.');
  let mut right = b.split('.');
  loop {
    let ord = match (left.next(), right.next()) {
      (None, None) => return Ordering::Equal,
      (None, Some(_)) => return Ordering::Less,
      (Some(_), None) => return Ordering::Greater,
      (Some(l), Some(r)) => match (l.parse::<u64>(), r.parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => cmp_ignore_case(l, r),
      },
    };
    if ord != Ordering::Equal {
      return ord;
    }
  }
}

impl PartialEq for SpecVersion {
  fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for SpecVersion {}

impl PartialOrd for SpecVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for SpecVersion {
  fn cmp(&self, other: &Self) -> Ordering { compare_segments(&self.0, &other.0) }
}

impl fmt::Display for SpecVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for SpecVersion {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::new(s) }
}

impl TryFrom<String> for SpecVersion {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { Self::new(value) }
}

impl From<SpecVersion> for String {
  fn from(value: SpecVersion) -> Self { value.0 }
}
