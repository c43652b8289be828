//! Question-number parsing and ordering.
//!
//! A question number is a dotted label of up to three levels. Two grammars
//! exist, selected by the spec version the question belongs to:
//!
//! - numeric (`1`, `2.1`, `2.1.11`): every level is a decimal integer;
//! - alpha-roman (`1`, `2.aa`, `2.aa.iv`): an integer, then a lowercase
//!   letter level read as bijective base 26 (`a` = 1, `z` = 26, `aa` = 27),
//!   then a lowercase roman numeral level.
//!
//! Ordering compares the decoded levels, with a missing level sorting before
//! a populated one (`2` < `2.a` < `2.a.i`).

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, version::SpecVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberingScheme {
  /// `N(.N)?(.N)?`, used before spec version 1.0.2.
  Numeric,
  /// `N(.a)?(.i)?`, used from spec version 1.0.2 on.
  AlphaRoman,
}

impl fmt::Display for NumberingScheme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Numeric => f.write_str("numeric"),
      Self::AlphaRoman => f.write_str("alpha-roman"),
    }
  }
}

/// A parsed question label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuestionNumber {
  label:  String,
  scheme: NumberingScheme,
  major:  u32,
  minor:  Option<u32>,
  sub:    Option<u32>,
}

impl QuestionNumber {
  /// Parse `label` under the grammar implied by `version`.
  pub fn parse(label: &str, version: &SpecVersion) -> Result<Self> {
    Self::parse_with(label, version.numbering_scheme())
  }

  pub fn parse_with(label: &str, scheme: NumberingScheme) -> Result<Self> {
    let label = label.trim();
    let invalid = || {
      Error::QuestionFormat(format!(
        "invalid question number {label:?} for {scheme} numbering"
      ))
    };

    let mut parts = label.split('.');
    let major = parts.next().and_then(decode_integer).ok_or_else(invalid)?;
    let minor = parts
      .next()
      .map(|part| {
        match scheme {
          NumberingScheme::Numeric => decode_integer(part),
          NumberingScheme::AlphaRoman => decode_alpha(part),
        }
        .ok_or_else(invalid)
      })
      .transpose()?;
    let sub = parts
      .next()
      .map(|part| {
        match scheme {
          NumberingScheme::Numeric => decode_integer(part),
          NumberingScheme::AlphaRoman => decode_roman(part),
        }
        .ok_or_else(invalid)
      })
      .transpose()?;
    if parts.next().is_some() {
      return Err(invalid());
    }

    Ok(Self {
      label: label.to_owned(),
      scheme,
      major,
      minor,
      sub,
    })
  }

  pub fn as_str(&self) -> &str { &self.label }

  pub fn scheme(&self) -> NumberingScheme { self.scheme }

  /// The decoded levels, outermost first.
  pub fn levels(&self) -> (u32, Option<u32>, Option<u32>) {
    (self.major, self.minor, self.sub)
  }

  /// How many levels the label spells out: 1 for `3`, 3 for `3.a.ii`.
  pub fn depth(&self) -> usize {
    1 + usize::from(self.minor.is_some()) + usize::from(self.sub.is_some())
  }

  /// Render the canonical spelling of the decoded levels.
  ///
  /// For a label that is already canonical this returns the label itself.
  pub fn render(&self) -> String {
    let mut out = self.major.to_string();
    if let Some(minor) = self.minor {
      out.push('.');
      match self.scheme {
        NumberingScheme::Numeric => out.push_str(&minor.to_string()),
        NumberingScheme::AlphaRoman => out.push_str(&encode_alpha(minor)),
      }
    }
    if let Some(sub) = self.sub {
      out.push('.');
      match self.scheme {
        NumberingScheme::Numeric => out.push_str(&sub.to_string()),
        NumberingScheme::AlphaRoman => out.push_str(&encode_roman(sub)),
      }
    }
    out
  }
}

impl PartialOrd for QuestionNumber {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for QuestionNumber {
  fn cmp(&self, other: &Self) -> Ordering {
    // `None < Some(_)` gives the missing-level-first rule.
    self
      .levels()
      .cmp(&other.levels())
      .then_with(|| self.label.cmp(&other.label))
      .then_with(|| (self.scheme as u8).cmp(&(other.scheme as u8)))
  }
}

impl fmt::Display for QuestionNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(&self.label)
  }
}

// ─── Level codecs ────────────────────────────────────────────────────────────

fn decode_integer(s: &str) -> Option<u32> {
  if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  s.parse().ok()
}

fn decode_alpha(s: &str) -> Option<u32> {
  if s.is_empty() {
    return None;
  }
  s.bytes().try_fold(0u32, |acc, b| {
    if !b.is_ascii_lowercase() {
      return None;
    }
    acc.checked_mul(26)?.checked_add(u32::from(b - b'a') + 1)
  })
}

fn roman_digit(b: u8) -> Option<u32> {
  match b {
    b'i' => Some(1),
    b'v' => Some(5),
    b'x' => Some(10),
    b'l' => Some(50),
    b'c' => Some(100),
    b'd' => Some(500),
    b'm' => Some(1000),
    _ => None,
  }
}

fn decode_roman(s: &str) -> Option<u32> {
  let digits = s.bytes().map(roman_digit).collect::<Option<Vec<_>>>()?;
  if digits.is_empty() {
    return None;
  }
  let mut total: i64 = 0;
  for (i, &value) in digits.iter().enumerate() {
    match digits.get(i + 1) {
      Some(&next) if next > value => total -= i64::from(value),
      _ => total += i64::from(value),
    }
  }
  u32::try_from(total).ok().filter(|&n| n > 0)
}

fn encode_alpha(mut n: u32) -> String {
  let mut out = Vec::new();
  while n > 0 {
    n -= 1;
    out.push(b'a' + (n % 26) as u8);
    n /= 26;
  }
  out.reverse();
  String::from_utf8_lossy(&out).into_owned()
}

fn encode_roman(mut n: u32) -> String {
  const TABLE: [(u32, &str); 13] = [
    (1000, "m"),
    (900, "cm"),
    (500, "d"),
    (400, "cd"),
    (100, "c"),
    (90, "xc"),
    (50, "l"),
    (40, "xl"),
    (10, "x"),
    (9, "ix"),
    (5, "v"),
    (4, "iv"),
    (1, "i"),
  ];
  let mut out = String::new();
  for (value, digits) in TABLE {
    while n >= value {
      out.push_str(digits);
      n -= value;
    }
  }
  out
}
