//! Range expressions such as `<=2.19.0`.
//!
//! Supported operators are `<`, `<=` and `==`. Anything else is an
//! [`UnsupportedRangeError`], never a silent non-match.

use super::{compare, Version};
use crate::error::UnsupportedRangeError;
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RangeOperator {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
}

/// Operator prefixes in detection order. Two-character operators must come
/// before any operator that is one of their prefixes.
const OPERATORS: &[(&str, RangeOperator)] = &[
    ("<=", RangeOperator::LessOrEqual),
    ("==", RangeOperator::Equal),
    ("<", RangeOperator::LessThan),
];

impl RangeOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            RangeOperator::LessThan => "<",
            RangeOperator::LessOrEqual => "<=",
            RangeOperator::Equal => "==",
        }
    }

    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            RangeOperator::LessThan => ord == Ordering::Less,
            RangeOperator::LessOrEqual => ord != Ordering::Greater,
            RangeOperator::Equal => ord == Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeExpression {
    pub operator: RangeOperator,
    pub bound: Version,
    text: String,
}

impl RangeExpression {
    /// The expression as it was written.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.operator.accepts(compare(version, &self.bound))
    }
}

impl std::fmt::Display for RangeExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl std::str::FromStr for RangeExpression {
    type Err = UnsupportedRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_range(s)
    }
}

pub fn parse_range(expr: &str) -> Result<RangeExpression, UnsupportedRangeError> {
    let text = expr.trim();

    OPERATORS
        .iter()
        .find_map(|(prefix, op)| {
            text.strip_prefix(prefix).map(|bound| RangeExpression {
                operator: *op,
                bound: Version::parse(bound),
                text: text.to_string(),
            })
        })
        .ok_or_else(|| UnsupportedRangeError {
            expression: expr.to_string(),
        })
}

/// Parses `expr` and tests `version` against it.
pub fn matches(version: &Version, expr: &str) -> Result<bool, UnsupportedRangeError> {
    Ok(parse_range(expr)?.contains(version))
}
