//! Categorical labels with an explicit unknown marker

use serde::{Deserialize, Serialize};

/// A categorical label, possibly unknown
///
/// `Unknown` never compares equal to anything, not even another `Unknown`:
/// two unlabeled points carry no evidence that they belong together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Label<L> {
    Known(L),
    Unknown,
}

/// Outcome of comparing two labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    Same,
    Different,
    Unknown,
}

impl<L> Label<L> {
    #[inline]
    pub fn is_known(&self) -> bool {
        matches!(self, Label::Known(_))
    }

    #[inline]
    pub fn as_known(&self) -> Option<&L> {
        match self {
            Label::Known(l) => Some(l),
            Label::Unknown => None,
        }
    }
}

impl<L: PartialEq> Label<L> {
    /// Compare two labels; any unknown side makes the result unknown
    #[inline]
    pub fn agreement(&self, other: &Self) -> Agreement {
        match (self.as_known(), other.as_known()) {
            (Some(a), Some(b)) if a == b => Agreement::Same,
            (Some(_), Some(_)) => Agreement::Different,
            _ => Agreement::Unknown,
        }
    }
}

impl<L: PartialEq> PartialEq for Label<L> {
    fn eq(&self, other: &Self) -> bool {
        self.agreement(other) == Agreement::Same
    }
}

impl<L> From<Option<L>> for Label<L> {
    fn from(value: Option<L>) -> Self {
        value.map_or(Label::Unknown, Label::Known)
    }
}
