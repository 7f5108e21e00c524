//! Representation tags and per-operand requirements.
//!
//! A [`Representation`] names the concrete runtime form an argument can
//! present itself as (`"sql"`, `"rows"`, …). A list operand is written with a
//! `[]` suffix (`"rows[]"`). A [`Requirement`] is what a signature asks of
//! one operand position; `"*"` and `"*[]"` are the wildcard forms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Suffix marking a list representation or list requirement.
const LIST_SUFFIX: &str = "[]";

/// Wildcard name accepted by [`Requirement::Any`] and [`Requirement::AnyList`].
pub const ANY: &str = "*";

/// Errors from parsing representation or requirement strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRepresentationError {
    #[error("representation name is empty")]
    Empty,
    #[error("'{0}' is a wildcard and cannot name a concrete representation")]
    Wildcard(String),
}

// ---------------------------------------------------------------------------
// Representation
// ---------------------------------------------------------------------------

/// A concrete representation an argument can present as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Representation {
    name: String,
    list: bool,
}

impl Representation {
    /// A single-object representation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list: false,
        }
    }

    /// A representation of a list of objects sharing `name`.
    #[must_use]
    pub fn list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list: true,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        self.list
    }

    /// Returns the list form of this representation.
    #[must_use]
    pub fn into_list(self) -> Self {
        Self {
            name: self.name,
            list: true,
        }
    }
}

impl FromStr for Representation {
    type Err = ParseRepresentationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, list) = split_list_suffix(s);
        if name.is_empty() {
            return Err(ParseRepresentationError::Empty);
        }
        if name == ANY {
            return Err(ParseRepresentationError::Wildcard(s.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            list,
        })
    }
}

impl TryFrom<String> for Representation {
    type Error = ParseRepresentationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Representation> for String {
    fn from(rep: Representation) -> Self {
        rep.to_string()
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "{}{LIST_SUFFIX}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

/// What a signature requires of a single operand position.
///
/// Singles never accept lists and lists never accept singles; the wildcard
/// forms only relax the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Requirement {
    /// Exactly this single representation (`"sql"`).
    Rep(String),
    /// Any single representation (`"*"`).
    Any,
    /// A list of this representation (`"sql[]"`).
    ListOf(String),
    /// A list of any representation (`"*[]"`).
    AnyList,
}

impl Requirement {
    /// Parses the string form. Never fails: an empty name is kept verbatim
    /// and simply never matches anything.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match split_list_suffix(s) {
            (ANY, false) => Self::Any,
            (ANY, true) => Self::AnyList,
            (name, false) => Self::Rep(name.to_string()),
            (name, true) => Self::ListOf(name.to_string()),
        }
    }

    /// Returns `true` if `rep` satisfies this requirement.
    #[must_use]
    pub fn accepts(&self, rep: &Representation) -> bool {
        match self {
            Self::Rep(name) => !rep.list && rep.name == *name,
            Self::Any => !rep.list,
            Self::ListOf(name) => rep.list && rep.name == *name,
            Self::AnyList => rep.list,
        }
    }

    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self, Self::ListOf(_) | Self::AnyList)
    }

    /// The wildcard requirement of the same shape.
    #[must_use]
    pub fn as_wildcard(&self) -> Self {
        if self.is_list() {
            Self::AnyList
        } else {
            Self::Any
        }
    }
}

impl From<&str> for Requirement {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Requirement {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Representation> for Requirement {
    fn from(rep: Representation) -> Self {
        if rep.list {
            Self::ListOf(rep.name)
        } else {
            Self::Rep(rep.name)
        }
    }
}

impl From<Requirement> for String {
    fn from(req: Requirement) -> Self {
        req.to_string()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rep(name) => f.write_str(name),
            Self::Any => f.write_str(ANY),
            Self::ListOf(name) => write!(f, "{name}{LIST_SUFFIX}"),
            Self::AnyList => write!(f, "{ANY}{LIST_SUFFIX}"),
        }
    }
}

fn split_list_suffix(s: &str) -> (&str, bool) {
    match s.strip_suffix(LIST_SUFFIX) {
        Some(name) => (name, true),
        None => (s, false),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
