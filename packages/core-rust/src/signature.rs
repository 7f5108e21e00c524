//! Operation signatures.
//!
//! A [`Signature`] is the ordered list of operand requirements one variant of
//! an operation accepts. Two signatures are equal iff their requirement
//! sequences are equal; whether a signature *matches* a set of argument
//! representations is a separate, looser test (see [`Signature::matches`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::representation::{Representation, Requirement};

/// Ordered per-operand requirements of an operation variant.
///
/// ```
/// use opcall_core::{Representation, Signature};
///
/// let sig = Signature::new(["sql", "*"]);
/// assert_eq!(sig.operand_count(), 2);
/// assert!(sig.matches(&[Representation::new("sql"), Representation::new("rows")]));
/// assert!(!sig.matches(&[Representation::new("rows"), Representation::new("rows")]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature {
    requirements: Vec<Requirement>,
}

impl Signature {
    /// Builds a signature from anything convertible into requirements,
    /// typically string slices such as `["sql", "rows[]"]`.
    #[must_use]
    pub fn new<I, R>(requirements: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Requirement>,
    {
        Self {
            requirements: requirements.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of leading call arguments that take part in dispatch.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.requirements.len()
    }

    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Returns `true` if every positional representation satisfies the
    /// requirement at the same position. Length must match exactly.
    #[must_use]
    pub fn matches(&self, representations: &[Representation]) -> bool {
        self.requirements.len() == representations.len()
            && self
                .requirements
                .iter()
                .zip(representations)
                .all(|(req, rep)| req.accepts(rep))
    }

    /// The all-wildcard signature of the same shape: every single operand
    /// becomes `*` and every list operand `*[]`.
    #[must_use]
    pub fn as_prototype(&self) -> Self {
        Self {
            requirements: self.requirements.iter().map(Requirement::as_wildcard).collect(),
        }
    }
}

impl From<Vec<Requirement>> for Signature {
    fn from(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }
}

impl<const N: usize> From<[&str; N]> for Signature {
    fn from(requirements: [&str; N]) -> Self {
        Self::new(requirements)
    }
}

impl From<&[Representation]> for Signature {
    fn from(representations: &[Representation]) -> Self {
        Self::new(representations.iter().cloned())
    }
}

/// Signatures compare equal to their string form, element by element.
impl PartialEq<[&str]> for Signature {
    fn eq(&self, other: &[&str]) -> bool {
        self.requirements.len() == other.len()
            && self
                .requirements
                .iter()
                .zip(other)
                .all(|(req, s)| *req == Requirement::parse(s))
    }
}

impl<const N: usize> PartialEq<[&str; N]> for Signature {
    fn eq(&self, other: &[&str; N]) -> bool {
        *self == other[..]
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, req) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{req}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn reps(items: &[&str]) -> Vec<Representation> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn single_operand_matching() {
        assert!(Signature::new(["sql"]).matches(&reps(&["sql"])));
        assert!(Signature::new(["*"]).matches(&reps(&["sql"])));
        assert!(Signature::new(["sql[]"]).matches(&reps(&["sql[]"])));
        assert!(Signature::new(["*[]"]).matches(&reps(&["sql[]"])));

        assert!(!Signature::new(["sql"]).matches(&reps(&["rows"])));
        assert!(!Signature::new(["sql"]).matches(&reps(&["sql[]"])));
    }

    #[test]
    fn length_mismatch_never_matches() {
        let sig = Signature::new(["*", "*"]);
        assert!(!sig.matches(&reps(&["sql"])));
        assert!(!sig.matches(&reps(&["sql", "sql", "sql"])));
        assert!(Signature::default().matches(&[]));
    }

    #[test]
    fn equality_is_structural() {
        let a = Signature::new(["a", "b", "c"]);
        let b = Signature::new(["a", "b", "c"]);
        let c = Signature::new(["a", "b"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a == ["a", "b", "c"]);
        assert!(a != ["a", "b"]);
        // A wildcard signature is not equal to a concrete one it matches.
        assert_ne!(Signature::new(["*"]), Signature::new(["sql"]));
    }

    #[test]
    fn prototype_preserves_shape() {
        assert_eq!(
            Signature::new(["sql", "sql"]).as_prototype(),
            Signature::new(["*", "*"])
        );
        assert_eq!(
            Signature::new(["sql[]", "sql"]).as_prototype(),
            Signature::new(["*[]", "*"])
        );
        assert_eq!(
            Signature::new(["*[]", "*"]).as_prototype(),
            Signature::new(["*[]", "*"])
        );
    }

    #[test]
    fn display_joins_requirements() {
        assert_eq!(Signature::new(["sql", "rows[]", "*"]).to_string(), "sql, rows[], *");
        assert_eq!(Signature::default().to_string(), "");
    }

    #[test]
    fn serializes_as_plain_list() {
        let json = serde_json::to_value(Signature::new(["sql", "*[]"])).unwrap();
        assert_eq!(json, serde_json::json!(["sql", "*[]"]));

        let back: Signature = serde_json::from_value(json).unwrap();
        assert_eq!(back, Signature::new(["sql", "*[]"]));
    }

    proptest! {
        /// A signature built from concrete representations always matches them,
        /// and so does its prototype.
        #[test]
        fn signature_from_representations_matches_them(
            names in proptest::collection::vec("[a-z]{1,6}", 0..5),
            lists in proptest::collection::vec(any::<bool>(), 5),
        ) {
            let reps: Vec<Representation> = names
                .iter()
                .zip(&lists)
                .map(|(n, &l)| {
                    if l {
                        Representation::list(n.clone())
                    } else {
                        Representation::new(n.clone())
                    }
                })
                .collect();
            let sig = Signature::from(reps.as_slice());
            prop_assert!(sig.matches(&reps));
            prop_assert!(sig.as_prototype().matches(&reps));
            prop_assert_eq!(sig.operand_count(), reps.len());
        }
    }
}
