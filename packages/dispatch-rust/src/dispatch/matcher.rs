//! Representation-driven signature matching.
//!
//! Given the operands of a call, the matcher walks every combination of their
//! representations in preference order and returns the first registered
//! variant whose signature matches. Preference order is lexicographic by rank:
//! the first operand's choice varies slowest and the last operand's fastest,
//! exactly like nested loops over each operand's representation list.
//! Within one combination variants are tried in registration order.

use std::sync::Arc;

use opcall_core::{Representation, Value};

use super::operation::{OperationError, Variant};
use super::registry::VariantGroup;

/// Ordered representation lists of each operand.
#[must_use]
pub fn operand_representations(operands: &[Value]) -> Vec<Vec<Representation>> {
    operands.iter().map(Value::representations).collect()
}

/// Lazy walk over all representation combinations in dispatch order.
///
/// With no operands there is exactly one (empty) combination; if any operand
/// has no representations there are none. Combinations are produced one at
/// a time, so a caller that stops at the first hit never pays for the rest.
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    lists: &'a [Vec<Representation>],
    indices: Vec<usize>,
    exhausted: bool,
}

impl Iterator for Combinations<'_> {
    type Item = Vec<Representation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let combination = self
            .indices
            .iter()
            .zip(self.lists)
            .map(|(&i, list)| list[i].clone())
            .collect();

        // Odometer step: advance the last position, carrying leftwards.
        let mut pos = self.lists.len();
        loop {
            if pos == 0 {
                self.exhausted = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.lists[pos].len() {
                break;
            }
            self.indices[pos] = 0;
        }

        Some(combination)
    }
}

/// All representation combinations of `lists` in dispatch order.
#[must_use]
pub fn combinations(lists: &[Vec<Representation>]) -> Combinations<'_> {
    Combinations {
        lists,
        indices: vec![0; lists.len()],
        exhausted: lists.iter().any(Vec::is_empty),
    }
}

/// Picks the variant of `group` that handles `operands`.
///
/// `operands` must already be cut down to the group's operand count.
///
/// # Errors
///
/// Returns `NoMatchingSignature`, carrying each operand's representation
/// list, when no combination matches any variant.
pub fn resolve(
    name: &str,
    group: &VariantGroup,
    operands: &[Value],
) -> Result<Arc<Variant>, OperationError> {
    let representations = operand_representations(operands);

    for combination in combinations(&representations) {
        if let Some(variant) = group
            .variants()
            .iter()
            .find(|v| v.signature().matches(&combination))
        {
            tracing::trace!(
                operation = name,
                signature = %variant.signature(),
                "matched variant"
            );
            return Ok(Arc::clone(variant));
        }
    }

    Err(OperationError::NoMatchingSignature {
        name: name.to_string(),
        representations,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
