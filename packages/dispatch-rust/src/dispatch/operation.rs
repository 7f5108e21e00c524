//! Operation variants, call arguments and the dispatch error taxonomy.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use opcall_core::{Representation, Signature, Value};

use crate::context::OperationContext;

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Arguments of a single operation call.
///
/// Only the leading `operand_count` positional values take part in dispatch;
/// the remaining positionals and all named values are handed to the chosen
/// implementation untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: BTreeMap<String, Value>,
}

impl Arguments {
    #[must_use]
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: BTreeMap::new(),
        }
    }

    /// Adds a named argument.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Positional argument at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    /// Named argument `name`.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(positional: Vec<Value>) -> Self {
        Self::new(positional)
    }
}

impl<const N: usize> From<[Value; N]> for Arguments {
    fn from(positional: [Value; N]) -> Self {
        Self::new(positional.into())
    }
}

impl From<Value> for Arguments {
    fn from(value: Value) -> Self {
        Self::new(vec![value])
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of one implementation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The attempt succeeded with a value.
    Done(Value),
    /// The implementation cannot proceed with what it was given and asks
    /// for the variant registered under `signature` to be tried instead.
    Retry { signature: Signature, reason: String },
}

impl Outcome {
    /// Shorthand for a renegotiation request.
    #[must_use]
    pub fn retry(signature: impl Into<Signature>, reason: impl Into<String>) -> Self {
        Self::Retry {
            signature: signature.into(),
            reason: reason.into(),
        }
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Self::Done(value)
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// Type-erased operation implementation.
///
/// Receives the calling context, so implementations can call other
/// operations, and all original call arguments.
pub type Implementation =
    Arc<dyn Fn(&OperationContext, &Arguments) -> Result<Outcome, OperationError> + Send + Sync>;

/// One concrete implementation of a named operation for one signature.
#[derive(Clone)]
pub struct Variant {
    name: String,
    signature: Signature,
    implementation: Implementation,
    experimental: bool,
    label: String,
}

impl Variant {
    /// Creates a variant. The implementation's type name becomes its label.
    #[must_use]
    pub fn new<F>(
        name: impl Into<String>,
        signature: impl Into<Signature>,
        implementation: F,
    ) -> Self
    where
        F: Fn(&OperationContext, &Arguments) -> Result<Outcome, OperationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            signature: signature.into(),
            label: std::any::type_name::<F>().to_string(),
            implementation: Arc::new(implementation),
            experimental: false,
        }
    }

    /// Marks the variant as experimental; a warning is logged on every use.
    #[must_use]
    pub fn experimental(mut self) -> Self {
        self.experimental = true;
        self
    }

    /// Overrides the implementation identity shown in logs and the catalogue.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    #[must_use]
    pub fn is_experimental(&self) -> bool {
        self.experimental
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs the implementation once.
    ///
    /// # Errors
    ///
    /// Returns whatever error the implementation returns.
    pub fn invoke(
        &self,
        ctx: &OperationContext,
        args: &Arguments,
    ) -> Result<Outcome, OperationError> {
        (self.implementation)(ctx, args)
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("experimental", &self.experimental)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.signature)
    }
}

/// A statically enumerable source of variants, such as a backend module.
pub trait OperationProvider {
    /// Variants to register, in registration order.
    fn operations(&self) -> Vec<Variant>;
}

impl OperationProvider for Vec<Variant> {
    fn operations(&self) -> Vec<Variant> {
        self.clone()
    }
}

// ---------------------------------------------------------------------------
// OperationError
// ---------------------------------------------------------------------------

/// Errors returned by registration, dispatch and implementations.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("operation '{name}' with signature ({signature}) already registered")]
    DuplicateSignature { name: String, signature: Signature },
    #[error("operation '{name}' takes {expected} operand(s), variant ({signature}) has {found}")]
    OperandCountMismatch {
        name: String,
        signature: Signature,
        expected: usize,
        found: usize,
    },
    #[error("operation '{name}' not found")]
    OperationNotFound { name: String },
    #[error(
        "no matching signature found for operation '{name}' (args: {})",
        format_representations(.representations)
    )]
    NoMatchingSignature {
        name: String,
        representations: Vec<Vec<Representation>>,
    },
    #[error("operation '{name}' needs {expected} operand(s), got {found}")]
    MissingOperands {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("no operation '{name}' with signature ({signature})")]
    ExactSignatureNotFound { name: String, signature: Signature },
    #[error("retry of operation '{name}' is not allowed")]
    RetryDenied { name: String },
    #[error("operation '{name}' retry limit reached (allowed: {budget})")]
    RetryExhausted { name: String, budget: u32 },
    #[error("unable to load operations for '{name}': {reason}")]
    ProviderLoad { name: String, reason: String },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn format_representations(representations: &[Vec<Representation>]) -> String {
    let args: Vec<String> = representations
        .iter()
        .map(|reps| {
            let names: Vec<String> = reps.iter().map(ToString::to_string).collect();
            format!("[{}]", names.join(", "))
        })
        .collect();
    args.join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_ctx: &OperationContext, _args: &Arguments) -> Result<Outcome, OperationError> {
        Ok(Outcome::Done(Value::Null))
    }

    #[test]
    fn variant_label_defaults_to_function_name() {
        let variant = Variant::new("touch", ["*"], noop);
        assert!(variant.label().ends_with("noop"), "label: {}", variant.label());
        assert!(!variant.is_experimental());
        assert_eq!(variant.to_string(), "touch(*)");
    }

    #[test]
    fn variant_builders() {
        let variant = Variant::new("touch", ["sql"], noop)
            .experimental()
            .with_label("sql::touch");
        assert!(variant.is_experimental());
        assert_eq!(variant.label(), "sql::touch");
        assert_eq!(variant.signature(), &Signature::new(["sql"]));
    }

    #[test]
    fn arguments_keep_positional_and_named() {
        let args = Arguments::new(vec![Value::Int(1), Value::from("x")]).with("limit", 10);
        assert_eq!(args.get(0), Some(&Value::Int(1)));
        assert_eq!(args.get(2), None);
        assert_eq!(args.named("limit"), Some(&Value::Int(10)));
        assert_eq!(args.named("offset"), None);
    }

    #[test]
    fn outcome_retry_shorthand() {
        let outcome = Outcome::retry(["raw"], "cache miss");
        assert_eq!(
            outcome,
            Outcome::Retry {
                signature: Signature::new(["raw"]),
                reason: "cache miss".to_string(),
            }
        );
    }

    #[test]
    fn no_matching_signature_lists_argument_representations() {
        let err = OperationError::NoMatchingSignature {
            name: "join".to_string(),
            representations: vec![
                vec![Representation::new("sql"), Representation::new("rows")],
                vec![Representation::list("rows")],
            ],
        };
        assert_eq!(
            err.to_string(),
            "no matching signature found for operation 'join' (args: [sql, rows], [rows[]])"
        );
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: OperationError = anyhow::anyhow!("backend gone").into();
        assert_eq!(err.to_string(), "internal error: backend gone");
    }
}
