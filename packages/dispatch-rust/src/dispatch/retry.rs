//! Retry policy and the call/renegotiation controller.
//!
//! A call moves through these states:
//!
//! ```text
//! Initial -> Running -> Success
//!               |  ^
//!               v  |
//!             Retrying -> RetryDenied | RetryExhausted
//! ```
//!
//! `Initial` resolves the variant and notifies the observer. `Running`
//! invokes it. An [`Outcome::Retry`] moves to `Retrying`, which either fails
//! terminally or looks up the requested signature exactly and runs again.
//! Every retry within one top-level call draws from the same budget.

use std::sync::Arc;

use opcall_core::{Signature, Value};

use super::matcher;
use super::operation::{Arguments, OperationError, Outcome, Variant};
use crate::context::OperationContext;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Per-operation permission to renegotiate.
///
/// The deny list always wins. A non-empty allow list acts as a whitelist;
/// an empty one allows everything not denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(allow: Vec<String>, deny: Vec<String>) -> Self {
        Self { allow, deny }
    }

    /// Returns `true` if operation `name` may be retried.
    #[must_use]
    pub fn can_retry(&self, name: &str) -> bool {
        if self.deny.iter().any(|n| n == name) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|n| n == name)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Controller states that loop; terminal states return from [`call`].
enum State {
    Running(Arc<Variant>),
    Retrying {
        from: Arc<Variant>,
        signature: Signature,
        reason: String,
    },
}

/// Resolves and runs operation `name`, following renegotiation requests.
///
/// # Errors
///
/// - Lookup and matching errors from [`OperationContext::resolve`].
/// - `RetryDenied` if the policy forbids retrying `name`.
/// - `RetryExhausted` once more retries are requested than the budget allows.
/// - `ExactSignatureNotFound` if a requested signature is not registered.
/// - Any error returned by an implementation, unchanged.
pub(crate) fn call(
    ctx: &OperationContext,
    name: &str,
    args: &Arguments,
) -> Result<Value, OperationError> {
    let group = ctx.lookup(name)?;
    let operand_count = group.operand_count();
    let operands = args
        .positional
        .get(..operand_count)
        .ok_or_else(|| OperationError::MissingOperands {
            name: name.to_string(),
            expected: operand_count,
            found: args.positional.len(),
        })?;

    let variant = matcher::resolve(name, &group, operands)?;
    let observer = ctx.observer();
    if let Some(observer) = &observer {
        observer.will_call_operation(ctx, &variant);
    }

    let budget = ctx.retry_budget();
    let mut retries: u32 = 0;
    let mut state = State::Running(variant);

    loop {
        state = match state {
            State::Running(variant) => {
                if variant.is_experimental() {
                    tracing::warn!(
                        operation = name,
                        signature = %variant.signature(),
                        "operation is experimental"
                    );
                }
                match variant.invoke(ctx, args)? {
                    Outcome::Done(value) => {
                        if let Some(observer) = &observer {
                            observer.did_call_operation(ctx, &variant, retries);
                        }
                        return Ok(value);
                    }
                    Outcome::Retry { signature, reason } => State::Retrying {
                        from: variant,
                        signature,
                        reason,
                    },
                }
            }
            State::Retrying {
                from,
                signature,
                reason,
            } => {
                if !ctx.can_retry(name) {
                    return Err(OperationError::RetryDenied {
                        name: name.to_string(),
                    });
                }
                retries += 1;
                if retries > budget {
                    return Err(OperationError::RetryExhausted {
                        name: name.to_string(),
                        budget,
                    });
                }
                let next = ctx.registry().exact_get(name, &signature)?;
                tracing::trace!(
                    operation = name,
                    from = %from.signature(),
                    to = %signature,
                    retries,
                    "renegotiating"
                );
                if let Some(observer) = &observer {
                    observer.will_retry_operation(ctx, &next, &reason);
                }
                State::Running(next)
            }
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::dispatch::config::ContextConfig;
    use crate::observer::CollectingObserver;

    #[test]
    fn policy_allows_everything_by_default() {
        let policy = RetryPolicy::default();
        assert!(policy.can_retry("swim"));
    }

    #[test]
    fn policy_deny_and_allow() {
        let deny = RetryPolicy::new(vec![], vec!["swim".into()]);
        assert!(!deny.can_retry("swim"));
        assert!(deny.can_retry("run"));

        let allow = RetryPolicy::new(vec!["swim".into()], vec![]);
        assert!(allow.can_retry("swim"));
        assert!(!allow.can_retry("run"));

        let both = RetryPolicy::new(vec!["swim".into()], vec!["swim".into()]);
        assert!(!both.can_retry("swim"));
    }

    /// Context with a quiet config and the given retry budget.
    fn context(budget: u32) -> OperationContext {
        OperationContext::with_config(ContextConfig {
            retry_budget: budget,
            log_operations: false,
            ..ContextConfig::default()
        })
    }

    /// Registers "chain" variants `s0..=s{len}`: each `s{i}` asks for
    /// `s{i+1}` except the last, which succeeds with `i`.
    fn register_chain(ctx: &OperationContext, len: u32) {
        for i in 0..=len {
            let sig = Signature::new([format!("s{i}")]);
            let variant = Variant::new("chain", sig, move |_ctx, _args| {
                if i == len {
                    Ok(Outcome::Done(Value::Int(i64::from(i))))
                } else {
                    Ok(Outcome::retry(Signature::new([format!("s{}", i + 1)]), format!("hop {i}")))
                }
            });
            ctx.register(variant).unwrap();
        }
    }

    /// Operand presenting as `s0`.
    fn start() -> Value {
        Value::object(crate::testing::Rep::new(&["s0"]))
    }

    #[test]
    fn chained_retries_share_one_budget() {
        let ctx = context(3);
        register_chain(&ctx, 3);
        assert_eq!(ctx.call("chain", vec![start()]).unwrap(), Value::Int(3));

        let ctx = context(3);
        register_chain(&ctx, 4);
        let err = ctx.call("chain", vec![start()]).unwrap_err();
        assert!(matches!(err, OperationError::RetryExhausted { budget: 3, .. }));
    }

    #[test]
    fn zero_budget_rejects_first_retry() {
        let ctx = context(0);
        register_chain(&ctx, 1);
        let err = ctx.call("chain", vec![start()]).unwrap_err();
        assert!(matches!(err, OperationError::RetryExhausted { budget: 0, .. }));
    }

    #[test]
    fn denied_retry_fails_before_budget_is_touched() {
        let ctx = context(10);
        register_chain(&ctx, 1);
        ctx.update_retry_policy(|p| p.deny.push("chain".into()));
        let err = ctx.call("chain", vec![start()]).unwrap_err();
        assert!(matches!(err, OperationError::RetryDenied { ref name } if name == "chain"));
    }

    #[test]
    fn retry_to_unknown_signature_fails() {
        let ctx = context(10);
        ctx.register(Variant::new("fail", ["s0"], |_ctx, _args| {
            Ok(Outcome::retry(["sql"], "wrong backend"))
        }))
        .unwrap();
        let err = ctx.call("fail", vec![start()]).unwrap_err();
        assert!(matches!(err, OperationError::ExactSignatureNotFound { .. }));
    }

    #[test]
    fn retry_to_same_signature_exhausts_budget() {
        let ctx = context(10);
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        ctx.register(Variant::new("repeat", ["s0"], move |_ctx, _args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::retry(["s0"], "again"))
        }))
        .unwrap();

        let err = ctx.call("repeat", vec![start()]).unwrap_err();
        assert!(matches!(err, OperationError::RetryExhausted { budget: 10, .. }));
        // The first attempt plus one per honored retry.
        assert_eq!(attempts.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn implementation_errors_propagate_unchanged() {
        let ctx = context(10);
        let observer = Arc::new(CollectingObserver::new());
        ctx.set_observer(observer.clone());
        ctx.register(Variant::new("boom", ["s0"], |_ctx, _args| {
            Err(anyhow::anyhow!("backend down").into())
        }))
        .unwrap();

        let err = ctx.call("boom", vec![start()]).unwrap_err();
        assert_eq!(err.to_string(), "internal error: backend down");
        assert!(observer.history().is_empty());
    }

    #[test]
    fn missing_operands_are_reported() {
        let ctx = context(10);
        ctx.register(Variant::new("join", ["*", "*"], |_ctx, _args| {
            Ok(Outcome::Done(Value::Null))
        }))
        .unwrap();
        let err = ctx.call("join", vec![start()]).unwrap_err();
        assert!(matches!(
            err,
            OperationError::MissingOperands { expected: 2, found: 1, .. }
        ));
    }

    #[test]
    fn experimental_variant_still_runs() {
        let ctx = context(10);
        ctx.register(
            Variant::new("probe", ["s0"], |_ctx, _args| Ok(Outcome::Done(Value::Bool(true))))
                .experimental(),
        )
        .unwrap();
        assert_eq!(ctx.call("probe", vec![start()]).unwrap(), Value::Bool(true));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Exactly `budget` retries succeed with `retries == budget`;
        /// one more exhausts the budget.
        #[test]
        fn budget_is_enforced_exactly(budget in 0u32..8) {
            let ctx = context(budget);
            let observer = Arc::new(CollectingObserver::new());
            ctx.set_observer(observer.clone());
            register_chain(&ctx, budget);
            let value = ctx.call("chain", vec![start()]).unwrap();
            prop_assert_eq!(value, Value::Int(i64::from(budget)));
            let history = observer.history();
            prop_assert_eq!(history.len(), 1);
            prop_assert_eq!(history[0].retries, budget);
            prop_assert_eq!(history[0].tried.len(), budget as usize);

            let ctx = context(budget);
            register_chain(&ctx, budget + 1);
            let exhausted = matches!(
                ctx.call("chain", vec![start()]),
                Err(OperationError::RetryExhausted { .. })
            );
            prop_assert!(exhausted);
        }

        /// A denied name fails on the first signal whatever the budget.
        #[test]
        fn deny_blocks_first_signal(budget in 0u32..8) {
            let ctx = context(budget);
            register_chain(&ctx, 1);
            ctx.set_retry_policy(RetryPolicy::new(vec!["chain".into()], vec!["chain".into()]));
            let denied = matches!(
                ctx.call("chain", vec![start()]),
                Err(OperationError::RetryDenied { .. })
            );
            prop_assert!(denied);
        }
    }
}
