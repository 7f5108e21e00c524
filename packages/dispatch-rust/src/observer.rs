//! Call observers.
//!
//! Defines [`OperationObserver`], notified when a call starts, on every
//! renegotiation and on successful completion, plus two stock
//! implementations: [`LoggingObserver`] writes `tracing` events and
//! [`CollectingObserver`] keeps a history for assertions.
//!
//! Failed calls are reported only through the returned error; observers
//! see nothing on those paths.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::OperationContext;
use crate::dispatch::operation::Variant;

/// Observer of operation calls on an [`OperationContext`].
///
/// Used as `Arc<dyn OperationObserver>`; a context holds at most one.
pub trait OperationObserver: Send + Sync {
    /// Called once per call, after the initial variant was resolved.
    fn will_call_operation(&self, ctx: &OperationContext, variant: &Arc<Variant>);

    /// Called before `variant` runs in response to a renegotiation request.
    fn will_retry_operation(&self, ctx: &OperationContext, variant: &Arc<Variant>, reason: &str);

    /// Called after `variant` completed successfully, `retries` renegotiations
    /// into the call.
    fn did_call_operation(&self, ctx: &OperationContext, variant: &Arc<Variant>, retries: u32);
}

// ---------------------------------------------------------------------------
// LoggingObserver
// ---------------------------------------------------------------------------

/// Emits `info` events for calls and retries and `debug` events on completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl LoggingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OperationObserver for LoggingObserver {
    fn will_call_operation(&self, _ctx: &OperationContext, variant: &Arc<Variant>) {
        tracing::info!(
            operation = variant.name(),
            signature = %variant.signature(),
            implementation = variant.label(),
            "calling operation"
        );
    }

    fn will_retry_operation(&self, _ctx: &OperationContext, variant: &Arc<Variant>, reason: &str) {
        tracing::info!(
            operation = variant.name(),
            signature = %variant.signature(),
            reason,
            "retrying operation"
        );
    }

    fn did_call_operation(&self, _ctx: &OperationContext, variant: &Arc<Variant>, retries: u32) {
        if retries == 0 {
            tracing::debug!(
                operation = variant.name(),
                signature = %variant.signature(),
                "called operation"
            );
        } else {
            tracing::debug!(
                operation = variant.name(),
                signature = %variant.signature(),
                retries,
                "called operation after retries"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// CollectingObserver
// ---------------------------------------------------------------------------

/// One successfully completed call as seen by a [`CollectingObserver`].
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// The variant that produced the result.
    pub variant: Arc<Variant>,
    /// Number of renegotiations before success.
    pub retries: u32,
    /// Every variant that asked for a retry, with its reason, in order.
    pub tried: Vec<(Arc<Variant>, String)>,
}

#[derive(Debug, Default)]
struct Collected {
    current: Option<Arc<Variant>>,
    tried: Vec<(Arc<Variant>, String)>,
    history: Vec<CallRecord>,
}

/// Records every successful call for later inspection.
///
/// In-flight state is reset by each `will_call_operation`, so a call made
/// from inside an implementation starts its own record and lands in the
/// history before the outer call does.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    state: Mutex<Collected>,
}

impl CollectingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed calls, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<CallRecord> {
        self.state.lock().history.clone()
    }

    /// The most recent completed call.
    #[must_use]
    pub fn last(&self) -> Option<CallRecord> {
        self.state.lock().history.last().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }

    /// Forgets all recorded calls and any in-flight state.
    pub fn clear(&self) {
        *self.state.lock() = Collected::default();
    }
}

impl OperationObserver for CollectingObserver {
    fn will_call_operation(&self, _ctx: &OperationContext, variant: &Arc<Variant>) {
        let mut state = self.state.lock();
        state.current = Some(Arc::clone(variant));
        state.tried.clear();
    }

    fn will_retry_operation(&self, _ctx: &OperationContext, variant: &Arc<Variant>, reason: &str) {
        let mut state = self.state.lock();
        if let Some(previous) = state.current.replace(Arc::clone(variant)) {
            state.tried.push((previous, reason.to_string()));
        }
    }

    fn did_call_operation(&self, _ctx: &OperationContext, variant: &Arc<Variant>, retries: u32) {
        let mut state = self.state.lock();
        let tried = std::mem::take(&mut state.tried);
        state.history.push(CallRecord {
            variant: Arc::clone(variant),
            retries,
            tried,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;

    use opcall_core::Value;

    use super::*;
    use crate::dispatch::config::ContextConfig;
    use crate::dispatch::operation::{Arguments, OperationError, Outcome};
    use crate::testing::Rep;

    fn context() -> OperationContext {
        OperationContext::with_config(ContextConfig {
            log_operations: false,
            ..ContextConfig::default()
        })
    }

    fn ok(_ctx: &OperationContext, _args: &Arguments) -> Result<Outcome, OperationError> {
        Ok(Outcome::Done(Value::Null))
    }

    /// `fetch` variants: `cached` asks for `raw`, `raw` succeeds.
    fn register_fetch(ctx: &OperationContext) {
        ctx.register(
            Variant::new("fetch", ["cached"], |_ctx, _args| {
                Ok(Outcome::retry(["raw"], "cache miss"))
            })
            .with_label("cached"),
        )
        .unwrap();
        ctx.register(
            Variant::new("fetch", ["raw"], |_ctx, _args| Ok(Outcome::Done(Value::from("DATA"))))
                .with_label("raw"),
        )
        .unwrap();
    }

    #[test]
    fn collecting_observer_records_clean_call() {
        let ctx = context();
        let observer = Arc::new(CollectingObserver::new());
        ctx.set_observer(observer.clone());
        ctx.register(Variant::new("touch", ["*"], ok)).unwrap();

        ctx.call("touch", vec![Value::Int(1)]).unwrap();

        let record = observer.last().unwrap();
        assert_eq!(record.variant.name(), "touch");
        assert_eq!(record.retries, 0);
        assert!(record.tried.is_empty());
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn collecting_observer_records_tried_variants() {
        let ctx = context();
        let observer = Arc::new(CollectingObserver::new());
        ctx.set_observer(observer.clone());
        register_fetch(&ctx);

        let arg = Value::object(Rep::new(&["cached", "raw"]));
        ctx.call("fetch", vec![arg.clone()]).unwrap();
        ctx.call("fetch", vec![arg]).unwrap();

        let history = observer.history();
        assert_eq!(history.len(), 2);
        for record in history {
            assert_eq!(record.variant.label(), "raw");
            assert_eq!(record.retries, 1);
            assert_eq!(record.tried.len(), 1);
            assert_eq!(record.tried[0].0.label(), "cached");
            assert_eq!(record.tried[0].1, "cache miss");
        }

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn nested_call_lands_in_history_first() {
        let ctx = context();
        let observer = Arc::new(CollectingObserver::new());
        ctx.set_observer(observer.clone());
        ctx.register(Variant::new("inner", ["*"], ok)).unwrap();
        ctx.register(Variant::new("outer", ["*"], |ctx, args| {
            let value = ctx.call("inner", args.clone())?;
            Ok(Outcome::Done(value))
        }))
        .unwrap();

        ctx.call("outer", vec![Value::Int(1)]).unwrap();

        let names: Vec<String> = observer
            .history()
            .iter()
            .map(|r| r.variant.name().to_string())
            .collect();
        assert_eq!(names, vec!["inner", "outer"]);
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured_logs(f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn logging_observer_distinguishes_clean_and_retried_calls() {
        let ctx = context();
        ctx.set_observer(Arc::new(LoggingObserver::new()));
        register_fetch(&ctx);
        ctx.register(Variant::new("touch", ["*"], ok)).unwrap();

        let clean = captured_logs(|| {
            ctx.call("touch", vec![Value::Int(1)]).unwrap();
        });
        assert!(clean.contains("calling operation"), "{clean}");
        assert!(clean.contains("called operation"), "{clean}");
        assert!(!clean.contains("after retries"), "{clean}");

        let retried = captured_logs(|| {
            ctx.call("fetch", vec![Value::object(Rep::new(&["cached", "raw"]))])
                .unwrap();
        });
        assert!(retried.contains("retrying operation"), "{retried}");
        assert!(retried.contains("cache miss"), "{retried}");
        assert!(retried.contains("called operation after retries"), "{retried}");
        assert!(retried.contains("retries=1"), "{retried}");
    }
}
