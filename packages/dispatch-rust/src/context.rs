//! Operation context: the registry, retry policy and observer slot behind
//! every call.
//!
//! ```
//! use opcall_core::Value;
//! use opcall_dispatch::{OperationContext, Outcome, Variant};
//!
//! let ctx = OperationContext::new();
//! ctx.register(Variant::new("double", ["number"], |_ctx, args| {
//!     let n = args.get(0).and_then(Value::as_int).unwrap_or_default();
//!     Ok(Outcome::Done(Value::Int(n * 2)))
//! }))
//! .unwrap();
//!
//! assert_eq!(ctx.call("double", vec![Value::Int(3)]).unwrap(), Value::Int(6));
//! assert_eq!(ctx.operation("double").call(vec![Value::Int(4)]).unwrap(), Value::Int(8));
//! ```

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use opcall_core::{Signature, Value};

use crate::dispatch::config::ContextConfig;
use crate::dispatch::matcher;
use crate::dispatch::operation::{Arguments, OperationError, OperationProvider, Variant};
use crate::dispatch::registry::{Catalogue, OperationRegistry, VariantGroup};
use crate::dispatch::retry::{self, RetryPolicy};
use crate::observer::{LoggingObserver, OperationObserver};

// ---------------------------------------------------------------------------
// OperationLoader
// ---------------------------------------------------------------------------

/// Hook run when a call names an operation with no registered variants.
///
/// Implementations typically load a provider and register its variants on
/// `ctx`. Returning `Ok(())` makes the lookup check the registry again;
/// a load failure should be reported as `ProviderLoad`, keeping "looked but
/// absent" apart from "failed while looking".
pub trait OperationLoader: Send + Sync {
    /// Tries to make operation `name` available on `ctx`.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be provided.
    fn operation_not_found(&self, ctx: &OperationContext, name: &str) -> Result<(), OperationError>;
}

/// Default loader: every unknown operation is reported as not found.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl OperationLoader for NoLoader {
    fn operation_not_found(
        &self,
        _ctx: &OperationContext,
        name: &str,
    ) -> Result<(), OperationError> {
        Err(OperationError::OperationNotFound {
            name: name.to_string(),
        })
    }
}

impl<F> OperationLoader for F
where
    F: Fn(&OperationContext, &str) -> Result<(), OperationError> + Send + Sync,
{
    fn operation_not_found(
        &self,
        ctx: &OperationContext,
        name: &str,
    ) -> Result<(), OperationError> {
        self(ctx, name)
    }
}

// ---------------------------------------------------------------------------
// OperationContext
// ---------------------------------------------------------------------------

/// Dispatches named operations to the variant matching their arguments.
///
/// Every method takes `&self`: implementations receive the context and may
/// call further operations or register variants while a call is running.
/// Locks are held only for the duration of a single registry or policy
/// access, never across an implementation or loader. Interleaving of
/// mutation from several threads with dispatch is not ordered in any way;
/// callers sharing a context must serialize that themselves.
pub struct OperationContext {
    registry: OperationRegistry,
    retry_policy: RwLock<RetryPolicy>,
    observer: RwLock<Option<Arc<dyn OperationObserver>>>,
    retry_budget: u32,
    loader: Box<dyn OperationLoader>,
}

impl OperationContext {
    /// Context with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ContextConfig::default())
    }

    /// Context with the given configuration and no loader.
    #[must_use]
    pub fn with_config(config: ContextConfig) -> Self {
        ContextBuilder::new().config(config).build()
    }

    #[must_use]
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    // -- registration -------------------------------------------------------

    /// Registers a single variant.
    ///
    /// # Errors
    ///
    /// See [`OperationRegistry::register`].
    pub fn register(&self, variant: Variant) -> Result<(), OperationError> {
        self.registry.register(variant)
    }

    /// Registers variants in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// See [`OperationRegistry::import_from`].
    pub fn import_from<I>(&self, source: I) -> Result<usize, OperationError>
    where
        I: IntoIterator<Item = Variant>,
    {
        self.registry.import_from(source)
    }

    /// Registers every operation of `provider`.
    ///
    /// # Errors
    ///
    /// See [`OperationRegistry::import_from`].
    pub fn add_operations_from(
        &self,
        provider: &dyn OperationProvider,
    ) -> Result<usize, OperationError> {
        self.registry.import_from(provider.operations())
    }

    /// Removes a whole operation or, with a signature, one variant of it.
    pub fn remove(&self, name: &str, signature: Option<&Signature>) -> usize {
        self.registry.remove(name, signature)
    }

    // -- introspection ------------------------------------------------------

    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Variants of `name`, running the loader if none are registered.
    ///
    /// # Errors
    ///
    /// - The loader's error, if it fails.
    /// - `OperationNotFound` if nothing is registered afterwards.
    pub fn lookup(&self, name: &str) -> Result<VariantGroup, OperationError> {
        self.registry
            .lookup(name, |name| self.loader.operation_not_found(self, name))
    }

    /// The variant that a call of `name` with these leading `operands`
    /// would start with.
    ///
    /// # Errors
    ///
    /// Lookup errors, or `NoMatchingSignature`.
    pub fn resolve(&self, name: &str, operands: &[Value]) -> Result<Arc<Variant>, OperationError> {
        let group = self.lookup(name)?;
        matcher::resolve(name, &group, operands)
    }

    /// The variant of `name` registered with exactly `signature`.
    ///
    /// # Errors
    ///
    /// Returns `ExactSignatureNotFound` if there is none.
    pub fn exact_get(
        &self,
        name: &str,
        signature: &Signature,
    ) -> Result<Arc<Variant>, OperationError> {
        self.registry.exact_get(name, signature)
    }

    #[must_use]
    pub fn catalogue(&self) -> Catalogue {
        self.registry.catalogue()
    }

    // -- calling ------------------------------------------------------------

    /// Calls operation `name`.
    ///
    /// The leading positional arguments select the variant; all arguments are
    /// passed on to it. Renegotiation requests are followed within the retry
    /// budget.
    ///
    /// # Errors
    ///
    /// Any [`OperationError`]; implementation errors are returned unchanged.
    pub fn call(&self, name: &str, args: impl Into<Arguments>) -> Result<Value, OperationError> {
        retry::call(self, name, &args.into())
    }

    /// A reference to operation `name` bound to this context. The name is
    /// not checked until the reference is called.
    #[must_use]
    pub fn operation(&self, name: impl Into<String>) -> OperationRef<'_> {
        OperationRef {
            ctx: self,
            name: name.into(),
        }
    }

    /// Accessor producing bound references by name.
    #[must_use]
    pub fn ops(&self) -> OperationGetter<'_> {
        OperationGetter { ctx: self }
    }

    // -- retry policy -------------------------------------------------------

    #[must_use]
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Snapshot of the current retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.read().clone()
    }

    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        *self.retry_policy.write() = policy;
    }

    /// Edits the retry policy in place.
    pub fn update_retry_policy<F>(&self, f: F)
    where
        F: FnOnce(&mut RetryPolicy),
    {
        f(&mut self.retry_policy.write());
    }

    #[must_use]
    pub fn can_retry(&self, name: &str) -> bool {
        self.retry_policy.read().can_retry(name)
    }

    // -- observer -----------------------------------------------------------

    #[must_use]
    pub fn observer(&self) -> Option<Arc<dyn OperationObserver>> {
        self.observer.read().clone()
    }

    /// Installs `observer`, returning the one it replaces.
    pub fn set_observer(
        &self,
        observer: Arc<dyn OperationObserver>,
    ) -> Option<Arc<dyn OperationObserver>> {
        self.observer.write().replace(observer)
    }

    /// Removes the observer, returning it.
    pub fn clear_observer(&self) -> Option<Arc<dyn OperationObserver>> {
        self.observer.write().take()
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationContext")
            .field("operations", &self.registry.names())
            .field("retry_policy", &*self.retry_policy.read())
            .field("retry_budget", &self.retry_budget)
            .field("observer", &self.observer.read().is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ContextBuilder
// ---------------------------------------------------------------------------

/// Builder for [`OperationContext`].
pub struct ContextBuilder {
    config: ContextConfig,
    observer: Option<Arc<dyn OperationObserver>>,
    loader: Box<dyn OperationLoader>,
}

impl ContextBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
            observer: None,
            loader: Box::new(NoLoader),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.config.retry_budget = budget;
        self
    }

    /// Installs `observer` instead of the configured logging observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn OperationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Hook run for operations with no registered variants.
    #[must_use]
    pub fn loader(mut self, loader: impl OperationLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    #[must_use]
    pub fn build(self) -> OperationContext {
        let ContextConfig {
            retry_budget,
            retry_allow,
            retry_deny,
            log_operations,
        } = self.config;

        let observer = self.observer.or_else(|| {
            log_operations.then(|| Arc::new(LoggingObserver::new()) as Arc<dyn OperationObserver>)
        });

        OperationContext {
            registry: OperationRegistry::new(),
            retry_policy: RwLock::new(RetryPolicy::new(retry_allow, retry_deny)),
            observer: RwLock::new(observer),
            retry_budget,
            loader: self.loader,
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Bound references
// ---------------------------------------------------------------------------

/// An operation name bound to a context, callable like a function.
#[derive(Debug, Clone)]
pub struct OperationRef<'a> {
    ctx: &'a OperationContext,
    name: String,
}

impl OperationRef<'_> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls the operation on the bound context.
    ///
    /// # Errors
    ///
    /// See [`OperationContext::call`].
    pub fn call(&self, args: impl Into<Arguments>) -> Result<Value, OperationError> {
        self.ctx.call(&self.name, args)
    }
}

/// Produces [`OperationRef`]s for a context, one name at a time.
#[derive(Debug, Clone, Copy)]
pub struct OperationGetter<'a> {
    ctx: &'a OperationContext,
}

impl<'a> OperationGetter<'a> {
    #[must_use]
    pub fn get(&self, name: &str) -> OperationRef<'a> {
        self.ctx.operation(name)
    }
}

// ---------------------------------------------------------------------------
// Default context
// ---------------------------------------------------------------------------

static DEFAULT_CONTEXT: OnceLock<OperationContext> = OnceLock::new();

/// Process-wide context, built with the default configuration on first use.
///
/// Construction happens at most once even under concurrent first access.
/// Prefer passing a context explicitly; this is meant for the outermost
/// call site only.
#[must_use]
pub fn default_context() -> &'static OperationContext {
    DEFAULT_CONTEXT.get_or_init(OperationContext::new)
}

/// Fills the default-context slot before its first use.
///
/// # Errors
///
/// Returns `ctx` back if the slot is already filled.
pub fn install_default_context(ctx: OperationContext) -> Result<(), OperationContext> {
    DEFAULT_CONTEXT.set(ctx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
