//! opcall dispatch: a registry of named operations with runtime multiple
//! dispatch on operand representations, plus call renegotiation.

pub mod context;
pub mod dispatch;
pub mod observer;

pub use context::{
    default_context, install_default_context, ContextBuilder, NoLoader, OperationContext,
    OperationGetter, OperationLoader, OperationRef,
};
pub use dispatch::{
    Arguments, Catalogue, ContextConfig, Implementation, OperationError, OperationProvider,
    OperationRegistry, Outcome, RetryPolicy, Variant, VariantGroup,
};
pub use observer::{CallRecord, CollectingObserver, LoggingObserver, OperationObserver};

pub use opcall_core::{DataObject, Representation, Requirement, Signature, Value};

#[cfg(test)]
pub(crate) mod testing {
    use std::any::Any;

    use opcall_core::{DataObject, Representation};

    /// Data object presenting a fixed list of representations.
    #[derive(Debug)]
    pub struct Rep(Vec<Representation>);

    impl Rep {
        pub fn new(reps: &[&str]) -> Self {
            Self(reps.iter().map(|r| r.parse().unwrap()).collect())
        }
    }

    impl DataObject for Rep {
        fn representations(&self) -> Vec<Representation> {
            self.0.clone()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }
}
