//! Operation dispatch framework.
//!
//! A call flows through these stages:
//!
//! 1. **Registration** (`registry`): variants grouped by operation name
//! 2. **Lookup** (`registry`): the name's group, loading it on demand
//! 3. **Matching** (`matcher`): operand representations -> variant
//! 4. **Execution** (`retry`): run, renegotiate within the retry budget

pub mod config;
pub mod matcher;
pub mod operation;
pub mod registry;
pub mod retry;

// Re-export key types for convenient access.
pub use config::{ContextConfig, DEFAULT_RETRY_BUDGET};
pub use operation::{Arguments, Implementation, OperationError, OperationProvider, Outcome, Variant};
pub use registry::{Catalogue, CatalogueEntry, CatalogueOperation, OperationRegistry, VariantGroup};
pub use retry::RetryPolicy;
