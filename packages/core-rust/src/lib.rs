//! opcall core: dynamic values, representation tags and operation signatures.

pub mod representation;
pub mod signature;
pub mod types;

pub use representation::{ParseRepresentationError, Representation, Requirement};
pub use signature::Signature;
pub use types::{common_representations, DataObject, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
