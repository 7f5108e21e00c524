use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use opcall_core::Signature;

use super::operation::{OperationError, Variant};

// ---------------------------------------------------------------------------
// VariantGroup
// ---------------------------------------------------------------------------

/// All variants registered under one operation name, in registration order.
///
/// The prototype is the signature of the first variant ever registered under
/// the name. It fixes the operand count for the name and is kept even if that
/// variant is later removed.
#[derive(Debug, Clone, Default)]
pub struct VariantGroup {
    variants: Vec<Arc<Variant>>,
    prototype: Option<Signature>,
}

impl VariantGroup {
    /// Prototype signature, if anything was ever registered.
    #[must_use]
    pub fn prototype(&self) -> Option<&Signature> {
        self.prototype.as_ref()
    }

    /// Number of leading arguments that participate in dispatch.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.prototype.as_ref().map_or(0, Signature::operand_count)
    }

    #[must_use]
    pub fn variants(&self) -> &[Arc<Variant>] {
        &self.variants
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// The variant whose signature is equal to `signature`.
    #[must_use]
    pub fn exact(&self, signature: &Signature) -> Option<&Arc<Variant>> {
        self.variants.iter().find(|v| v.signature() == signature)
    }

    fn push(&mut self, variant: Variant) -> Result<(), OperationError> {
        if self.exact(variant.signature()).is_some() {
            return Err(OperationError::DuplicateSignature {
                name: variant.name().to_string(),
                signature: variant.signature().clone(),
            });
        }
        let expected = match &self.prototype {
            Some(prototype) => prototype.operand_count(),
            None => {
                self.prototype = Some(variant.signature().clone());
                variant.signature().operand_count()
            }
        };
        let found = variant.signature().operand_count();
        if found != expected {
            return Err(OperationError::OperandCountMismatch {
                name: variant.name().to_string(),
                signature: variant.signature().clone(),
                expected,
                found,
            });
        }
        self.variants.push(Arc::new(variant));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// OperationRegistry
// ---------------------------------------------------------------------------

/// Maps operation names to their variant groups.
///
/// All methods take `&self`, so variants can be registered while a call is
/// in flight (for example by a fallback loader or by an implementation).
/// Reads return snapshots; no lock is held once a method returns.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    groups: DashMap<String, VariantGroup>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Registers a variant under its name, after any existing ones.
    ///
    /// # Errors
    ///
    /// - `DuplicateSignature` if a variant with an equal signature exists.
    /// - `OperandCountMismatch` if the operand count differs from the
    ///   name's prototype.
    ///
    /// On error the registry is unchanged.
    pub fn register(&self, variant: Variant) -> Result<(), OperationError> {
        self.groups
            .entry(variant.name().to_string())
            .or_default()
            .push(variant)
    }

    /// Registers every variant of `source` in order.
    ///
    /// Stops at the first failure; variants registered before it stay.
    ///
    /// # Errors
    ///
    /// Returns the first registration error.
    pub fn import_from<I>(&self, source: I) -> Result<usize, OperationError>
    where
        I: IntoIterator<Item = Variant>,
    {
        let mut count = 0;
        for variant in source {
            self.register(variant)?;
            count += 1;
        }
        Ok(count)
    }

    /// Removes variants of `name`. Without a signature the whole group is
    /// dropped; with one only the equal variant is filtered out and the
    /// (possibly empty) group stays. Returns how many variants were removed.
    pub fn remove(&self, name: &str, signature: Option<&Signature>) -> usize {
        match signature {
            None => self
                .groups
                .remove(name)
                .map_or(0, |(_, group)| group.len()),
            Some(signature) => self.groups.get_mut(name).map_or(0, |mut group| {
                let before = group.variants.len();
                group.variants.retain(|v| v.signature() != signature);
                before - group.variants.len()
            }),
        }
    }

    /// Snapshot of the group registered under `name`, empty or not.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<VariantGroup> {
        self.groups.get(name).map(|group| group.value().clone())
    }

    /// Returns the non-empty group for `name`.
    ///
    /// If the group is absent or empty, `fallback` runs once (typically to
    /// load a provider that registers the operation) and the registry is
    /// checked again. No registry lock is held while `fallback` runs.
    ///
    /// # Errors
    ///
    /// - Any error returned by `fallback`.
    /// - `OperationNotFound` if the group is still empty afterwards.
    pub fn lookup<F>(&self, name: &str, fallback: F) -> Result<VariantGroup, OperationError>
    where
        F: FnOnce(&str) -> Result<(), OperationError>,
    {
        if let Some(group) = self.group(name).filter(|g| !g.is_empty()) {
            return Ok(group);
        }
        fallback(name)?;
        self.group(name)
            .filter(|g| !g.is_empty())
            .ok_or_else(|| OperationError::OperationNotFound {
                name: name.to_string(),
            })
    }

    /// The variant of `name` whose signature is equal to `signature`.
    ///
    /// # Errors
    ///
    /// Returns `ExactSignatureNotFound` if there is no such variant.
    pub fn exact_get(
        &self,
        name: &str,
        signature: &Signature,
    ) -> Result<Arc<Variant>, OperationError> {
        self.groups
            .get(name)
            .and_then(|group| group.exact(signature).cloned())
            .ok_or_else(|| OperationError::ExactSignatureNotFound {
                name: name.to_string(),
                signature: signature.clone(),
            })
    }

    /// Registered operation names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.groups.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of operation names (including emptied groups).
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Debug catalogue of every operation, its signatures and implementations.
    #[must_use]
    pub fn catalogue(&self) -> Catalogue {
        let mut operations: Vec<CatalogueOperation> = self
            .groups
            .iter()
            .map(|entry| CatalogueOperation {
                name: entry.key().clone(),
                variants: entry
                    .value()
                    .variants
                    .iter()
                    .map(|v| CatalogueEntry {
                        signature: v.signature().clone(),
                        implementation: v.label().to_string(),
                        experimental: v.is_experimental(),
                    })
                    .collect(),
            })
            .collect();
        operations.sort_by(|a, b| a.name.cmp(&b.name));
        Catalogue { operations }
    }
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Serializable dump of the registry, sorted by operation name.
#[derive(Debug, Clone, Serialize)]
pub struct Catalogue {
    pub operations: Vec<CatalogueOperation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogueOperation {
    pub name: String,
    pub variants: Vec<CatalogueEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogueEntry {
    pub signature: Signature,
    pub implementation: String,
    pub experimental: bool,
}

impl Catalogue {
    /// JSON form of the catalogue.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Catalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== OPERATIONS ==")?;
        for op in &self.operations {
            writeln!(f, "* {}:", op.name)?;
            for entry in &op.variants {
                writeln!(f, "    - ({}): {}", entry.signature, entry.implementation)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
