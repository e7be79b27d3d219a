//! Append-only descriptor store.
//!
//! Identities are kept in registration order; the matcher relies on that
//! order for its tie-break. There is no update or delete.

use crate::error::CoreError;
use crate::types::{Descriptor, Identity};

#[derive(Debug, Clone)]
pub struct DescriptorStore {
    dimension: usize,
    identities: Vec<Identity>,
}

impl DescriptorStore {
    /// Create an empty store that accepts descriptors of exactly `dimension` values.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            identities: Vec::new(),
        }
    }

    /// Register a new identity and return the total identity count.
    ///
    /// Everything is validated before the identity is appended, so a failed
    /// call never changes the store.
    pub fn register(&mut self, name: &str, descriptor: Descriptor) -> Result<usize, CoreError> {
        if name.is_empty() {
            return Err(CoreError::Validation("name is required".into()));
        }
        descriptor.validate()?;
        self.check_dimension(&descriptor)?;
        if self.contains(name) {
            return Err(CoreError::DuplicateName(name.to_string()));
        }

        self.identities.push(Identity {
            name: name.to_string(),
            descriptor,
        });
        tracing::debug!(name, count = self.identities.len(), "identity appended");
        Ok(self.identities.len())
    }

    /// Verify a probe has the store's dimensionality.
    pub fn check_dimension(&self, descriptor: &Descriptor) -> Result<(), CoreError> {
        if descriptor.len() != self.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimension,
                actual: descriptor.len(),
            });
        }
        Ok(())
    }

    /// All identities in registration order.
    pub fn all(&self) -> &[Identity] {
        &self.identities
    }

    /// Case-sensitive exact name lookup.
    pub fn contains(&self, name: &str) -> bool {
        self.identities.iter().any(|i| i.name == name)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(values: &[f64]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    #[test]
    fn test_register_returns_count() {
        let mut store = DescriptorStore::new(2);
        assert_eq!(store.register("alice", desc(&[0.0, 0.1])).unwrap(), 1);
        assert_eq!(store.register("bob", desc(&[0.2, 0.1])).unwrap(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected_and_store_unchanged() {
        let mut store = DescriptorStore::new(2);
        store.register("alice", desc(&[0.0, 0.1])).unwrap();

        let err = store.register("alice", desc(&[0.5, 0.5])).unwrap_err();
        assert_eq!(err, CoreError::DuplicateName("alice".into()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].descriptor, desc(&[0.0, 0.1]));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let mut store = DescriptorStore::new(1);
        store.register("Alice", desc(&[0.0])).unwrap();
        assert_eq!(store.register("alice", desc(&[0.0])).unwrap(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut store = DescriptorStore::new(1);
        assert!(matches!(
            store.register("", desc(&[0.0])),
            Err(CoreError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut store = DescriptorStore::new(3);
        assert_eq!(
            store.register("alice", desc(&[0.0, 0.0])),
            Err(CoreError::DimensionMismatch { expected: 3, actual: 2 })
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut store = DescriptorStore::new(1);
        for name in ["c", "a", "b"] {
            store.register(name, desc(&[0.0])).unwrap();
        }
        let names: Vec<&str> = store.all().iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }
}
