//! Operation identity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable key for a guarded operation.
///
/// Used to key the guard map, the per-operation arbiters and the tripped
/// registry. Cloning is cheap (shared string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Arc<str>);

impl OperationId {
    /// Create an identity from an explicit name (e.g. `"inventory.reserve"`).
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Create an identity from a declaring type and a method signature.
    pub fn of<T: ?Sized>(signature: &str) -> Self {
        Self::new(format!("{}::{}", std::any::type_name::<T>(), signature))
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for OperationId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inventory;

    #[test]
    fn test_typed_identity_is_stable() {
        let a = OperationId::of::<Inventory>("reserve(sku, qty)");
        let b = OperationId::of::<Inventory>("reserve(sku, qty)");
        assert_eq!(a, b);
        assert!(a.as_str().ends_with("Inventory::reserve(sku, qty)"));
        assert_ne!(a, OperationId::of::<Inventory>("release(sku)"));
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = OperationId::new("orders.submit");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"orders.submit\"");
    }
}
