//! Type-erased values flowing between producers.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A resolved value.
///
/// Values are immutable once produced and cheap to clone: every dependent
/// receives its own handle to the same underlying data.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The empty value, used by producers that yield nothing meaningful.
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Borrow the inner value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether the inner value has type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Whether both handles point at the same underlying value.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Name of the wrapped type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value<{}>", self.type_name)
    }
}

/// The value of an aggregate node: member identifier -> member value.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    members: BTreeMap<String, Value>,
}

impl Aggregate {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member value.
    pub fn insert(&mut self, identifier: impl Into<String>, value: Value) {
        self.members.insert(identifier.into(), value);
    }

    /// Get a member value by identifier.
    pub fn get(&self, identifier: &str) -> Option<&Value> {
        self.members.get(identifier)
    }

    /// Get a member value by identifier, typed.
    pub fn get_as<T: Any>(&self, identifier: &str) -> Option<&T> {
        self.get(identifier).and_then(Value::downcast_ref)
    }

    /// Member identifiers, sorted.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// Iterate over `(identifier, value)` pairs, sorted by identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the aggregate has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl FromIterator<(String, Value)> for Aggregate {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_downcast() {
        let value = Value::new(42u32);
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
        assert!(value.downcast_ref::<i64>().is_none());
        assert!(value.is::<u32>());
        assert!(value.type_name().contains("u32"));
    }

    #[test]
    fn test_value_clone_shares_data() {
        let value = Value::new(String::from("shared"));
        let copy = value.clone();
        assert!(value.ptr_eq(&copy));
        assert!(!value.ptr_eq(&Value::new(String::from("shared"))));
    }

    #[test]
    fn test_aggregate_lookup() {
        let aggregate: Aggregate = vec![
            ("b".to_string(), Value::new(2i32)),
            ("a".to_string(), Value::new(1i32)),
        ]
        .into_iter()
        .collect();

        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate.get_as::<i32>("a"), Some(&1));
        assert_eq!(aggregate.get_as::<i32>("b"), Some(&2));
        assert!(aggregate.get("c").is_none());
        assert_eq!(aggregate.identifiers().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
