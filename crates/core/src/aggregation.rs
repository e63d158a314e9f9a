//! Grouping of producers that share an aggregation key.

use crate::{Aggregate, AggregationError, Registry, Value};
use std::collections::{HashMap, HashSet};

/// One member of an aggregate group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateMember {
    /// Identifier inside the aggregate value
    pub identifier: String,
    /// Registered name of the member producer
    pub name: String,
}

/// Producers registered under one aggregation key.
#[derive(Debug, Clone)]
pub struct AggregateGroup {
    key: String,
    members: Vec<AggregateMember>,
}

impl AggregateGroup {
    /// The aggregation key, which is also the synthetic node name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Members in registration order.
    pub fn members(&self) -> &[AggregateMember] {
        &self.members
    }

    /// Dependency list of the synthetic node: the member names.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    /// Build the aggregate value from resolved member values.
    ///
    /// Returns `None` while any member is unresolved.
    pub fn assemble<'a>(&self, lookup: impl Fn(&str) -> Option<&'a Value>) -> Option<Aggregate> {
        self.members
            .iter()
            .map(|m| lookup(&m.name).map(|v| (m.identifier.clone(), v.clone())))
            .collect()
    }
}

/// All aggregate groups derived from a registry.
#[derive(Debug, Clone, Default)]
pub struct AggregationIndex {
    groups: Vec<AggregateGroup>,
    by_key: HashMap<String, usize>,
}

impl AggregationIndex {
    /// Group every aggregated declaration by key.
    ///
    /// Groups are ordered by the first declaration naming them.
    pub fn build(registry: &Registry) -> Result<Self, AggregationError> {
        let mut index = Self::default();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for declaration in registry.iter() {
            let Some(meta) = &declaration.aggregation else {
                continue;
            };

            if registry.is_registered(&meta.key) {
                return Err(AggregationError::KeyCollision(meta.key.clone()));
            }

            if !seen.insert((meta.key.clone(), meta.identifier.clone())) {
                return Err(AggregationError::DuplicateIdentifier {
                    key: meta.key.clone(),
                    identifier: meta.identifier.clone(),
                });
            }

            let slot = match index.by_key.get(&meta.key) {
                Some(&slot) => slot,
                None => {
                    index.by_key.insert(meta.key.clone(), index.groups.len());
                    index.groups.push(AggregateGroup {
                        key: meta.key.clone(),
                        members: Vec::new(),
                    });
                    index.groups.len() - 1
                }
            };

            index.groups[slot].members.push(AggregateMember {
                identifier: meta.identifier.clone(),
                name: declaration.name.clone(),
            });
        }

        Ok(index)
    }

    /// Look up a group by key.
    pub fn get(&self, key: &str) -> Option<&AggregateGroup> {
        self.by_key.get(key).map(|&i| &self.groups[i])
    }

    /// Whether `name` is an aggregation key.
    pub fn is_aggregate(&self, name: &str) -> bool {
        self.by_key.contains_key(name)
    }

    /// Groups in first-seen order.
    pub fn groups(&self) -> &[AggregateGroup] {
        &self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AggregationMeta, Args, Producer};
    use std::sync::Arc;

    fn producer() -> Arc<dyn Producer> {
        Arc::new(|_: Args| Value::unit())
    }

    fn aggregated(registry: &mut Registry, name: &str, key: &str, identifier: &str) {
        registry
            .register_producer(name, &[], producer(), Some(AggregationMeta::new(key, identifier)))
            .unwrap();
    }

    #[test]
    fn test_groups_by_key() {
        let mut registry = Registry::new();
        aggregated(&mut registry, "dep1", "numbers", "one");
        registry.register_producer("plain", &[], producer(), None).unwrap();
        aggregated(&mut registry, "dep2", "numbers", "two");
        aggregated(&mut registry, "x", "letters", "x");

        let index = AggregationIndex::build(&registry).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.is_aggregate("numbers"));
        assert!(!index.is_aggregate("plain"));

        let numbers = index.get("numbers").unwrap();
        assert_eq!(numbers.dependencies().collect::<Vec<_>>(), vec!["dep1", "dep2"]);
        assert_eq!(index.groups()[1].key(), "letters");
    }

    #[test]
    fn test_key_collision() {
        let mut registry = Registry::new();
        registry.register_constant("numbers", Value::unit()).unwrap();
        aggregated(&mut registry, "dep1", "numbers", "dep1");

        assert_eq!(
            AggregationIndex::build(&registry).unwrap_err(),
            AggregationError::KeyCollision("numbers".to_string())
        );
    }

    #[test]
    fn test_duplicate_identifier() {
        let mut registry = Registry::new();
        aggregated(&mut registry, "dep1", "numbers", "same");
        aggregated(&mut registry, "dep2", "numbers", "same");

        assert!(matches!(
            AggregationIndex::build(&registry),
            Err(AggregationError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn test_assemble_requires_all_members() {
        let mut registry = Registry::new();
        aggregated(&mut registry, "dep1", "numbers", "a");
        aggregated(&mut registry, "dep2", "numbers", "b");
        let index = AggregationIndex::build(&registry).unwrap();
        let group = index.get("numbers").unwrap();

        let one = Value::new(1i32);
        let two = Value::new(2i32);

        let partial = group.assemble(|name| (name == "dep1").then_some(&one));
        assert!(partial.is_none());

        let full = group
            .assemble(|name| match name {
                "dep1" => Some(&one),
                "dep2" => Some(&two),
                _ => None,
            })
            .unwrap();
        assert_eq!(full.get_as::<i32>("a"), Some(&1));
        assert_eq!(full.get_as::<i32>("b"), Some(&2));
    }
}
