//! JSON manifests describing a tree of constants and producers.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use wireup_core::{Aggregate, AggregationMeta, Args, Value};
use wireup_execution::{ResolveConfig, Resolved, Tree};

/// A manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Completion parameter name
    #[serde(default)]
    pub done_name: Option<String>,

    /// Async deadline in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Constants by name
    #[serde(default)]
    pub constants: BTreeMap<String, Json>,

    /// Producers, in registration order
    #[serde(default)]
    pub producers: Vec<ProducerSpec>,
}

/// One producer in a manifest.
///
/// A manifest producer yields an object mapping each dependency name to
/// that dependency's value.
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerSpec {
    /// Registered name
    pub name: String,

    /// Dependency names
    #[serde(default)]
    pub deps: Vec<String>,

    /// Aggregation membership
    #[serde(default)]
    pub aggregate: Option<AggregateSpec>,

    /// Delay before an async producer completes
    #[serde(default)]
    pub delay_ms: u64,

    /// Error message an async producer fails with
    #[serde(default)]
    pub fail: Option<String>,
}

/// Aggregation membership of a manifest producer.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregateSpec {
    /// Aggregation key
    pub key: String,
    /// Identifier inside the aggregate
    pub identifier: String,
}

impl Manifest {
    /// Load a manifest from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    /// Parse a manifest from JSON text.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Resolve configuration, with command-line overrides taking precedence.
    pub fn config(&self, done_name: Option<String>, timeout_ms: Option<u64>) -> ResolveConfig {
        let mut config = ResolveConfig::default();
        if let Some(name) = done_name.or_else(|| self.done_name.clone()) {
            config = config.with_done_name(name);
        }
        if let Some(ms) = timeout_ms.or(self.timeout_ms) {
            config = config.with_timeout(Duration::from_millis(ms));
        }
        config
    }

    /// Register everything into a tree.
    pub fn into_tree(self, config: ResolveConfig) -> Result<Tree> {
        let mut tree = Tree::new().with_config(config);

        for (name, value) in self.constants {
            tree.constant(name, value)?;
        }

        let done_name = tree.config().done_name.clone();
        for spec in self.producers {
            let deps: Vec<&str> = spec.deps.iter().map(String::as_str).collect();
            let producer = collector(&spec, &done_name);
            match &spec.aggregate {
                Some(aggregate) => tree.register_aggregated(
                    spec.name.as_str(),
                    &deps,
                    AggregationMeta::new(aggregate.key.as_str(), aggregate.identifier.as_str()),
                    producer,
                )?,
                None => tree.register(spec.name.as_str(), &deps, producer)?,
            }
        }

        Ok(tree)
    }
}

/// Build the producer for a manifest entry.
fn collector(spec: &ProducerSpec, done_name: &str) -> impl Fn(Args) -> Value + Send + Sync + 'static {
    let keys: Vec<String> = spec.deps.iter().filter(|d| *d != done_name).cloned().collect();
    let delay = Duration::from_millis(spec.delay_ms);
    let fail = spec.fail.clone();

    move |mut args: Args| {
        let mut object = Map::new();
        let values = (0..args.len()).filter_map(|i| args.get(i));
        for (key, value) in keys.iter().zip(values) {
            object.insert(key.clone(), to_json(value));
        }
        let collected = Value::new(Json::Object(object));

        let Some(done) = args.take_completion() else {
            return collected;
        };

        let fail = fail.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match fail {
                Some(message) => done.fail(anyhow::anyhow!(message)),
                None => done.resolve(collected),
            }
        });
        Value::unit()
    }
}

/// Render a resolved value as JSON.
///
/// Values that are neither JSON nor aggregates render as their type name.
pub fn to_json(value: &Value) -> Json {
    if let Some(json) = value.downcast_ref::<Json>() {
        return json.clone();
    }
    if let Some(aggregate) = value.downcast_ref::<Aggregate>() {
        let members = aggregate
            .iter()
            .map(|(identifier, member)| (identifier.to_string(), to_json(member)))
            .collect();
        return Json::Object(members);
    }
    if value.is::<()>() {
        return Json::Null;
    }
    Json::String(format!("<{}>", value.type_name()))
}

/// Render a whole result mapping as a JSON object with sorted keys.
pub fn render(resolved: &Resolved) -> Json {
    let sorted: BTreeMap<&str, Json> = resolved.iter().map(|(k, v)| (k, to_json(v))).collect();
    Json::Object(sorted.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wireup_execution::ResolveError;

    const SAMPLE: &str = r#"{
        "timeout_ms": 500,
        "constants": { "config": { "db": "mongodb://server" }, "stats": 2 },
        "producers": [
            { "name": "dep1", "deps": ["config"], "aggregate": { "key": "numbers", "identifier": "one" } },
            { "name": "dep2", "deps": ["stats", "_done"], "delay_ms": 100,
              "aggregate": { "key": "numbers", "identifier": "two" } },
            { "name": "summary", "deps": ["numbers"] }
        ]
    }"#;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.timeout_ms, Some(500));
        assert_eq!(manifest.constants.len(), 2);
        assert_eq!(manifest.producers.len(), 3);
        assert_eq!(manifest.producers[1].delay_ms, 100);
        assert!(manifest.producers[2].aggregate.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let manifest = Manifest::parse(SAMPLE).unwrap();

        let config = manifest.config(None, None);
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.done_name, "_done");

        let config = manifest.config(Some("next".to_string()), Some(20));
        assert_eq!(config.timeout, Duration::from_millis(20));
        assert_eq!(config.done_name, "next");
    }

    #[test]
    fn test_plan_order() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let config = manifest.config(None, None);
        let tree = manifest.into_tree(config).unwrap();

        let plan = tree.plan().unwrap();
        assert_eq!(plan.order(), vec!["config", "stats", "dep1", "dep2", "numbers", "summary"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_manifest() {
        let manifest = Manifest::parse(SAMPLE).unwrap();
        let config = manifest.config(None, None);
        let tree = manifest.into_tree(config).unwrap();

        let resolved = tree.resolve().unwrap().await.unwrap();
        let rendered = render(&resolved);

        assert_eq!(rendered["dep1"], json!({ "config": { "db": "mongodb://server" } }));
        assert_eq!(rendered["dep2"], json!({ "stats": 2 }));
        assert_eq!(
            rendered["numbers"],
            json!({ "one": { "config": { "db": "mongodb://server" } }, "two": { "stats": 2 } })
        );
        assert_eq!(rendered["summary"]["numbers"]["two"], json!({ "stats": 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_producer() {
        let manifest = Manifest::parse(
            r#"{ "producers": [ { "name": "broken", "deps": ["_done"], "fail": "boom" } ] }"#,
        )
        .unwrap();
        let config = manifest.config(None, None);
        let tree = manifest.into_tree(config).unwrap();

        match tree.resolve().unwrap().await {
            Err(ResolveError::Producer { producer, source }) => {
                assert_eq!(producer, "broken");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let manifest = Manifest::parse(
            r#"{ "constants": { "a": 1 }, "producers": [ { "name": "a" } ] }"#,
        )
        .unwrap();

        assert!(manifest.into_tree(ResolveConfig::default()).is_err());
    }

    #[test]
    fn test_to_json_fallback() {
        assert_eq!(to_json(&Value::unit()), Json::Null);
        assert_eq!(to_json(&Value::new(json!([1, 2]))), json!([1, 2]));
        assert!(to_json(&Value::new(5u8)).as_str().unwrap().contains("u8"));
    }
}
