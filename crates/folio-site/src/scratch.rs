//! Per-item scratch store.
//!
//! A [`Scratch`] is a small concurrent key/value store templates use to carry
//! state between render calls. Unlike lazy cells it is never reset: the site
//! keeps one store per tree path across rebuilds, see [`ScratchRegistry`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};

use crate::error::ScratchError;

/// Concurrent key/value store of JSON values.
#[derive(Debug, Default)]
pub struct Scratch {
    values: RwLock<BTreeMap<String, Value>>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn add_values(key: &str, existing: &Value, added: Value) -> Result<Value, ScratchError> {
    let incompatible = |added: &Value| ScratchError::IncompatibleTypes {
        key: key.to_owned(),
        existing: type_name(existing),
        added: type_name(added),
    };
    match (existing, added) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64())
                && let Some(sum) = a.checked_add(b)
            {
                return Ok(sum.into());
            }
            let sum = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
            Ok(serde_json::Number::from_f64(sum).map_or(Value::Null, Value::Number))
        }
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) => {
            let mut merged = a.clone();
            merged.extend(b);
            Ok(Value::Array(merged))
        }
        (Value::Array(a), other) => {
            let mut merged = a.clone();
            merged.push(other);
            Ok(Value::Array(merged))
        }
        (_, added) => Err(incompatible(&added)),
    }
}

impl Scratch {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.write().insert(key.into(), value.into());
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    /// Add `value` to the value under `key`.
    ///
    /// Numbers are summed, strings concatenated, and values appended to
    /// arrays (arrays are concatenated). A missing key is simply set.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::IncompatibleTypes`] for other combinations.
    pub fn add(&self, key: &str, value: impl Into<Value>) -> Result<(), ScratchError> {
        let value = value.into();
        let mut values = self.write();
        let combined = match values.get(key) {
            Some(existing) => add_values(key, existing, value)?,
            None => value,
        };
        values.insert(key.to_owned(), combined);
        Ok(())
    }

    /// Remove `key`.
    pub fn delete(&self, key: &str) {
        self.write().remove(key);
    }

    /// Store `value` under `map_key` in the map at `key`, creating the map.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::NotAMap`] if `key` holds something else.
    pub fn set_in_map(
        &self,
        key: &str,
        map_key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ScratchError> {
        let mut values = self.write();
        let entry = values
            .entry(key.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(map) = entry else {
            return Err(ScratchError::NotAMap(key.to_owned()));
        };
        map.insert(map_key.into(), value.into());
        Ok(())
    }

    /// Values of the map at `key`, sorted by map key.
    #[must_use]
    pub fn get_sorted_map_values(&self, key: &str) -> Option<Vec<Value>> {
        let values = self.read();
        let Value::Object(map) = values.get(key)? else {
            return None;
        };
        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Some(entries.into_iter().map(|(_, v)| v.clone()).collect())
    }

    /// Snapshot of every stored value.
    #[must_use]
    pub fn values(&self) -> BTreeMap<String, Value> {
        self.read().clone()
    }
}

/// Scratch stores keyed by tree path, shared across site rebuilds.
#[derive(Debug, Default)]
pub(crate) struct ScratchRegistry {
    stores: Mutex<HashMap<String, Arc<Scratch>>>,
}

impl ScratchRegistry {
    /// Store for `path`, created on first use.
    pub(crate) fn for_path(&self, path: &str) -> Arc<Scratch> {
        let mut stores = self.stores.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(stores.entry(path.to_owned()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_get_delete() {
        let scratch = Scratch::new();

        scratch.set("title", "Hello");
        assert_eq!(scratch.get("title"), Some(json!("Hello")));

        scratch.delete("title");
        assert_eq!(scratch.get("title"), None);
    }

    #[test]
    fn test_add_numbers() {
        let scratch = Scratch::new();

        scratch.add("count", 1).unwrap();
        scratch.add("count", 2).unwrap();
        assert_eq!(scratch.get("count"), Some(json!(3)));

        scratch.add("count", 0.5).unwrap();
        assert_eq!(scratch.get("count"), Some(json!(3.5)));
    }

    #[test]
    fn test_add_strings_and_arrays() {
        let scratch = Scratch::new();

        scratch.add("s", "a").unwrap();
        scratch.add("s", "b").unwrap();
        scratch.set("list", json!(["x"]));
        scratch.add("list", "y").unwrap();
        scratch.add("list", json!(["z"])).unwrap();

        assert_eq!(scratch.get("s"), Some(json!("ab")));
        assert_eq!(scratch.get("list"), Some(json!(["x", "y", "z"])));
    }

    #[test]
    fn test_add_incompatible() {
        let scratch = Scratch::new();
        scratch.set("n", 1);

        let err = scratch.add("n", "x").unwrap_err();

        assert_eq!(
            err,
            ScratchError::IncompatibleTypes {
                key: "n".to_owned(),
                existing: "number",
                added: "string",
            }
        );
        assert_eq!(scratch.get("n"), Some(json!(1)));
    }

    #[test]
    fn test_map_values_sorted_by_key() {
        let scratch = Scratch::new();

        scratch.set_in_map("tags", "b", 2).unwrap();
        scratch.set_in_map("tags", "a", 1).unwrap();
        scratch.set_in_map("tags", "c", 3).unwrap();

        assert_eq!(
            scratch.get_sorted_map_values("tags"),
            Some(vec![json!(1), json!(2), json!(3)])
        );
        assert_eq!(scratch.get_sorted_map_values("missing"), None);
    }

    #[test]
    fn test_set_in_map_on_scalar() {
        let scratch = Scratch::new();
        scratch.set("tags", "x");

        let err = scratch.set_in_map("tags", "a", 1).unwrap_err();

        assert_eq!(err, ScratchError::NotAMap("tags".to_owned()));
    }

    #[test]
    fn test_concurrent_add() {
        let scratch = Scratch::new();

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        scratch.add("n", 1).unwrap();
                    }
                });
            }
        });

        assert_eq!(scratch.get("n"), Some(json!(800)));
    }

    #[test]
    fn test_registry_returns_same_store() {
        let registry = ScratchRegistry::default();

        registry.for_path("blog/a").set("k", true);

        assert_eq!(registry.for_path("blog/a").get("k"), Some(json!(true)));
        assert_eq!(registry.for_path("blog/b").get("k"), None);
        assert_eq!(registry.for_path("blog/a").values().len(), 1);
    }
}
