//! Process-wide key/value registry shared by the booter and the machine.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use arc_core::{Validation, Variant};

/// Runtime variant tag (`ie`, `ch`, `sa`, `ff`) detected by the capability gate.
pub const VARIANT_KEY: &str = "variant";

/// `true` once the capability gate passed, `false` once it failed.
pub const VALIDATED_KEY: &str = "validated";

/// Notice produced by a failed capability gate.
pub const NOTICE_KEY: &str = "validation_notice";

#[derive(Debug, Default)]
pub struct Registry {
    values: RwLock<HashMap<String, Value>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn set(&self, key: &str, value: Value) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn set_many(&self, values: Map<String, Value>) {
        let mut guard = self.values.write().unwrap_or_else(PoisonError::into_inner);
        guard.extend(values);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Copy of every entry, sorted by key.
    pub fn snapshot(&self) -> Map<String, Value> {
        let guard = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = guard.keys().cloned().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|k| guard.get(&k).cloned().map(|v| (k, v)))
            .collect()
    }

    pub fn variant(&self) -> Option<String> {
        self.get_str(VARIANT_KEY)
    }

    pub fn set_variant(&self, variant: Option<Variant>) {
        let value = variant.map_or(Value::Null, |v| Value::String(v.tag().to_string()));
        self.set(VARIANT_KEY, value);
    }

    pub fn is_validated(&self) -> bool {
        self.get(VALIDATED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Record the outcome of the capability gate.
    pub fn record_validation(&self, validation: &Validation) {
        self.set_variant(validation.variant);
        self.set(VALIDATED_KEY, Value::Bool(validation.passed));
        if validation.passed {
            self.remove(NOTICE_KEY);
        } else {
            self.set(NOTICE_KEY, Value::String(validation.notice()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_core::{validate, MinVersions};
    use serde_json::json;

    #[test]
    fn test_get_set() {
        let reg = Registry::new();
        assert!(reg.get("path").is_none());
        reg.set("path", json!("/api"));
        assert_eq!(reg.get_str("path").as_deref(), Some("/api"));

        let mut many = Map::new();
        many.insert("b".into(), json!(2));
        many.insert("a".into(), json!(1));
        reg.set_many(many);
        let keys: Vec<_> = reg.snapshot().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b", "path"]);
    }

    #[test]
    fn test_record_validation() {
        let reg = Registry::new();
        assert!(!reg.is_validated());

        let failed = validate("Mozilla/4.0 (compatible; MSIE 6.0;)", &MinVersions::default());
        reg.record_validation(&failed);
        assert_eq!(reg.variant().as_deref(), Some("ie"));
        assert!(!reg.is_validated());
        assert!(reg.get_str(NOTICE_KEY).unwrap().contains("Internet Explorer"));

        let passed = validate("Firefox/120.0", &MinVersions::default());
        reg.record_validation(&passed);
        assert_eq!(reg.variant().as_deref(), Some("ff"));
        assert!(reg.is_validated());
        assert!(reg.get(NOTICE_KEY).is_none());
    }
}
