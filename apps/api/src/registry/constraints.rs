//! Constraint normalization and the bounded constraints cache.
//!
//! Constraints are a machine-readable enforcement schema attached to a
//! template version. Normalization canonicalizes them (recursive key sort)
//! for stable comparison; the cache avoids re-normalizing unchanged objects,
//! keyed by the template's natural key.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use crate::errors::AppError;
use crate::registry::assemble::sort_keys;

/// Cache capacity. Eviction is pure recency.
const CACHE_MAXSIZE: usize = 256;

/// Canonicalizes a constraint object: recursively sorts all object keys.
/// Returns `None` for absent or empty input. Non-object values inside
/// (lists, scalars) pass through unchanged, preserving order.
pub fn normalize(raw: Option<&Value>) -> Option<Value> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(v) => Some(sort_keys(v)),
    }
}

/// Validates a constraint object against the recognized schema.
/// Unrecognized extra keys are permitted and passed through.
pub fn validate_schema(raw: &Value) -> Result<(), AppError> {
    let map = match raw {
        Value::Object(map) => map,
        Value::Null => return Ok(()),
        _ => {
            return Err(AppError::Validation(
                "constraints must be a JSON object".to_string(),
            ))
        }
    };

    if let Some(v) = map.get("FORBIDDEN_TOKENS") {
        let ok = v
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !ok {
            return Err(AppError::Validation(
                "FORBIDDEN_TOKENS must be a list of strings".to_string(),
            ));
        }
    }
    if let Some(v) = map.get("MAX_SENTENCE_LENGTH") {
        check_int_range(v, "MAX_SENTENCE_LENGTH", 1, 1000)?;
    }
    if let Some(v) = map.get("MAX_PARAGRAPHS") {
        check_int_range(v, "MAX_PARAGRAPHS", 1, 100)?;
    }
    if let Some(v) = map.get("NO_EMOJI") {
        if !v.is_boolean() {
            return Err(AppError::Validation(
                "NO_EMOJI must be a boolean".to_string(),
            ));
        }
    }
    if let Some(v) = map.get("ASSERTIVENESS_LEVEL") {
        let ok = v.as_f64().is_some_and(|f| (0.0..=1.0).contains(&f));
        if !ok {
            return Err(AppError::Validation(
                "ASSERTIVENESS_LEVEL must be a number in [0.0, 1.0]".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_int_range(v: &Value, name: &str, min: i64, max: i64) -> Result<(), AppError> {
    let ok = v.as_i64().is_some_and(|n| n >= min && n <= max);
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{name} must be an integer in [{min}, {max}]"
        )))
    }
}

type CacheKey = (String, String);

struct CacheInner {
    map: HashMap<CacheKey, Value>,
    // Front = least recently used. Every key in `order` exists in `map`.
    order: VecDeque<CacheKey>,
}

/// Bounded LRU cache of normalized constraints, keyed by
/// (template_id, semver). Shared read/write across all concurrent renders;
/// the lock protects the internal structure only — recomputing on a miss is
/// always safe and idempotent, so staleness has no correctness impact.
pub struct ConstraintsCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl Default for ConstraintsCache {
    fn default() -> Self {
        Self::with_capacity(CACHE_MAXSIZE)
    }
}

impl ConstraintsCache {
    pub fn with_capacity(capacity: usize) -> Self {
        ConstraintsCache {
            capacity,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Returns the normalized constraints for a template version, from cache
    /// or by normalizing. Empty/absent constraints cache as an empty object.
    pub fn get_or_normalize(
        &self,
        template_id: &str,
        semver: &str,
        raw: Option<&Value>,
    ) -> Value {
        let key = (template_id.to_string(), semver.to_string());
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(hit) = inner.map.get(&key).cloned() {
            inner.order.retain(|k| k != &key);
            inner.order.push_back(key);
            return hit;
        }

        let compiled =
            normalize(raw).unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        inner.map.insert(key.clone(), compiled.clone());
        inner.order.push_back(key);
        if inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.map.remove(&evicted);
            }
        }
        compiled
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}
