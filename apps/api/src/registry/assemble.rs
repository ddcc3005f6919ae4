//! Deterministic prompt assembly and hashing.
//!
//! Pure functions only: the engine never touches a store. Given the four
//! fragment contents in fixed order (system → personality → activity → task)
//! and the render inputs, it performs placeholder substitution, joins the
//! fragments, and computes the two replay hashes. Identical logical inputs
//! always produce byte-identical output, regardless of map key order.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::errors::AppError;

/// Number of fragments in a bundle, always in assembly order.
pub const PART_COUNT: usize = 4;

/// Render inputs shared by the bundle-backed and inline entry points.
/// `semantic_traits` is an arbitrary string-keyed mapping; key order is
/// irrelevant to the output.
#[derive(Debug, Clone)]
pub struct RenderInputs<'a> {
    pub semantic_traits: &'a Map<String, Value>,
    pub activity_level: f64,
    pub stress: f64,
    pub task: &'a str,
}

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub rendered_prompt: String,
    pub bundle_hash: String,
    pub personality_hash: String,
}

/// Immutable substitution context — values are computed once, then applied
/// to each fragment by plain string replacement.
struct SubstitutionContext {
    task: String,
    activity_level: String,
    stress: String,
    semantic_traits_json: String,
}

/// Assembles the four fragments and computes both hashes.
///
/// `bundle_hash` depends only on (bundle_id, semver); `personality_hash`
/// depends only on the render inputs. Content never leaks into either hash,
/// so source-of-content (store vs inline) cannot change them.
pub fn assemble_and_hash(
    bundle_id: &str,
    semver: &str,
    parts_content: &[String],
    inputs: &RenderInputs<'_>,
) -> Result<Assembled, AppError> {
    if parts_content.len() != PART_COUNT {
        return Err(AppError::Validation(format!(
            "expected exactly {PART_COUNT} content parts (system, personality, activity, task), got {}",
            parts_content.len()
        )));
    }

    let context = SubstitutionContext {
        task: inputs.task.to_string(),
        activity_level: format_scalar(inputs.activity_level),
        stress: format_scalar(inputs.stress),
        semantic_traits_json: canonical_json(&Value::Object(inputs.semantic_traits.clone())),
    };

    let rendered_prompt = parts_content
        .iter()
        .map(|content| substitute(content, &context))
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(Assembled {
        rendered_prompt,
        bundle_hash: bundle_hash(bundle_id, semver),
        personality_hash: personality_hash(inputs),
    })
}

/// Digest identifying the bundle version only. Stable across renders and
/// independent of template content and render inputs.
pub fn bundle_hash(bundle_id: &str, semver: &str) -> String {
    sha256_hex(format!("{bundle_id}:{semver}").as_bytes())
}

/// Digest of the render input for replay identity. Canonical JSON at every
/// depth, so two logically-equal trait maps hash identically.
pub fn personality_hash(inputs: &RenderInputs<'_>) -> String {
    let payload = serde_json::json!({
        "semantic_traits": Value::Object(inputs.semantic_traits.clone()),
        "activity_level": inputs.activity_level,
        "stress": inputs.stress,
        "task": inputs.task,
    });
    sha256_hex(canonical_json(&payload).as_bytes())
}

/// Replaces the four literal placeholder tokens. Plain string replacement,
/// no recursive expansion, no arbitrary key lookup.
fn substitute(content: &str, context: &SubstitutionContext) -> String {
    content
        .replace("{{task}}", &context.task)
        .replace("{{activity_level}}", &context.activity_level)
        .replace("{{stress}}", &context.stress)
        .replace("{{semantic_traits}}", &context.semantic_traits_json)
}

/// Fixed scalar-to-string conversion for placeholder substitution.
/// Keeps a decimal point for whole values (`0.0` → `"0.0"`, not `"0"`).
fn format_scalar(v: f64) -> String {
    format!("{v:?}")
}

/// Compact JSON with object keys sorted at every nesting depth. Arrays and
/// scalars pass through preserving order.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_keys(value)).unwrap_or_else(|_| "{}".to_string())
}

/// Recursively rebuilds objects in key order.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
