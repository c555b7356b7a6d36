//! Equality normalizer.
//!
//! `version`, `id` and `syncOrigin` are storage artifacts: each live store
//! numbers its own revisions and keys, and `syncOrigin` only survives in the
//! versioned copy. [`normalize`] copies them from the source onto the target so
//! that [`documents_equal`] reports content differences only.

use serde_json::{Number, Value};
use similar::TextDiff;

use dashsync_core::types::fields;
use dashsync_core::{DashboardDocument, DocumentError};

/// Model fields overwritten from the source before comparing.
pub const NON_SEMANTIC_FIELDS: [&str; 3] = [fields::VERSION, fields::ID, fields::SYNC_ORIGIN];

/// Copy of `target` with the non-semantic fields taken from `source`.
///
/// Pass `DashboardDocument::default()` when the target does not exist yet; the
/// result then differs from any source with content.
pub fn normalize(target: &DashboardDocument, source: &DashboardDocument) -> DashboardDocument {
    let mut normalized = target.clone();
    for key in NON_SEMANTIC_FIELDS {
        normalized.adopt_field(source, key);
    }
    normalized
}

/// Deep structural equality of two dashboard models.
pub fn documents_equal(a: &DashboardDocument, b: &DashboardDocument) -> bool {
    let (a, b) = (a.model(), b.model());
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| deep_equal(value, other)))
}

/// Recursive equality over JSON trees.
///
/// Numbers compare by value, so `1` and `1.0` are equal; everything else must
/// match exactly, including array order and object key sets.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| deep_equal(value, other)))
        }
        _ => false,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
        return x == y;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Whether writing `source` over `current` would change anything.
pub fn needs_write(current: Option<&DashboardDocument>, source: &DashboardDocument) -> bool {
    let empty = DashboardDocument::default();
    let normalized = normalize(current.unwrap_or(&empty), source);
    !documents_equal(&normalized, source)
}

/// Unified diff from the normalized live copy to the versioned copy.
pub fn unified_diff(
    path: &str,
    normalized_target: &DashboardDocument,
    source: &DashboardDocument,
) -> Result<String, DocumentError> {
    let old = pretty(normalized_target)?;
    let new = pretty(source)?;
    let old_header = format!("a/{path}");
    let new_header = format!("b/{path}");
    Ok(TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string())
}

fn pretty(document: &DashboardDocument) -> Result<String, DocumentError> {
    // An empty model renders as nothing so a create shows every line as added.
    if document.model().is_empty() {
        return Ok(String::new());
    }
    let mut text = serde_json::to_string_pretty(document.model())?;
    text.push('\n');
    Ok(text)
}
