//! Path-addressed tenant settings.
//!
//! The surrounding application keeps per-tenant settings in a loosely
//! typed JSON document.  The encryption core only needs to read and write
//! string leaves at dot-separated paths such as `mail.smtp.password`, so
//! that is all `SettingsStore` exposes.

use serde_json::{Map, Value};

use crate::errors::{Result, TenantEncError};
use crate::store::TenantId;

/// Read/write access to string values inside a tenant's settings document.
pub trait SettingsStore {
    /// The string at `path`, or `None` if the path is missing or does not
    /// hold a string.
    fn get_path(&self, tenant_id: TenantId, path: &str) -> Result<Option<String>>;

    /// Write `value` at `path`, creating intermediate objects as needed.
    fn set_path(&mut self, tenant_id: TenantId, path: &str, value: &str) -> Result<()>;
}

/// Split and validate a dot-separated settings path.
pub fn parse_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(TenantEncError::SettingsError(format!(
            "invalid settings path '{path}'"
        )));
    }
    Ok(segments)
}

/// Look up the string leaf at `path` in `document`.
pub fn get_string(document: &Value, path: &str) -> Result<Option<String>> {
    let mut current = document;
    for segment in parse_path(path)? {
        match current.get(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(current.as_str().map(str::to_string))
}

/// Set the string leaf at `path` in `document`.
///
/// Missing intermediate objects are created.  Traversing through an
/// existing non-object value is an error rather than a silent overwrite.
pub fn set_string(document: &mut Value, path: &str, value: &str) -> Result<()> {
    let segments = parse_path(path)?;
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| TenantEncError::SettingsError(format!("invalid settings path '{path}'")))?;

    if document.is_null() {
        *document = Value::Object(Map::new());
    }

    let mut current = document;
    for segment in parents {
        let object = current.as_object_mut().ok_or_else(|| {
            TenantEncError::SettingsError(format!(
                "cannot set '{path}': '{segment}' is inside a non-object value"
            ))
        })?;
        current = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    let object = current.as_object_mut().ok_or_else(|| {
        TenantEncError::SettingsError(format!(
            "cannot set '{path}': parent of '{leaf}' is not an object"
        ))
    })?;
    object.insert(leaf.to_string(), Value::String(value.to_string()));
    Ok(())
}
