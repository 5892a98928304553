//! Dotted path resolution
//!
//! Resolves paths such as `device.metrics.temperature` against a decoded
//! JSON object, one segment at a time.

use thiserror::Error;

use super::JsonObject;

/// A path could not be resolved against an object.
///
/// This never leaves the criteria engine: a criterion whose path does not
/// resolve simply evaluates to `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("path `{path}` could not be resolved at segment `{segment}`")]
pub struct PathNotFound {
    /// Full path being resolved
    pub path: String,
    /// Segment at which resolution stopped
    pub segment: String,
}

/// Resolve a dotted path against a JSON object.
///
/// Returns the value addressed by the last segment, whatever its JSON type.
///
/// # Errors
///
/// Returns [`PathNotFound`] when a segment key is absent, or when an
/// intermediate value is not an object while segments remain.
///
/// # Examples
///
/// ```
/// use queuerator::criteria::resolve;
/// use serde_json::json;
///
/// let message = json!({"a": {"b": {"c": 5}}});
/// let obj = message.as_object().unwrap();
///
/// assert_eq!(resolve("a.b.c", obj).unwrap(), &json!(5));
/// assert_eq!(resolve("a.b", obj).unwrap(), &json!({"c": 5}));
/// assert!(resolve("a.x.c", obj).is_err());
/// ```
pub fn resolve<'a>(path: &str, obj: &'a JsonObject) -> Result<&'a serde_json::Value, PathNotFound> {
    let not_found = |segment: &str| PathNotFound {
        path: path.to_string(),
        segment: segment.to_string(),
    };

    let mut segments = path.split('.');
    // split always yields at least one item
    let first = segments.next().unwrap_or_default();
    let mut current = obj.get(first).ok_or_else(|| not_found(first))?;

    for segment in segments {
        current = current
            .as_object()
            .and_then(|map| map.get(segment))
            .ok_or_else(|| not_found(segment))?;
    }

    Ok(current)
}
