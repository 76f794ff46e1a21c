//! Cross-step value resolution.
//!
//! A step may reference the response body of an earlier step with
//! `${steps.<step>.response.body.<json.path>}`. Placeholders are resolved
//! right before the step runs, against the steps executed so far.

use crate::error::ResolveError;
use crate::model::{Assertion, Step};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// `<step>.response.body.<key>` needs at least one key segment.
const MIN_PATH_SEGMENTS: usize = 4;
const KEY_OFFSET: usize = 3;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{steps\.([^}]*)\}")
        .expect("failed to compile step placeholder regex")
});

/// A single dynamic placeholder and the value it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InputReplacement {
    step_name: String,
    json_key: String,
    value: Option<String>,
}

/// Return a copy of `steps[index]` with every dynamic placeholder replaced.
///
/// When several steps share a name, the first declared one is used.
pub fn resolve_step(steps: &[Step], index: usize) -> Result<Step, ResolveError> {
    let step = &steps[index];
    let mut replacements = collect_placeholders(step)?;
    if replacements.is_empty() {
        return Ok(step.clone());
    }

    for (placeholder, replacement) in replacements.iter_mut() {
        let source = steps
            .iter()
            .find(|s| s.name == replacement.step_name)
            .filter(|s| s.executed)
            .ok_or_else(|| ResolveError::NonExecutedStep {
                step: step.name.clone(),
                dependency: replacement.step_name.clone(),
            })?;

        let body = source
            .result
            .as_ref()
            .map(|r| r.body_text())
            .unwrap_or_default();
        let value = lookup_text(&body, &replacement.json_key).ok_or_else(
            || ResolveError::KeyNotFound {
                step: step.name.clone(),
                key: replacement.json_key.clone(),
                body: body.clone(),
            },
        )?;
        debug!(
            step = %step.name,
            placeholder = %placeholder,
            "resolved dynamic input"
        );
        replacement.value = Some(value);
    }

    let values: Vec<(String, String)> = replacements
        .into_iter()
        .filter_map(|(k, r)| r.value.map(|v| (k, v)))
        .collect();
    let mut patched = step.clone();
    for_each_string(&mut patched, |field| {
        for (placeholder, value) in &values {
            if field.contains(placeholder.as_str()) {
                *field = field.replace(placeholder.as_str(), value);
            }
        }
    });
    Ok(patched)
}

/// Find every dynamic placeholder used by `step`, in order of appearance.
fn collect_placeholders(step: &Step) -> Result<Vec<(String, InputReplacement)>, ResolveError> {
    let mut found: Vec<(String, InputReplacement)> = Vec::new();
    let mut copy = step.clone();
    let mut error = None;

    for_each_string(&mut copy, |field| {
        if error.is_some() {
            return;
        }
        for caps in PLACEHOLDER_RE.captures_iter(field.as_str()) {
            let placeholder = caps[0].to_string();
            if found.iter().any(|(k, _)| *k == placeholder) {
                continue;
            }
            let path = &caps[1];
            let segments: Vec<&str> = path.split('.').collect();
            if segments.len() < MIN_PATH_SEGMENTS {
                error = Some(ResolveError::InvalidPath(path.to_string()));
                return;
            }
            found.push((
                placeholder,
                InputReplacement {
                    step_name: segments[0].to_string(),
                    json_key: segments[KEY_OFFSET..].join("."),
                    value: None,
                },
            ));
        }
    });

    match error {
        Some(err) => Err(err),
        None => Ok(found),
    }
}

/// Visit every user-provided string of a step.
fn for_each_string<F>(step: &mut Step, mut visit: F)
where
    F: FnMut(&mut String),
{
    visit(&mut step.name);
    visit(&mut step.request.method);
    visit(&mut step.request.url);
    visit(&mut step.request.body);
    for header in &mut step.request.headers {
        visit(&mut header.name);
        visit(&mut header.value);
    }

    let mut visit_assertion = |assertion: &mut Assertion| {
        visit(&mut assertion.key);
        visit(&mut assertion.value);
    };
    if let Some(status) = step.validation.status.as_mut() {
        visit_assertion(status);
    }
    for assertion in step
        .validation
        .headers
        .iter_mut()
        .chain(step.validation.body.iter_mut())
    {
        visit_assertion(assertion);
    }
}

/// Look up a dotted path in a JSON value. Numeric segments index arrays.
pub fn get_by_json_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Look up `path` in a JSON document and render the value as text.
///
/// Strings are returned raw, `null` as an empty string and everything
/// else as its JSON form.
pub fn lookup_text(body: &str, path: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    get_by_json_path(&json, path).map(|value| match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
