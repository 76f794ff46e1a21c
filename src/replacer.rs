//! Static placeholder substitution, applied to the raw definition text
//! before it is parsed.

use chrono::Utc;
use std::collections::HashMap;

/// Replaces placeholders in a piece of text.
pub trait Replacer: Send + Sync {
    fn replace(&self, text: &str) -> String;
}

type ValueFn = fn() -> String;

/// Replaces built-in function calls such as `${unix()}`.
///
/// Every function is evaluated once per [`Replacer::replace`] call, so all
/// occurrences inside one document receive the same value.
pub struct FuncReplacer {
    functions: Vec<(&'static str, ValueFn)>,
}

impl FuncReplacer {
    pub fn new() -> Self {
        Self {
            functions: vec![
                ("unix()", unix as ValueFn),
                ("unixNano()", unix_nano as ValueFn),
            ],
        }
    }
}

fn unix() -> String {
    Utc::now().timestamp().to_string()
}

fn unix_nano() -> String {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .to_string()
}

impl Default for FuncReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for FuncReplacer {
    fn replace(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.functions {
            let token = format_key(name);
            if out.contains(&token) {
                out = out.replace(&token, &value());
            }
        }
        out
    }
}

/// Replaces `${key}` with a fixed value for every key in the map.
pub struct MapReplacer {
    values: HashMap<String, String>,
}

impl MapReplacer {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl Replacer for MapReplacer {
    fn replace(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (key, value) in &self.values {
            out = out.replace(&format_key(key), value);
        }
        out
    }
}

fn format_key(key: &str) -> String {
    format!("${{{key}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_is_constant_within_one_document() {
        let text = "a: ${unix()}\nb: ${unix()}\nc: ${unix()}";
        let out = FuncReplacer::new().replace(text);

        assert!(!out.contains("${unix()}"));
        let values: Vec<&str> = out
            .lines()
            .map(|l| l.split(": ").nth(1).unwrap())
            .collect();
        assert_eq!(values.len(), 3);
        assert!(values[0].parse::<i64>().unwrap() > 1_600_000_000);
        assert!(values.iter().all(|v| *v == values[0]));
    }

    #[test]
    fn test_unix_nano_is_numeric() {
        let out = FuncReplacer::new().replace("${unixNano()}");
        assert!(out.parse::<i64>().unwrap() > 1_600_000_000_000_000_000);
    }

    #[test]
    fn test_unknown_function_is_left_alone() {
        let out = FuncReplacer::new().replace("${now()}");
        assert_eq!(out, "${now()}");
    }

    #[test]
    fn test_map_replacer() {
        let values = HashMap::from([
            ("host".to_string(), "localhost".to_string()),
            ("variables.host".to_string(), "localhost".to_string()),
        ]);
        let out = MapReplacer::new(values)
            .replace("http://${host}/a http://${variables.host}/b ${other}");

        assert_eq!(out, "http://localhost/a http://localhost/b ${other}");
    }
}
