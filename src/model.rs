//! Scenario definition model and execution results.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Header section of a scenario document.
///
/// It is read from the raw text before any placeholder is replaced, so
/// variable values themselves never contain resolved placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// A named static value declared in the scenario header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

/// Steps section of a scenario document, read after static substitution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSteps {
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Executable scenario: a named, ordered list of steps.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<Step>,
}

/// One HTTP request / validation / retry unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub request: Request,
    #[serde(default)]
    pub validation: Validation,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    /// Set once the HTTP call has returned a response.
    #[serde(skip)]
    pub executed: bool,
    /// Response captured by the latest attempt.
    #[serde(skip)]
    pub result: Option<RequestResult>,
}

impl Step {
    /// Number of assertions reported for this step.
    ///
    /// The status assertion is always counted, declared or not.
    pub fn assertion_count(&self) -> usize {
        self.validation.body.len() + self.validation.headers.len() + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

/// Checks applied to a step response, in the order status, headers, body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Validation {
    #[serde(default)]
    pub status: Option<Assertion>,
    #[serde(default)]
    pub headers: Vec<Assertion>,
    #[serde(default)]
    pub body: Vec<Assertion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(default)]
    pub key: String,
    #[serde(rename = "assertion")]
    pub method: AssertionMethod,
    #[serde(default, deserialize_with = "scalar_string")]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionMethod {
    Equal,
    /// Accepted in definitions but never compared.
    Regex,
    NotEmpty,
}

/// Retry behaviour of a step: `attempts` retries after the first try,
/// waiting `timeout` between tries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub attempts: u32,
    #[serde(
        default = "default_retry_timeout",
        deserialize_with = "duration",
        serialize_with = "serialize_duration"
    )]
    pub timeout: Duration,
}

/// Raw response of one step execution.
#[derive(Debug, Clone, Default)]
pub struct RequestResult {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RequestResult {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of playing a whole scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub name: String,
    pub total_execution_time: Duration,
    pub total_assertions: usize,
    pub step_results: Vec<ExecuteStepResult>,
    pub success: bool,
}

/// Outcome of one step, after retries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteStepResult {
    pub name: String,
    pub assertions: usize,
    pub url: String,
    pub request_duration: Duration,
    pub duration: Duration,
    /// Retries that were still available when the final attempt ran.
    pub retries: u32,
    pub success: bool,
    /// Transport or assertion message of the final attempt.
    #[serde(default)]
    pub error: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_retry_timeout() -> Duration {
    Duration::from_secs(1)
}

/// Accept any YAML scalar where the model wants text, so `value: 200`
/// and `value: "200"` read the same.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
        Null(()),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Null(()) => String::new(),
    })
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Nanos(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Nanos(n) => Ok(Duration::from_nanos(n)),
        Raw::Text(text) => parse_duration(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid duration '{text}'"))
        }),
    }
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{}ms", value.as_millis()))
}

/// Parse a duration such as `250ms`, `1.5s` or `1m30s`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text == "0" {
        return Some(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let number: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total += number * nanos_per_unit;
    }

    Some(Duration::from_nanos(total.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("1s"), Some(Duration::from_secs(1)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("ten seconds"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("5d"), None);
    }

    #[test]
    fn test_step_deserialization_defaults() {
        let yaml = "name: ping\nrequest:\n  url: http://localhost/ping\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(step.request.method, "GET");
        assert!(step.request.body.is_empty());
        assert!(step.validation.status.is_none());
        assert!(step.retry.is_none());
        assert!(!step.executed);
        assert_eq!(step.assertion_count(), 1);
    }

    #[test]
    fn test_assertion_value_accepts_numbers() {
        let yaml = "key: ''\nassertion: equal\nvalue: 200\n";
        let assertion: Assertion = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(assertion.method, AssertionMethod::Equal);
        assert_eq!(assertion.value, "200");
    }

    #[test]
    fn test_retry_timeout_forms() {
        let retry: RetryPolicy = serde_yaml::from_str("attempts: 2\ntimeout: 10ms\n").unwrap();
        assert_eq!(retry.attempts, 2);
        assert_eq!(retry.timeout, Duration::from_millis(10));

        let retry: RetryPolicy = serde_yaml::from_str("attempts: 1\n").unwrap();
        assert_eq!(retry.timeout, Duration::from_secs(1));

        let retry: RetryPolicy = serde_yaml::from_str("attempts: 1\ntimeout: 1000\n").unwrap();
        assert_eq!(retry.timeout, Duration::from_nanos(1000));
    }

    #[test]
    fn test_unknown_assertion_method_is_rejected() {
        let yaml = "key: id\nassertion: contains\nvalue: x\n";
        assert!(serde_yaml::from_str::<Assertion>(yaml).is_err());
    }
}
