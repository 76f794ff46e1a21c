//! Parsing of scenario documents into executable scenarios.

use crate::error::DefinitionError;
use crate::model::{Scenario, ScenarioSteps, TestSpec};
use crate::replacer::{FuncReplacer, MapReplacer, Replacer};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::HashMap;
use tracing::debug;

/// The only scenario type currently understood.
pub const TEST_TYPE_HTTP: &str = "http";

const VARIABLES_PREFIX: &str = "variables";

/// Decode the base64 form in which scenario specs are stored.
pub fn decode_spec(encoded: &str) -> Result<String, DefinitionError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(String::from_utf8(bytes)?)
}

/// Encode a scenario document the way it is stored.
pub fn encode_spec(text: &str) -> String {
    STANDARD.encode(text)
}

/// Parse a scenario document named `name`.
///
/// The header is read first; static placeholders (built-in functions,
/// then header variables) are replaced in the raw text; the patched text
/// is then read again for its steps.
pub fn parse_definition(name: &str, text: &str) -> Result<Scenario, DefinitionError> {
    let spec: TestSpec = serde_yaml::from_str(text)?;

    let mut content = text.to_string();
    let replacers: [Box<dyn Replacer>; 2] = [
        Box::new(FuncReplacer::new()),
        Box::new(MapReplacer::new(variables_map(&spec))),
    ];
    for replacer in &replacers {
        content = replacer.replace(&content);
    }

    let steps: ScenarioSteps = serde_yaml::from_str(&content)?;

    match spec.kind.as_str() {
        TEST_TYPE_HTTP => {
            debug!(
                scenario = name,
                version = %spec.version,
                steps = steps.steps.len(),
                "parsed http scenario"
            );
            Ok(Scenario {
                name: name.to_string(),
                steps: steps.steps,
            })
        }
        other => Err(DefinitionError::UnsupportedType(other.to_string())),
    }
}

/// Variables are addressable both as `${variables.<name>}` and `${<name>}`.
fn variables_map(spec: &TestSpec) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for variable in &spec.variables {
        values.insert(variable.name.clone(), variable.value.clone());
        values.insert(
            format!("{VARIABLES_PREFIX}.{}", variable.name),
            variable.value.clone(),
        );
    }
    values
}
