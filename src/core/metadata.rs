//! Purpose: Build structured logging metadata for a validated request.
//! Exports: `ParameterLog`, `logging_metadata`, `MAX_LOGGED_PARAMETER_BYTES`.
//! Role: Lets logs and error notices show what a handler actually read.
//! Invariants: Only parameters that were retrieved appear; values are JSON-encoded strings.
//! Invariants: Oversized values are replaced, never truncated mid-document.
use serde_json::{Map, Value, json};

use crate::core::endpoint::Endpoint;
use crate::core::request::RequestMetadata;

pub const MAX_LOGGED_PARAMETER_BYTES: usize = 8192;

const TOO_LARGE: &str = "Parameter data too large";

#[derive(Clone, Debug, Default)]
pub struct ParameterLog {
    entries: Map<String, Value>,
}

impl ParameterLog {
    pub fn record(&mut self, name: &str, value: &Value) {
        let logged = match serde_json::to_string(value) {
            Ok(encoded) if encoded.len() >= MAX_LOGGED_PARAMETER_BYTES => json!(TOO_LARGE),
            Ok(encoded) => Value::String(encoded),
            Err(_) => json!("Error encoding the parameter"),
        };
        self.entries.insert(name.to_string(), logged);
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn logging_metadata(
    endpoint: &Endpoint,
    request: &RequestMetadata,
    parameters: &ParameterLog,
) -> Map<String, Value> {
    let description = request
        .description
        .replace('\n', " ")
        .trim()
        .to_string();
    let remote_address = request
        .remote_address
        .map(|address| address.to_string())
        .unwrap_or_default();
    let information = request
        .information
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect::<Map<String, Value>>();
    let endpoint_parameters = endpoint
        .parameters()
        .iter()
        .map(|parameter| Value::String(parameter.to_string()))
        .collect::<Vec<_>>();

    let mut metadata = Map::new();
    metadata.insert("request-description".to_string(), json!(description));
    metadata.insert("remoteAddress".to_string(), json!(remote_address));
    metadata.insert("information".to_string(), Value::Object(information));
    metadata.insert("endpoint".to_string(), json!(endpoint.name()));
    metadata.insert("endpointPattern".to_string(), json!(endpoint.pattern().as_str()));
    metadata.insert("endpointParameters".to_string(), Value::Array(endpoint_parameters));
    metadata.insert(
        "parameters".to_string(),
        Value::Object(parameters.entries().clone()),
    );
    metadata
}
