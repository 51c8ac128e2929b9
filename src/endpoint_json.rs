//! Purpose: Shared endpoint JSON serializers for CLI and HTTP serving paths.
//! Exports: `endpoint_json`, `parameter_json`, `error_body_json`.
//! Role: Keep endpoint and rejection envelope shapes consistent across entry points.
//! Invariants: Stable key names for v0 payloads; optional keys are omitted, never null.
//! Invariants: Default suppliers are invoked once per rendering.

use paramflow::api::{Endpoint, Error, ErrorKind, ParameterDescriptor};
use serde_json::{Map, Value, json};

pub(crate) fn endpoint_json(endpoint: &Endpoint) -> Value {
    let parameters = endpoint
        .parameters()
        .iter()
        .map(parameter_json)
        .collect::<Vec<_>>();
    json!({
        "name": endpoint.name(),
        "pattern": endpoint.pattern().as_str(),
        "parameters": parameters,
    })
}

pub(crate) fn parameter_json(parameter: &ParameterDescriptor) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), json!(parameter.id().to_string()));
    map.insert("name".to_string(), json!(parameter.name()));
    map.insert("kind".to_string(), json!(parameter.kind().as_str()));
    map.insert(
        "necessity".to_string(),
        json!(if parameter.is_required() {
            "required"
        } else {
            "optional"
        }),
    );
    map.insert(
        "mutability".to_string(),
        json!(if parameter.is_constant() {
            "constant"
        } else {
            "variable"
        }),
    );
    if let Some(default) = parameter.default_value() {
        map.insert("default".to_string(), default.supply());
    }
    Value::Object(map)
}

/// Error body shared by `check` result lines and `/v0/validate` response lines.
pub(crate) fn error_body_json(err: &Error) -> Value {
    let mut map = Map::new();
    map.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    map.insert(
        "message".to_string(),
        json!(err.message().unwrap_or(default_message(err.kind()))),
    );
    if let Some(parameter) = err.parameter() {
        map.insert("parameter".to_string(), json!(parameter));
    }
    if let Some(hint) = err.hint() {
        map.insert("hint".to_string(), json!(hint));
    }
    Value::Object(map)
}

pub(crate) fn default_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::NotFound => "not found",
        ErrorKind::BadInput => "bad input",
        ErrorKind::Io => "i/o error",
    }
}

#[cfg(test)]
mod tests {
    use super::{endpoint_json, error_body_json};
    use paramflow::api::{
        CommunicationPattern, DefaultValue, Endpoint, Error, ErrorKind, ParameterDescriptor,
        ParameterId, ValueKind,
    };
    use serde_json::json;

    #[test]
    fn endpoint_json_lists_parameters_with_ids() {
        let endpoint = Endpoint::new(
            "search",
            CommunicationPattern::ClientStream,
            vec![
                ParameterDescriptor::with_id(ParameterId::from_u128(1), "name")
                    .with_kind(ValueKind::String),
                ParameterDescriptor::with_id(ParameterId::from_u128(2), "limit")
                    .with_kind(ValueKind::Integer)
                    .constant()
                    .with_default(DefaultValue::constant(json!(10))),
            ],
        )
        .expect("endpoint");

        let value = endpoint_json(&endpoint);
        assert_eq!(value["pattern"], json!("client-stream"));
        let limit = &value["parameters"][1];
        assert_eq!(limit["id"], json!("00000000000000000000000000000002"));
        assert_eq!(limit["mutability"], json!("constant"));
        assert_eq!(limit["default"], json!(10));
        assert!(value["parameters"][0].get("default").is_none());
    }

    #[test]
    fn error_body_omits_absent_fields() {
        let err = Error::new(ErrorKind::BadInput);
        let value = error_body_json(&err);
        assert_eq!(value, json!({"kind": "BadInput", "message": "bad input"}));

        let err = Error::bad_input("missing required parameter 'name'").with_parameter("name");
        assert_eq!(error_body_json(&err)["parameter"], json!("name"));
    }
}
