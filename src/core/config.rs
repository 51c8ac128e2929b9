//! Purpose: Describe endpoints in JSON and turn the description into an `Endpoint`.
//! Exports: `EndpointConfig`, `ParameterConfig`.
//! Role: Configuration boundary for the CLI, the demo server and fixtures.
//! Invariants: Unknown fields are rejected; omitted fields take documented defaults.
//! Invariants: A declared default must match the parameter's kind.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::endpoint::{
    CommunicationPattern, DefaultValue, Endpoint, Mutability, Necessity, ParameterDescriptor,
};
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ValueKind, describe};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub necessity: Necessity,
    #[serde(default)]
    pub mutability: Mutability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(default)]
    pub pattern: CommunicationPattern,
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

impl EndpointConfig {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        serde_json::from_str(input).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid endpoint description: {err}"))
                .with_hint("See `paramflow describe --help` for the expected layout.")
                .with_source(err)
        })
    }

    /// Validates the description and assigns fresh parameter ids.
    pub fn into_endpoint(self) -> Result<Endpoint, Error> {
        let mut parameters = Vec::with_capacity(self.parameters.len());
        for parameter in self.parameters {
            parameters.push(parameter.into_descriptor()?);
        }
        Endpoint::new(self.name, self.pattern, parameters)
    }
}

impl ParameterConfig {
    fn into_descriptor(self) -> Result<ParameterDescriptor, Error> {
        let mut descriptor = ParameterDescriptor::new(self.name)?
            .with_kind(self.kind)
            .with_necessity(self.necessity)
            .with_mutability(self.mutability);
        if let Some(default) = self.default {
            if !self.kind.matches(&default) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!(
                        "default for '{}' is {}, expected {}",
                        descriptor.name(),
                        describe(&default),
                        self.kind
                    ))
                    .with_parameter(descriptor.name()));
            }
            if self.necessity == Necessity::Optional {
                tracing::debug!(
                    parameter = %descriptor.name(),
                    "default on optional parameter is never substituted"
                );
            }
            descriptor = descriptor.with_default(DefaultValue::constant(default));
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::EndpointConfig;
    use crate::core::endpoint::{CommunicationPattern, Mutability, Necessity};
    use crate::core::error::ErrorKind;
    use crate::core::value::ValueKind;
    use serde_json::json;

    #[test]
    fn parses_full_description() {
        let config = EndpointConfig::from_json_str(
            r#"{
                "name": "search",
                "pattern": "client-stream",
                "parameters": [
                    {"name": "name", "kind": "string"},
                    {"name": "limit", "kind": "integer", "mutability": "constant", "default": 10},
                    {"name": "tag", "necessity": "optional"}
                ]
            }"#,
        )
        .expect("config");
        assert_eq!(config.pattern, CommunicationPattern::ClientStream);

        let endpoint = config.into_endpoint().expect("endpoint");
        let limit = endpoint.parameter_named("limit").expect("limit");
        assert_eq!(limit.kind(), ValueKind::Integer);
        assert_eq!(limit.mutability(), Mutability::Constant);
        assert_eq!(
            limit.default_value().map(|default| default.supply()),
            Some(json!(10))
        );
        let tag = endpoint.parameter_named("tag").expect("tag");
        assert_eq!(tag.necessity(), Necessity::Optional);
        assert_eq!(tag.kind(), ValueKind::Any);
    }

    #[test]
    fn defaults_must_match_kind() {
        let config = EndpointConfig::from_json_str(
            r#"{"name": "search", "parameters": [{"name": "limit", "kind": "integer", "default": "ten"}]}"#,
        )
        .expect("config");
        let err = config.into_endpoint().expect_err("kind mismatch");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.message(), Some("default for 'limit' is string, expected integer"));
    }

    #[test]
    fn unknown_fields_are_usage_errors() {
        let err = EndpointConfig::from_json_str(r#"{"name": "x", "paramters": []}"#)
            .expect_err("typo");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
