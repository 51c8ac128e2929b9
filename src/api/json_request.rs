//! Purpose: Reference exporter request backed by a JSON object body.
//! Exports: `JsonRequest`.
//! Role: Used by the CLI, the demo server and tests; shows the `RawRequest` contract.
//! Invariants: Missing key -> `KeyNotFound`; `null` -> `ValueNotFound`; wrong shape -> `Malformed`.
//! Invariants: Never substitutes defaults itself; that belongs to the necessity layer.
use serde_json::{Map, Value};

use crate::core::endpoint::ParameterDescriptor;
use crate::core::error::{Error, ErrorKind};
use crate::core::request::{DecodeError, RawRequest, RequestMetadata};
use crate::core::value::describe;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JsonRequest {
    body: Map<String, Value>,
    metadata: RequestMetadata,
}

impl JsonRequest {
    pub fn new(body: Map<String, Value>) -> Self {
        Self {
            body,
            metadata: RequestMetadata::default(),
        }
    }

    /// Accepts only JSON objects; any other document cannot carry named parameters.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(body) => Ok(Self::new(body)),
            other => Err(Error::new(ErrorKind::BadInput).with_message(format!(
                "request body must be an object, found {}",
                describe(&other)
            ))),
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(input).map_err(|err| {
            Error::new(ErrorKind::BadInput)
                .with_message(format!("request body is not valid JSON: {err}"))
                .with_source(err)
        })?;
        Self::from_value(value)
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }
}

impl RawRequest for JsonRequest {
    fn retrieve_raw(&mut self, parameter: &ParameterDescriptor) -> Result<Value, DecodeError> {
        let name = parameter.name();
        match self.body.get(name) {
            None => Err(DecodeError::key_not_found(name)),
            Some(Value::Null) => Err(DecodeError::value_not_found(name)),
            Some(value) if parameter.kind().matches(value) => Ok(value.clone()),
            Some(value) => Err(DecodeError::malformed(
                name,
                format!("expected {}, found {}", parameter.kind(), describe(value)),
            )),
        }
    }

    fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }
}
