//! Purpose: Guarantee required parameters resolve, falling back to declared defaults.
//! Exports: `NecessityValidation`, `NecessityValidatingRequest`.
//! Role: Second pipeline layer; turns absence into a default, `null`, or `BadInput`.
//! Invariants: Only absence is recoverable; malformed data always surfaces as `BadInput`.
//! Invariants: A default supplier runs at most once per logical request, and only on demand.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::core::endpoint::{DefaultValue, Endpoint, ParameterDescriptor, ParameterId};
use crate::core::error::{Error, ErrorKind};
use crate::core::request::{DecodeError, RawRequest, Request, RequestMetadata};

#[derive(Debug)]
struct Tables {
    defaults: HashMap<ParameterId, DefaultValue>,
    descriptions: HashMap<ParameterId, String>,
    optional: HashSet<ParameterId>,
}

/// Per-endpoint necessity rules, computed once and shared by every session.
#[derive(Clone, Debug)]
pub struct NecessityValidation {
    tables: Arc<Tables>,
}

impl NecessityValidation {
    pub fn new(endpoint: &Endpoint) -> Self {
        let mut defaults = HashMap::new();
        let mut descriptions = HashMap::new();
        let mut optional = HashSet::new();
        for parameter in endpoint.parameters() {
            descriptions.insert(parameter.id(), parameter.name().to_string());
            if !parameter.is_required() {
                optional.insert(parameter.id());
                continue;
            }
            if let Some(default) = parameter.default_value() {
                defaults.insert(parameter.id(), default.clone());
            }
        }
        Self {
            tables: Arc::new(Tables {
                defaults,
                descriptions,
                optional,
            }),
        }
    }

    pub fn validate<R: RawRequest>(&self, request: R) -> NecessityValidatingRequest<R> {
        NecessityValidatingRequest {
            request,
            validation: self.clone(),
            resolved: HashMap::new(),
        }
    }

    pub fn has_default(&self, id: ParameterId) -> bool {
        self.tables.defaults.contains_key(&id)
    }

    fn substitute(
        &self,
        parameter: &ParameterDescriptor,
        absence: DecodeError,
    ) -> Result<Value, Error> {
        let Some(description) = self.tables.descriptions.get(&parameter.id()) else {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!(
                    "parameter '{}' is not declared by this endpoint",
                    parameter.name()
                ))
                .with_parameter(parameter.name()));
        };
        if self.tables.optional.contains(&parameter.id()) {
            return Ok(Value::Null);
        }
        match self.tables.defaults.get(&parameter.id()) {
            Some(default) => {
                tracing::debug!(parameter = %description, "substituting default value");
                Ok(default.supply())
            }
            None => Err(Error::new(ErrorKind::BadInput)
                .with_message(format!("missing required parameter '{description}'"))
                .with_parameter(description.clone())
                .with_decode(absence)),
        }
    }
}

pub struct NecessityValidatingRequest<R> {
    request: R,
    validation: NecessityValidation,
    resolved: HashMap<ParameterId, Value>,
}

impl<R: RawRequest> NecessityValidatingRequest<R> {
    pub fn inner(&self) -> &R {
        &self.request
    }

    pub fn into_inner(self) -> R {
        self.request
    }
}

impl<R: RawRequest> Request for NecessityValidatingRequest<R> {
    fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        if let Some(resolved) = self.resolved.get(&parameter.id()) {
            return Ok(resolved.clone());
        }
        match self.request.retrieve_raw(parameter) {
            Ok(value) => Ok(value),
            Err(decode) if decode.is_absence() => {
                let value = self.validation.substitute(parameter, decode)?;
                self.resolved.insert(parameter.id(), value.clone());
                Ok(value)
            }
            Err(decode) => Err(Error::from(decode)),
        }
    }

    fn metadata(&self) -> &RequestMetadata {
        self.request.metadata()
    }
}
