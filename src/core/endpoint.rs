//! Purpose: Static endpoint model consumed by the validation pipeline.
//! Exports: `Endpoint`, `ParameterDescriptor`, `ParameterId`, `Parameter`, `DefaultValue`,
//! `Necessity`, `Mutability`, `CommunicationPattern`.
//! Role: Read-only registry shared (via `Arc`) by every session of an endpoint.
//! Invariants: Parameter ids and names are unique within one endpoint.
//! Invariants: Nothing in this module mutates after `Endpoint::new` returns.
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::ValueKind;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ParameterId(u128);

impl ParameterId {
    /// Draws a fresh random id from the OS entropy source.
    pub fn generate() -> Result<Self, Error> {
        let mut bytes = [0u8; 16];
        getrandom::fill(&mut bytes).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("failed to generate parameter id: {err}"))
        })?;
        Ok(Self(u128::from_le_bytes(bytes)))
    }

    pub const fn from_u128(raw: u128) -> Self {
        Self(raw)
    }

    pub fn as_u128(self) -> u128 {
        self.0
    }
}

impl fmt::Debug for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParameterId({:032x})", self.0)
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Necessity {
    #[default]
    Required,
    Optional,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    Constant,
    #[default]
    Variable,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommunicationPattern {
    #[default]
    RequestResponse,
    ClientStream,
    ServiceStream,
    Bidirectional,
}

impl CommunicationPattern {
    /// Whether one logical interaction may carry more than one request.
    pub fn accepts_many_requests(self) -> bool {
        matches!(
            self,
            CommunicationPattern::ClientStream | CommunicationPattern::Bidirectional
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommunicationPattern::RequestResponse => "request-response",
            CommunicationPattern::ClientStream => "client-stream",
            CommunicationPattern::ServiceStream => "service-stream",
            CommunicationPattern::Bidirectional => "bidirectional",
        }
    }
}

/// Lazily evaluated default for a missing parameter.
#[derive(Clone)]
pub struct DefaultValue(Arc<dyn Fn() -> Value + Send + Sync>);

impl DefaultValue {
    pub fn constant(value: Value) -> Self {
        Self(Arc::new(move || value.clone()))
    }

    pub fn from_fn<F>(supplier: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(supplier))
    }

    pub fn supply(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultValue(..)")
    }
}

#[derive(Clone, Debug)]
pub struct ParameterDescriptor {
    id: ParameterId,
    name: String,
    kind: ValueKind,
    necessity: Necessity,
    mutability: Mutability,
    default: Option<DefaultValue>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        Ok(Self::with_id(ParameterId::generate()?, name))
    }

    pub fn with_id(id: ParameterId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ValueKind::Any,
            necessity: Necessity::Required,
            mutability: Mutability::Variable,
            default: None,
        }
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_necessity(mut self, necessity: Necessity) -> Self {
        self.necessity = necessity;
        self
    }

    pub fn with_mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    pub fn optional(self) -> Self {
        self.with_necessity(Necessity::Optional)
    }

    pub fn constant(self) -> Self {
        self.with_mutability(Mutability::Constant)
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn necessity(&self) -> Necessity {
        self.necessity
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn is_required(&self) -> bool {
        self.necessity == Necessity::Required
    }

    pub fn is_constant(&self) -> bool {
        self.mutability == Mutability::Constant
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }
}

impl fmt::Display for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let necessity = match self.necessity {
            Necessity::Required => "required",
            Necessity::Optional => "optional",
        };
        let mutability = match self.mutability {
            Mutability::Constant => "constant",
            Mutability::Variable => "variable",
        };
        write!(f, "{}: {} ({necessity}, {mutability})", self.name, self.kind)
    }
}

/// Typed handle used by handlers to retrieve one parameter as `T`.
pub struct Parameter<T> {
    descriptor: ParameterDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Parameter<T> {
    pub fn new(descriptor: ParameterDescriptor) -> Self {
        Self {
            descriptor,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> ParameterId {
        self.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ParameterDescriptor {
        &self.descriptor
    }
}

impl<T> Clone for Parameter<T> {
    fn clone(&self) -> Self {
        Self::new(self.descriptor.clone())
    }
}

impl<T> fmt::Debug for Parameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Parameter").field(&self.descriptor).finish()
    }
}

#[derive(Clone, Debug)]
pub struct Endpoint {
    name: String,
    pattern: CommunicationPattern,
    parameters: Vec<ParameterDescriptor>,
    by_id: HashMap<ParameterId, usize>,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        pattern: CommunicationPattern,
        parameters: Vec<ParameterDescriptor>,
    ) -> Result<Self, Error> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(
                Error::new(ErrorKind::Usage).with_message("endpoint name must not be empty")
            );
        }
        let mut by_id = HashMap::with_capacity(parameters.len());
        for (position, parameter) in parameters.iter().enumerate() {
            if parameter.name.trim().is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("parameter #{position} has an empty name")));
            }
            if parameters[..position]
                .iter()
                .any(|earlier| earlier.name == parameter.name)
            {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("duplicate parameter name '{}'", parameter.name))
                    .with_parameter(parameter.name.clone()));
            }
            if by_id.insert(parameter.id, position).is_some() {
                return Err(Error::new(ErrorKind::Internal)
                    .with_message(format!("duplicate parameter id {}", parameter.id))
                    .with_parameter(parameter.name.clone()));
            }
        }
        Ok(Self {
            name,
            pattern,
            parameters,
            by_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> CommunicationPattern {
        self.pattern
    }

    pub fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }

    pub fn parameter(&self, id: ParameterId) -> Option<&ParameterDescriptor> {
        self.by_id.get(&id).map(|&position| &self.parameters[position])
    }

    pub fn parameter_named(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    /// Typed handle for the parameter called `name`.
    pub fn handle<T>(&self, name: &str) -> Result<Parameter<T>, Error> {
        self.parameter_named(name)
            .cloned()
            .map(Parameter::new)
            .ok_or_else(|| {
                Error::new(ErrorKind::NotFound)
                    .with_message(format!(
                        "endpoint '{}' declares no parameter '{name}'",
                        self.name
                    ))
                    .with_parameter(name)
            })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.pattern.as_str())
    }
}
