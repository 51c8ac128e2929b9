//! Purpose: Request capabilities shared by exporters and pipeline layers.
//! Exports: `RawRequest`, `Request`, `RequestExt`, `DecodeError`, `DecodeErrorKind`,
//! `RequestMetadata`.
//! Role: `RawRequest` is what exporters implement; `Request` is what handlers consume.
//! Invariants: Absence (`KeyNotFound`/`ValueNotFound`) and `Malformed` never merge.
//! Invariants: Metadata passes through every layer untouched.
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::net::SocketAddr;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::endpoint::{Parameter, ParameterDescriptor};
use crate::core::error::Error;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeErrorKind {
    KeyNotFound,
    ValueNotFound,
    Malformed,
}

/// Outcome of an exporter failing to produce a parameter value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The request carries no entry for the parameter at all.
    KeyNotFound { parameter: String },
    /// The entry exists but holds no value (e.g. JSON `null`).
    ValueNotFound { parameter: String },
    /// Data is present but cannot be read as the declared type.
    Malformed { parameter: String, reason: String },
}

impl DecodeError {
    pub fn key_not_found(parameter: impl Into<String>) -> Self {
        DecodeError::KeyNotFound {
            parameter: parameter.into(),
        }
    }

    pub fn value_not_found(parameter: impl Into<String>) -> Self {
        DecodeError::ValueNotFound {
            parameter: parameter.into(),
        }
    }

    pub fn malformed(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::KeyNotFound { .. } => DecodeErrorKind::KeyNotFound,
            DecodeError::ValueNotFound { .. } => DecodeErrorKind::ValueNotFound,
            DecodeError::Malformed { .. } => DecodeErrorKind::Malformed,
        }
    }

    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            DecodeError::KeyNotFound { .. } | DecodeError::ValueNotFound { .. }
        )
    }

    pub fn parameter(&self) -> &str {
        match self {
            DecodeError::KeyNotFound { parameter }
            | DecodeError::ValueNotFound { parameter }
            | DecodeError::Malformed { parameter, .. } => parameter,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::KeyNotFound { parameter } => {
                write!(f, "no entry for parameter '{parameter}'")
            }
            DecodeError::ValueNotFound { parameter } => {
                write!(f, "no value for parameter '{parameter}'")
            }
            DecodeError::Malformed { parameter, reason } => {
                write!(f, "malformed value for parameter '{parameter}': {reason}")
            }
        }
    }
}

impl StdError for DecodeError {}

/// Exporter-provided context about where a request came from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestMetadata {
    pub remote_address: Option<SocketAddr>,
    pub information: BTreeMap<String, String>,
    pub description: String,
}

impl RequestMetadata {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_remote_address(mut self, address: SocketAddr) -> Self {
        self.remote_address = Some(address);
        self
    }

    pub fn with_information(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.information.insert(key.into(), value.into());
        self
    }
}

/// Exporter-facing capability: produce a raw value or say why it could not.
pub trait RawRequest {
    fn retrieve_raw(&mut self, parameter: &ParameterDescriptor) -> Result<Value, DecodeError>;

    fn metadata(&self) -> &RequestMetadata;
}

impl<R: RawRequest + ?Sized> RawRequest for &mut R {
    fn retrieve_raw(&mut self, parameter: &ParameterDescriptor) -> Result<Value, DecodeError> {
        (**self).retrieve_raw(parameter)
    }

    fn metadata(&self) -> &RequestMetadata {
        (**self).metadata()
    }
}

impl<R: RawRequest + ?Sized> RawRequest for Box<R> {
    fn retrieve_raw(&mut self, parameter: &ParameterDescriptor) -> Result<Value, DecodeError> {
        (**self).retrieve_raw(parameter)
    }

    fn metadata(&self) -> &RequestMetadata {
        (**self).metadata()
    }
}

/// Handler-facing capability: values here are validated or the error is `BadInput`.
pub trait Request {
    fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error>;

    fn metadata(&self) -> &RequestMetadata;

    /// Signals a failure of the current logical request that happened outside
    /// parameter retrieval, so stateful layers can roll back.
    fn note_failure(&mut self) {}
}

impl<R: Request + ?Sized> Request for &mut R {
    fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        (**self).retrieve_value(parameter)
    }

    fn metadata(&self) -> &RequestMetadata {
        (**self).metadata()
    }

    fn note_failure(&mut self) {
        (**self).note_failure()
    }
}

impl<R: Request + ?Sized> Request for Box<R> {
    fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        (**self).retrieve_value(parameter)
    }

    fn metadata(&self) -> &RequestMetadata {
        (**self).metadata()
    }

    fn note_failure(&mut self) {
        (**self).note_failure()
    }
}

pub trait RequestExt: Request {
    /// Retrieves `parameter` and converts it to `T`.
    ///
    /// A value that does not deserialize into `T` is reported as malformed.
    fn retrieve<T: DeserializeOwned>(&mut self, parameter: &Parameter<T>) -> Result<T, Error> {
        let value = self.retrieve_value(parameter.descriptor())?;
        match serde_json::from_value(value) {
            Ok(typed) => Ok(typed),
            Err(err) => {
                self.note_failure();
                Err(Error::from(DecodeError::malformed(
                    parameter.name(),
                    err.to_string(),
                )))
            }
        }
    }
}

impl<R: Request + ?Sized> RequestExt for R {}
