//! Purpose: Define the stable public Rust API boundary for paramflow.
//! Exports: Endpoint model, request capabilities, pipeline layers, drivers and errors.
//! Role: Public, additive-only surface used by exporters, handlers and the CLI.
//! Invariants: This module is the supported path to pipeline types.
//! Invariants: Internal helpers stay in `core` and are re-exported here deliberately.

mod json_request;
mod service;
mod stream;

pub use crate::core::cache::{CachingRequest, RawRequestExt};
pub use crate::core::config::{EndpointConfig, ParameterConfig};
pub use crate::core::endpoint::{
    CommunicationPattern, DefaultValue, Endpoint, Mutability, Necessity, Parameter,
    ParameterDescriptor, ParameterId,
};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::metadata::{MAX_LOGGED_PARAMETER_BYTES, ParameterLog};
pub use crate::core::mutability::{
    MutabilityRecord, MutabilityValidatingRequest, MutabilityValidator,
};
pub use crate::core::necessity::{NecessityValidatingRequest, NecessityValidation};
pub use crate::core::reducer::{ErrorForwarder, StreamReducer, TracingForwarder, ValidatedRequest};
pub use crate::core::request::{
    DecodeError, DecodeErrorKind, RawRequest, Request, RequestExt, RequestMetadata,
};
pub use crate::core::value::ValueKind;
pub use json_request::JsonRequest;
pub use service::{DEFAULT_CHANNEL_CAPACITY, ValidationService};
pub use stream::validate_stream;
