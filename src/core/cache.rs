//! Purpose: Memoize decoded parameter values for one logical request.
//! Exports: `CachingRequest`, `RawRequestExt`.
//! Role: Innermost pipeline layer; shields exporters from repeated decode work.
//! Invariants: Only successful decodes are stored; failures are re-attempted.
//! Invariants: A cache never outlives the request it wraps.
use std::collections::HashMap;

use serde_json::Value;

use crate::core::endpoint::{ParameterDescriptor, ParameterId};
use crate::core::request::{DecodeError, RawRequest, RequestMetadata};

pub struct CachingRequest<R> {
    request: R,
    cache: HashMap<ParameterId, Value>,
}

impl<R: RawRequest> CachingRequest<R> {
    pub fn new(request: R) -> Self {
        Self {
            request,
            cache: HashMap::new(),
        }
    }

    pub fn cached(&self, id: ParameterId) -> Option<&Value> {
        self.cache.get(&id)
    }

    pub fn into_inner(self) -> R {
        self.request
    }
}

impl<R: RawRequest> RawRequest for CachingRequest<R> {
    fn retrieve_raw(&mut self, parameter: &ParameterDescriptor) -> Result<Value, DecodeError> {
        if let Some(cached) = self.cache.get(&parameter.id()) {
            return Ok(cached.clone());
        }
        // Errors stay uncached: a downstream layer may still recover from them.
        let value = self.request.retrieve_raw(parameter)?;
        self.cache.insert(parameter.id(), value.clone());
        Ok(value)
    }

    fn metadata(&self) -> &RequestMetadata {
        self.request.metadata()
    }
}

pub trait RawRequestExt: RawRequest + Sized {
    fn cache(self) -> CachingRequest<Self> {
        CachingRequest::new(self)
    }
}

impl<R: RawRequest> RawRequestExt for R {}
