//! Purpose: Thread a stream of raw requests through cache, necessity and mutability layers.
//! Exports: `StreamReducer`, `ValidatedRequest`, `ErrorForwarder`, `TracingForwarder`.
//! Role: Synchronous driver that yields one validated request per stream element.
//! Invariants: Layer order is fixed: cache -> necessity -> mutability.
//! Invariants: Elements are validated strictly in arrival order; a rejected element
//! still advances the stream index.
//! Invariants: Single-request patterns reject any element after the first.
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::core::cache::{CachingRequest, RawRequestExt};
use crate::core::endpoint::{Endpoint, ParameterDescriptor};
use crate::core::error::{Error, ErrorKind};
use crate::core::metadata::{ParameterLog, logging_metadata};
use crate::core::mutability::{MutabilityValidatingRequest, MutabilityValidator};
use crate::core::necessity::{NecessityValidatingRequest, NecessityValidation};
use crate::core::request::{RawRequest, Request, RequestMetadata};

/// Receives validation failures for observability; never alters control flow.
pub trait ErrorForwarder: Send + Sync {
    fn forward(&self, endpoint: &Endpoint, error: &Error);
}

impl<F> ErrorForwarder for F
where
    F: Fn(&Endpoint, &Error) + Send + Sync,
{
    fn forward(&self, endpoint: &Endpoint, error: &Error) {
        self(endpoint, error)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingForwarder;

impl ErrorForwarder for TracingForwarder {
    fn forward(&self, endpoint: &Endpoint, error: &Error) {
        tracing::warn!(
            endpoint = %endpoint.name(),
            kind = ?error.kind(),
            parameter = error.parameter().unwrap_or_default(),
            index = error.index(),
            "request rejected: {}",
            error.message().unwrap_or("error")
        );
    }
}

type Layers<'s, R> =
    MutabilityValidatingRequest<'s, NecessityValidatingRequest<CachingRequest<R>>>;

/// A fully validated stream element, ready for handler evaluation.
pub struct ValidatedRequest<'s, R> {
    request: Layers<'s, R>,
    endpoint: Arc<Endpoint>,
    forwarder: Arc<dyn ErrorForwarder>,
    index: u64,
    parameters: ParameterLog,
    forwarded: bool,
}

impl<'s, R: RawRequest> ValidatedRequest<'s, R> {
    /// Position of this element in its stream, starting at zero.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn retrieve_named(&mut self, name: &str) -> Result<Value, Error> {
        let endpoint = self.endpoint.clone();
        let parameter = endpoint.parameter_named(name).ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message(format!(
                    "endpoint '{}' declares no parameter '{name}'",
                    endpoint.name()
                ))
                .with_parameter(name)
                .with_index(self.index)
        })?;
        self.retrieve_value(parameter)
    }

    /// Retrieves every declared parameter in declaration order.
    ///
    /// Every parameter is read even after a failure, so constant checks always
    /// run. A contract violation is reported ahead of decode failures
    /// (missing or malformed values); otherwise the first failure wins.
    pub fn resolve_all(&mut self) -> Result<Map<String, Value>, Error> {
        let endpoint = self.endpoint.clone();
        let mut resolved = Map::new();
        let mut decode_failure: Option<Error> = None;
        let mut violation: Option<Error> = None;
        for parameter in endpoint.parameters() {
            match self.retrieve_recorded(parameter) {
                Ok(value) => {
                    resolved.insert(parameter.name().to_string(), value);
                }
                Err(err) if err.decode_error().is_some() => {
                    decode_failure.get_or_insert(err);
                }
                Err(err) => {
                    violation.get_or_insert(err);
                }
            }
        }
        match violation.or(decode_failure) {
            Some(err) => {
                self.forward(&err);
                Err(err)
            }
            None => Ok(resolved),
        }
    }

    /// Whether a failure of this element already reached the error forwarder.
    pub fn forwarded(&self) -> bool {
        self.forwarded
    }

    pub fn logging_metadata(&self) -> Map<String, Value> {
        logging_metadata(&self.endpoint, self.metadata(), &self.parameters)
    }

    /// Gives up on this element without committing its constant values.
    pub fn abandon(self) {
        self.request.abandon();
    }

    fn retrieve_recorded(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        match self.request.retrieve_value(parameter) {
            Ok(value) => {
                self.parameters.record(parameter.name(), &value);
                Ok(value)
            }
            Err(err) => Err(err.with_index(self.index)),
        }
    }

    fn forward(&mut self, err: &Error) {
        self.forwarder.forward(&self.endpoint, err);
        self.forwarded = true;
    }
}

impl<'s, R: RawRequest> Request for ValidatedRequest<'s, R> {
    /// Retrieval failures are forwarded here, whichever driver owns the element.
    /// Typed conversion and handler errors are forwarded by `StreamReducer::evaluate`.
    fn retrieve_value(&mut self, parameter: &ParameterDescriptor) -> Result<Value, Error> {
        self.retrieve_recorded(parameter).inspect_err(|err| self.forward(err))
    }

    fn metadata(&self) -> &RequestMetadata {
        self.request.metadata()
    }

    fn note_failure(&mut self) {
        self.request.note_failure();
    }
}

impl<'s, R> fmt::Debug for ValidatedRequest<'s, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedRequest")
            .field("endpoint", &self.endpoint.name())
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Per-stream pipeline instance. Owns all mutable validation state of one session.
pub struct StreamReducer {
    endpoint: Arc<Endpoint>,
    necessity: NecessityValidation,
    mutability: MutabilityValidator,
    forwarder: Arc<dyn ErrorForwarder>,
    received: u64,
}

impl StreamReducer {
    pub fn new(endpoint: Arc<Endpoint>) -> Self {
        let necessity = NecessityValidation::new(&endpoint);
        Self::with_necessity(endpoint, necessity)
    }

    /// Reuses necessity tables already computed for `endpoint`.
    pub fn with_necessity(endpoint: Arc<Endpoint>, necessity: NecessityValidation) -> Self {
        Self {
            endpoint,
            necessity,
            mutability: MutabilityValidator::new(),
            forwarder: Arc::new(TracingForwarder),
            received: 0,
        }
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn ErrorForwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Number of elements consumed so far, rejected ones included.
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn mutability(&self) -> &MutabilityValidator {
        &self.mutability
    }

    /// Wraps the next stream element in the validation layers.
    pub fn next<R: RawRequest>(&mut self, raw: R) -> Result<ValidatedRequest<'_, R>, Error> {
        let index = self.received;
        self.received += 1;
        if index > 0 && !self.endpoint.pattern().accepts_many_requests() {
            let err = Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "{} endpoint '{}' accepts a single request per stream",
                    self.endpoint.pattern().as_str(),
                    self.endpoint.name()
                ))
                .with_index(index)
                .with_hint("Open a new stream for each request.");
            self.forwarder.forward(&self.endpoint, &err);
            return Err(err);
        }
        tracing::trace!(endpoint = %self.endpoint.name(), index, "validating stream element");
        let request = self.mutability.validate(self.necessity.validate(raw.cache()));
        Ok(ValidatedRequest {
            request,
            endpoint: self.endpoint.clone(),
            forwarder: self.forwarder.clone(),
            index,
            parameters: ParameterLog::default(),
            forwarded: false,
        })
    }

    /// Validates `raw` and runs `handler` against it.
    ///
    /// Any failure marks the element failed (so constants roll back). Handler
    /// errors are forwarded unless a retrieval failure of the element already was.
    pub fn evaluate<R, O, F>(&mut self, raw: R, handler: F) -> Result<O, Error>
    where
        R: RawRequest,
        F: FnOnce(&mut ValidatedRequest<'_, R>) -> Result<O, Error>,
    {
        let mut request = self.next(raw)?;
        let index = request.index();
        match handler(&mut request) {
            Ok(output) => Ok(output),
            Err(err) => {
                request.note_failure();
                let err = if err.index().is_none() {
                    err.with_index(index)
                } else {
                    err
                };
                if !request.forwarded() {
                    request.forward(&err);
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for StreamReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReducer")
            .field("endpoint", &self.endpoint.name())
            .field("received", &self.received)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::StreamReducer;
    use crate::core::endpoint::{
        CommunicationPattern, DefaultValue, Endpoint, ParameterDescriptor, ParameterId,
    };
    use crate::core::error::{Error, ErrorKind};
    use crate::core::request::{DecodeError, RawRequest, RequestExt, RequestMetadata};
    use crate::core::value::ValueKind;
    use serde_json::{Map, Value, json};
    use std::sync::{Arc, Mutex};

    struct MapRequest {
        body: Map<String, Value>,
        metadata: RequestMetadata,
    }

    impl RawRequest for MapRequest {
        fn retrieve_raw(&mut self, parameter: &ParameterDescriptor) -> Result<Value, DecodeError> {
            self.body
                .get(parameter.name())
                .cloned()
                .ok_or_else(|| DecodeError::key_not_found(parameter.name()))
        }

        fn metadata(&self) -> &RequestMetadata {
            &self.metadata
        }
    }

    fn raw(body: Value) -> MapRequest {
        MapRequest {
            body: body.as_object().cloned().unwrap_or_default(),
            metadata: RequestMetadata::new("test"),
        }
    }

    fn endpoint(pattern: CommunicationPattern) -> Arc<Endpoint> {
        Arc::new(
            Endpoint::new(
                "search",
                pattern,
                vec![
                    ParameterDescriptor::with_id(ParameterId::from_u128(1), "name")
                        .with_kind(ValueKind::String),
                    ParameterDescriptor::with_id(ParameterId::from_u128(2), "limit")
                        .with_kind(ValueKind::Integer)
                        .constant()
                        .with_default(DefaultValue::constant(json!(10))),
                ],
            )
            .expect("endpoint"),
        )
    }

    #[test]
    fn single_request_patterns_reject_second_element() {
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::RequestResponse));
        reducer
            .next(raw(json!({"name": "a"})))
            .expect("first")
            .resolve_all()
            .expect("resolve");

        let err = reducer.next(raw(json!({"name": "b"}))).expect_err("second");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.index(), Some(1));
        assert_eq!(reducer.received(), 2);
    }

    #[test]
    fn handler_errors_are_forwarded_and_indexed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::ClientStream))
            .with_forwarder(Arc::new(move |_: &Endpoint, error: &Error| {
                sink.lock().expect("lock").push(error.to_string());
            }));

        let ok = reducer.evaluate(raw(json!({"name": "a"})), |request| {
            let name = request.endpoint().handle::<String>("name")?;
            request.retrieve(&name)
        });
        assert_eq!(ok.expect("first"), "a");

        let err = reducer
            .evaluate(raw(json!({"limit": 10})), |request| request.resolve_all())
            .expect_err("missing name");
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.parameter(), Some("name"));

        let forwarded = seen.lock().expect("lock");
        assert_eq!(forwarded.len(), 1);
        assert!(forwarded[0].contains("missing required parameter 'name'"));
    }

    #[test]
    fn retrieval_failures_outside_evaluate_are_forwarded_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::ClientStream))
            .with_forwarder(Arc::new(move |_: &Endpoint, error: &Error| {
                sink.lock().expect("lock").push(error.parameter().map(str::to_string));
            }));

        let mut request = reducer.next(raw(json!({"limit": 10}))).expect("request");
        request.retrieve_named("name").expect_err("missing name");
        assert!(request.forwarded());
        assert_eq!(seen.lock().expect("lock").as_slice(), &[Some("name".to_string())]);

        reducer
            .evaluate(raw(json!({"limit": 10})), |request| request.resolve_all())
            .expect_err("missing name again");
        assert_eq!(seen.lock().expect("lock").len(), 2);
    }

    #[test]
    fn resolve_all_reads_every_parameter_after_a_failure() {
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::ClientStream));
        reducer
            .evaluate(raw(json!({"name": "a", "limit": 3})), |request| {
                request.resolve_all()
            })
            .expect("first");

        let err = reducer
            .evaluate(raw(json!({"limit": 4})), |request| request.resolve_all())
            .expect_err("violation");
        assert_eq!(err.parameter(), Some("limit"));
        assert!(err.decode_error().is_none());

        let err = reducer
            .evaluate(raw(json!({"limit": 3})), |request| request.resolve_all())
            .expect_err("missing name");
        assert_eq!(err.parameter(), Some("name"));
        assert!(err.decode_error().is_some_and(|decode| decode.is_absence()));
    }

    #[test]
    fn failed_handler_rolls_back_constants() {
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::Bidirectional));
        let result: Result<(), Error> =
            reducer.evaluate(raw(json!({"name": "a", "limit": 3})), |request| {
                request.resolve_all()?;
                Err(Error::new(ErrorKind::Internal).with_message("handler failed"))
            });
        assert!(result.is_err());

        let mut next = reducer.next(raw(json!({"name": "b", "limit": 4}))).expect("next");
        let resolved = next.resolve_all().expect("limit never committed");
        assert_eq!(resolved["limit"], json!(4));
    }

    #[test]
    fn logging_metadata_lists_accessed_parameters() {
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::ClientStream));
        let mut request = reducer.next(raw(json!({"name": "a"}))).expect("request");
        request.retrieve_named("name").expect("name");

        let metadata = request.logging_metadata();
        let parameters = metadata["parameters"].as_object().expect("parameters");
        assert_eq!(parameters.get("name"), Some(&json!("\"a\"")));
        assert!(parameters.get("limit").is_none());
    }

    #[test]
    fn typed_retrieval_reports_malformed_values() {
        let mut reducer = StreamReducer::new(endpoint(CommunicationPattern::ClientStream));
        let mut request = reducer.next(raw(json!({"name": "a"}))).expect("request");
        let as_number = request.endpoint().handle::<u64>("name").expect("handle");
        let err = request.retrieve(&as_number).expect_err("not a number");
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert!(err.decode_error().is_some_and(|decode| !decode.is_absence()));
    }
}
