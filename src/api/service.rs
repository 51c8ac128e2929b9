//! Purpose: Share one endpoint's immutable validation tables across many sessions.
//! Exports: `ValidationService`, `DEFAULT_CHANNEL_CAPACITY`.
//! Role: Entry point for exporters: one service per endpoint, one session per stream.
//! Invariants: Sessions never share mutable state; only `Arc`-held read-only data is shared.
use std::fmt;
use std::sync::Arc;

use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

use super::stream::validate_stream;
use crate::core::endpoint::Endpoint;
use crate::core::error::Error;
use crate::core::necessity::NecessityValidation;
use crate::core::reducer::{ErrorForwarder, StreamReducer, TracingForwarder, ValidatedRequest};
use crate::core::request::RawRequest;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct ValidationService {
    endpoint: Arc<Endpoint>,
    necessity: NecessityValidation,
    forwarder: Arc<dyn ErrorForwarder>,
    channel_capacity: usize,
}

impl ValidationService {
    pub fn new(endpoint: impl Into<Arc<Endpoint>>) -> Self {
        let endpoint = endpoint.into();
        let necessity = NecessityValidation::new(&endpoint);
        Self {
            endpoint,
            necessity,
            forwarder: Arc::new(TracingForwarder),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_forwarder(mut self, forwarder: Arc<dyn ErrorForwarder>) -> Self {
        self.forwarder = forwarder;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Fresh pipeline state for one stream.
    pub fn session(&self) -> StreamReducer {
        StreamReducer::with_necessity(self.endpoint.clone(), self.necessity.clone())
            .with_forwarder(self.forwarder.clone())
    }

    /// Runs `handler` for every element of `requests` on a dedicated task.
    pub fn spawn_stream<S, R, O, F>(
        &self,
        requests: S,
        handler: F,
    ) -> ReceiverStream<Result<O, Error>>
    where
        S: Stream<Item = R> + Send + 'static,
        R: RawRequest + Send + 'static,
        O: Send + 'static,
        F: FnMut(&mut ValidatedRequest<'_, R>) -> Result<O, Error> + Send + 'static,
    {
        validate_stream(self.session(), requests, self.channel_capacity, handler)
    }
}

impl fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationService")
            .field("endpoint", &self.endpoint.name())
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}
