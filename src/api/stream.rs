//! Purpose: Drive a stream of raw requests through a `StreamReducer` on a tokio task.
//! Exports: `validate_stream`.
//! Role: Channel-based replacement for reactive publisher chains.
//! Invariants: One task per stream; elements are evaluated one at a time, in order.
//! Invariants: Output is bounded by the channel capacity (backpressure on the producer).
//! Invariants: When the consumer goes away the task stops without committing the
//! in-flight element.
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::core::error::Error;
use crate::core::reducer::{StreamReducer, ValidatedRequest};
use crate::core::request::RawRequest;

pub fn validate_stream<S, R, O, F>(
    reducer: StreamReducer,
    requests: S,
    capacity: usize,
    mut handler: F,
) -> ReceiverStream<Result<O, Error>>
where
    S: Stream<Item = R> + Send + 'static,
    R: RawRequest + Send + 'static,
    O: Send + 'static,
    F: FnMut(&mut ValidatedRequest<'_, R>) -> Result<O, Error> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<O, Error>>(capacity.max(1));
    tokio::spawn(async move {
        let mut reducer = reducer;
        tokio::pin!(requests);
        loop {
            let raw = tokio::select! {
                _ = tx.closed() => break,
                next = requests.next() => match next {
                    Some(raw) => raw,
                    None => break,
                },
            };
            let result = reducer.evaluate(raw, &mut handler);
            if tx.send(result).await.is_err() {
                break;
            }
        }
        tracing::debug!(
            endpoint = %reducer.endpoint().name(),
            received = reducer.received(),
            "validation stream finished"
        );
    });
    ReceiverStream::new(rx)
}
