//! The per-stream adapter turning queued frames into [`Value`]s.
//!
//! # Read path
//!
//! Each [`read`](StreamAdapter::read) samples the queue depth and then:
//!
//! - below the accumulation threshold, takes one frame (waiting for it if the
//!   queue is empty) and classifies it directly;
//! - otherwise drains every buffered frame and folds the batch into one Data
//!   value and/or one Trailers value.
//!
//! # State
//!
//! ```text
//! Open --(data + trailers in one batch)--> Closing(trailers) --(next read)--> Closed
//! Open --(END_STREAM data | trailers)--------------------------------------> Closed
//! ```
//!
//! Every transition is a compare-and-swap from an expected state; finding any
//! other state means two reads overlapped or the stream was failed meanwhile.

use std::future::{Future, poll_fn};
use std::sync::Arc;
use std::time::Instant;

use h2stream_core::{BufList, DataFrame, Frame, FrameSource, StateKind, StreamError};
use http::HeaderMap;

use crate::accumulate::accumulate;
use crate::config::AdapterConfig;
use crate::end::EndSignal;
use crate::state::{State, StateCell};
use crate::stats::{StatsSink, StreamStats};
use crate::value::{Data, Release, ReleaseCredit, Value};

/// Adapts one stream's [`FrameSource`] into a sequence of [`Value`]s.
///
/// Exactly one task should be reading at a time. [`fail`](Self::fail) and
/// [`on_end`](Self::on_end) may be called from anywhere, so the adapter is
/// usually shared behind an `Arc`.
///
/// # Example
///
/// ```
/// use h2stream::{FrameQueue, StreamAdapter, Value};
/// use h2stream_core::Frame;
///
/// # futures::executor::block_on(async {
/// let queue = FrameQueue::new();
/// queue.offer(Frame::data("hello ", false));
/// queue.offer(Frame::data("world", true));
///
/// let stream = StreamAdapter::new(queue);
/// match stream.read().await.unwrap() {
///     Value::Data(data) => {
///         assert_eq!(&data.to_bytes()[..], b"hello world");
///         assert!(data.is_end_stream());
///         data.release().await.unwrap();
///     }
///     Value::Trailers(_) => unreachable!(),
/// }
/// # });
/// ```
pub struct StreamAdapter<S> {
    source: S,
    state: StateCell,
    end: EndSignal,
    config: AdapterConfig,
    credit: Arc<dyn ReleaseCredit>,
    stats: StreamStats,
}

impl<S: FrameSource> StreamAdapter<S> {
    /// Create an adapter with the default configuration, no credit callback
    /// and no stats.
    pub fn new(source: S) -> Self {
        Self::builder(source).build()
    }

    /// Start building an adapter over `source`.
    pub fn builder(source: S) -> StreamAdapterBuilder<S> {
        StreamAdapterBuilder::new(source)
    }

    pub fn config(&self) -> AdapterConfig {
        self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StateKind {
        self.state.kind()
    }

    pub fn is_closed(&self) -> bool {
        self.state.kind() == StateKind::Closed
    }

    /// Read the next value of the stream.
    ///
    /// Waits inside the frame source when nothing is buffered. Once the
    /// stream is closed or failed, every read fails with
    /// [`StreamError::StreamClosed`].
    pub async fn read(&self) -> Result<Value, StreamError> {
        let start = Instant::now();
        let result = self.read_inner().await;
        self.stats.read_latency(start.elapsed());

        match &result {
            Ok(value) => {
                let is_trailers = matches!(value, Value::Trailers(_));
                tracing::trace!(
                    end_stream = value.is_end_stream(),
                    trailers = is_trailers,
                    "stream read"
                );
            }
            Err(StreamError::StreamClosed) => {}
            Err(err) => {
                if err.is_internal() {
                    tracing::warn!(error = %err, "stream invariant violated");
                }
                // A stream never recovers from a failed read.
                self.fail(err.clone());
            }
        }
        result
    }

    /// Fail the stream.
    ///
    /// Buffered frames are discarded, the end signal resolves with `error`
    /// unless it already resolved, and later reads fail with
    /// `StreamClosed`. Idempotent; returns without waiting for an in-flight
    /// read.
    ///
    /// Returns `true` if this call ended the stream and `false` if it had
    /// already ended, normally or by an earlier failure.
    pub fn fail(&self, error: StreamError) -> bool {
        // The signal resolves before the state closes, so a read whose
        // transition misses always finds this failure.
        let ended = self.end.resolve(Err(error.clone()));
        let prev = self.state.close();
        self.source.fail(error.clone(), true);
        if ended {
            tracing::debug!(error = %error, state = %prev, "stream failed");
        }
        ended
    }

    /// Wait for the stream to end.
    ///
    /// Resolves `Ok` once the stream reaches `Closed` normally, or with the
    /// error passed to [`fail`](Self::fail). The returned future does not
    /// borrow the adapter and may be created any number of times.
    pub fn on_end(&self) -> impl Future<Output = Result<(), StreamError>> + Send + 'static {
        self.end.wait()
    }

    /// Read the remaining stream into one buffer, releasing each Data value
    /// as it is appended.
    ///
    /// Returns the payload and the trailers, if the stream carried any.
    pub async fn read_to_end(&self) -> Result<(BufList, Option<HeaderMap>), StreamError> {
        let mut body = BufList::new();
        loop {
            match self.read().await? {
                Value::Data(data) => {
                    let end_stream = data.is_end_stream();
                    let (buf, release) = data.into_parts();
                    body.extend(buf.iter().cloned());
                    release.release().await?;
                    if end_stream && self.state.kind() == StateKind::Closed {
                        return Ok((body, None));
                    }
                }
                Value::Trailers(trailers) => return Ok((body, Some(trailers))),
            }
        }
    }

    async fn read_inner(&self) -> Result<Value, StreamError> {
        match self.state.kind() {
            StateKind::Open => self.read_open().await,
            StateKind::Closing => self.read_closing(),
            StateKind::Closed => Err(StreamError::StreamClosed),
        }
    }

    async fn read_open(&self) -> Result<Value, StreamError> {
        let depth = self.source.len();
        self.stats.queue_depth(depth);

        if !self.config.should_accumulate(depth) {
            let frame = poll_fn(|cx| self.source.poll_recv(cx)).await?;
            return self.read_one(frame);
        }

        let frames = self.source.drain()?;
        if frames.is_empty() {
            // Only another consumer could have emptied the queue since `len`.
            let frame = poll_fn(|cx| self.source.poll_recv(cx)).await?;
            return self.read_one(frame);
        }
        self.accumulate(frames)
    }

    fn read_closing(&self) -> Result<Value, StreamError> {
        match self
            .state
            .attempt_transition(StateKind::Closing, State::Closed)
        {
            Ok(State::Closing(trailers)) => {
                self.trace_transition(StateKind::Closing, StateKind::Closed);
                self.closed();
                Ok(Value::Trailers(trailers))
            }
            Ok(_) => Err(StreamError::MissingTrailers),
            Err(_) => Err(StreamError::StreamClosed),
        }
    }

    /// Fast path over a single frame.
    fn read_one(&self, frame: Frame) -> Result<Value, StreamError> {
        match frame {
            Frame::Headers(headers) if headers.is_trailers() => {
                self.transition(StateKind::Open, State::Closed)?;
                self.closed();
                Ok(Value::Trailers(headers.into_headers()))
            }
            Frame::Headers(_) => Err(StreamError::unexpected_frame(
                "HEADERS without END_STREAM in stream body",
            )),
            Frame::Data(frame) => {
                if !self.config.is_coalescing() || self.source.is_empty() {
                    return self.single(frame);
                }
                // Frames queued behind an END_STREAM frame can still carry
                // the trailers.
                match self.source.drain() {
                    Ok(rest) => {
                        let mut batch = Vec::with_capacity(rest.len() + 1);
                        batch.push(Frame::Data(frame));
                        batch.extend(rest);
                        self.accumulate(batch)
                    }
                    // The failure surfaces on the next read; this frame was
                    // already received.
                    Err(_) => self.single(frame),
                }
            }
        }
    }

    /// Return one DATA frame as its own value.
    fn single(&self, frame: DataFrame) -> Result<Value, StreamError> {
        if frame.is_end_stream() {
            self.transition(StateKind::Open, State::Closed)?;
            self.closed();
        }
        Ok(Value::Data(self.data_from_frame(frame)))
    }

    /// Full accumulation pass over a non-empty batch.
    fn accumulate(&self, frames: Vec<Frame>) -> Result<Value, StreamError> {
        let start = Instant::now();
        let accum = accumulate(frames)?;
        self.stats.accumulated(accum.bytes(), start.elapsed());

        if accum.dropped > 0 {
            tracing::warn!(
                dropped = accum.dropped,
                "dropping frames received after end of stream"
            );
            self.stats.dropped(accum.dropped);
        }

        match (accum.data, accum.trailers) {
            (Some(data), Some(trailers)) => {
                self.transition(StateKind::Open, State::Closing(trailers))?;
                Ok(Value::Data(self.data(data.buf, data.bytes, data.end_stream)))
            }
            (Some(data), None) => {
                if data.end_stream {
                    self.transition(StateKind::Open, State::Closed)?;
                    self.closed();
                }
                Ok(Value::Data(self.data(data.buf, data.bytes, data.end_stream)))
            }
            (None, Some(trailers)) => {
                self.transition(StateKind::Open, State::Closed)?;
                self.closed();
                Ok(Value::Trailers(trailers))
            }
            (None, None) => Err(StreamError::EmptyAccumulation),
        }
    }

    /// Compare-and-swap the state, mapping a mismatch to an error.
    ///
    /// A mismatch on a stream that was failed meanwhile reports that failure
    /// instead of an invariant violation.
    fn transition(&self, expected: StateKind, next: State) -> Result<(), StreamError> {
        let to = next.kind();
        match self.state.attempt_transition(expected, next) {
            Ok(_) => {
                self.trace_transition(expected, to);
                Ok(())
            }
            Err(found) => match self.end.failure() {
                Some(failure) => Err(failure),
                None => Err(StreamError::InvalidStateTransition { expected, found }),
            },
        }
    }

    fn trace_transition(&self, from: StateKind, to: StateKind) {
        tracing::trace!(%from, %to, "stream state transition");
    }

    /// Resolve the end signal after a normal close.
    fn closed(&self) {
        if self.end.resolve(Ok(())) {
            tracing::debug!("stream closed");
        }
    }

    fn data_from_frame(&self, frame: DataFrame) -> Data {
        let bytes = frame.flow_len();
        let end_stream = frame.is_end_stream();
        self.data(BufList::from(frame.into_payload()), bytes, end_stream)
    }

    fn data(&self, buf: BufList, bytes: usize, end_stream: bool) -> Data {
        Data::new(buf, end_stream, Release::new(bytes, self.credit.clone()))
    }
}

impl<S> std::fmt::Debug for StreamAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdapter")
            .field("state", &self.state.kind())
            .field("end", &self.end.peek())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`StreamAdapter`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use h2stream::{AdapterConfig, CreditFn, FrameQueue, MemoryStats, StreamAdapter, StreamError};
///
/// let stats = Arc::new(MemoryStats::new());
/// let stream = StreamAdapter::builder(FrameQueue::new())
///     .config(AdapterConfig::new().accumulation_threshold(4))
///     .credit(CreditFn::new(|_bytes: usize| async { Ok::<(), StreamError>(()) }))
///     .stats_arc(stats.clone())
///     .build();
/// assert_eq!(stream.config().get_accumulation_threshold(), 4);
/// ```
pub struct StreamAdapterBuilder<S> {
    source: S,
    config: AdapterConfig,
    credit: Arc<dyn ReleaseCredit>,
    stats: Arc<dyn StatsSink>,
}

impl<S: FrameSource> StreamAdapterBuilder<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            config: AdapterConfig::default(),
            credit: Arc::new(()),
            stats: Arc::new(()),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the accumulation threshold.
    pub fn accumulation_threshold(mut self, threshold: usize) -> Self {
        self.config = self.config.accumulation_threshold(threshold);
        self
    }

    /// Set the callback that receives released byte counts.
    pub fn credit<C: ReleaseCredit + 'static>(mut self, credit: C) -> Self {
        self.credit = Arc::new(credit);
        self
    }

    /// Set a shared credit callback.
    pub fn credit_arc(mut self, credit: Arc<dyn ReleaseCredit>) -> Self {
        self.credit = credit;
        self
    }

    /// Set the stats sink.
    pub fn stats<T: StatsSink + 'static>(mut self, stats: T) -> Self {
        self.stats = Arc::new(stats);
        self
    }

    /// Set a shared stats sink.
    pub fn stats_arc(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn build(self) -> StreamAdapter<S> {
        StreamAdapter {
            source: self.source,
            state: StateCell::new(),
            end: EndSignal::new(),
            config: self.config,
            credit: self.credit,
            stats: StreamStats::new(self.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use h2stream_core::{FrameQueue, HeadersFrame, Reason, UpstreamError};
    use http::HeaderValue;

    fn trailers() -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert("grpc-status", HeaderValue::from_static("0"));
        map
    }

    fn data(value: Value) -> Data {
        match value {
            Value::Data(data) => data,
            Value::Trailers(t) => panic!("expected data, got trailers {:?}", t),
        }
    }

    #[tokio::test]
    async fn test_fast_path_single_frame() {
        let queue = FrameQueue::new();
        queue.offer(Frame::data("abc", false));
        let stream = StreamAdapter::new(queue);

        let value = data(stream.read().await.unwrap());
        assert_eq!(value.to_bytes(), "abc");
        assert!(!value.is_end_stream());
        assert_eq!(stream.state(), StateKind::Open);
    }

    #[tokio::test]
    async fn test_fast_path_coalesces_burst_behind_frame() {
        let queue = FrameQueue::new();
        let stream = StreamAdapter::builder(queue.clone())
            .accumulation_threshold(8)
            .build();
        queue.offer(Frame::data("ab", false));
        queue.offer(Frame::data("cd", false));

        let value = data(stream.read().await.unwrap());
        assert_eq!(value.to_bytes(), "abcd");
        assert_eq!(value.buf().segments(), 2);
    }

    #[tokio::test]
    async fn test_without_coalesce_returns_one_frame() {
        let queue = FrameQueue::new();
        let stream = StreamAdapter::builder(queue.clone())
            .config(AdapterConfig::new().accumulation_threshold(8).coalesce(false))
            .build();
        queue.offer(Frame::data("ab", false));
        queue.offer(Frame::data("cd", false));

        assert_eq!(data(stream.read().await.unwrap()).to_bytes(), "ab");
        assert_eq!(data(stream.read().await.unwrap()).to_bytes(), "cd");
    }

    #[tokio::test]
    async fn test_fast_path_end_stream_keeps_queued_trailers() {
        let queue = FrameQueue::new();
        let stream = StreamAdapter::builder(queue.clone())
            .accumulation_threshold(4)
            .build();
        queue.offer(Frame::data("abc", true));
        queue.offer(Frame::trailers(trailers()));

        let first = data(stream.read().await.unwrap());
        assert!(first.is_end_stream());
        assert_eq!(stream.state(), StateKind::Closing);
        assert_eq!(stream.read().await.unwrap().into_trailers(), Some(trailers()));
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_trailers_only_closes() {
        let queue = FrameQueue::new();
        queue.offer(Frame::trailers(trailers()));
        let stream = StreamAdapter::new(queue);

        let value = stream.read().await.unwrap();
        assert_eq!(value.into_trailers(), Some(trailers()));
        assert!(stream.is_closed());
        assert_eq!(stream.on_end().await, Ok(()));
    }

    #[tokio::test]
    async fn test_data_and_trailers_defers_trailers() {
        let queue = FrameQueue::new();
        queue.offer(Frame::data("abc", false));
        queue.offer(Frame::trailers(trailers()));
        let stream = StreamAdapter::new(queue);

        let first = data(stream.read().await.unwrap());
        assert_eq!(first.bytes_to_release(), 3);
        assert_eq!(stream.state(), StateKind::Closing);
        assert!(stream.on_end().now_or_never().is_none());

        let second = stream.read().await.unwrap();
        assert_eq!(second.into_trailers(), Some(trailers()));
        assert!(stream.is_closed());
        assert_eq!(stream.on_end().await, Ok(()));
    }

    #[tokio::test]
    async fn test_unexpected_headers_fails_stream() {
        let queue = FrameQueue::new();
        queue.offer(HeadersFrame::new(trailers(), false).into());
        let stream = StreamAdapter::new(queue);

        let err = stream.read().await.unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedFrame(_)));
        assert_eq!(stream.on_end().await, Err(err));
        assert_eq!(stream.read().await.unwrap_err(), StreamError::StreamClosed);
    }

    #[tokio::test]
    async fn test_queue_failure_propagates_to_read_and_end() {
        let queue = FrameQueue::new();
        let stream = StreamAdapter::new(queue.clone());
        let reset = StreamError::from(UpstreamError::Reset(Reason::Cancel));

        queue.fail(reset.clone(), true);
        assert_eq!(stream.read().await.unwrap_err(), reset);
        assert_eq!(stream.on_end().await, Err(reset));
        assert_eq!(stream.read().await.unwrap_err(), StreamError::StreamClosed);
    }

    #[tokio::test]
    async fn test_read_after_close_fails() {
        let queue = FrameQueue::new();
        queue.offer(Frame::data("x", true));
        let stream = StreamAdapter::new(queue);

        assert!(stream.read().await.unwrap().is_end_stream());
        assert_eq!(stream.read().await.unwrap_err(), StreamError::StreamClosed);
    }

    #[tokio::test]
    async fn test_read_to_end_with_trailers() {
        let queue = FrameQueue::new();
        queue.offer(Frame::data("ab", false));
        queue.offer(Frame::data("cd", false));
        queue.offer(Frame::trailers(trailers()));
        let stream = StreamAdapter::new(queue);

        let (body, trailers_out) = stream.read_to_end().await.unwrap();
        assert_eq!(body.into_bytes(), "abcd");
        assert_eq!(trailers_out, Some(trailers()));
    }

    #[tokio::test]
    async fn test_read_to_end_eos_then_trailers() {
        let queue = FrameQueue::new();
        queue.offer(Frame::data("hello", true));
        queue.offer(Frame::trailers(trailers()));
        let stream = StreamAdapter::new(queue);

        let (body, trailers_out) = stream.read_to_end().await.unwrap();
        assert_eq!(body.into_bytes(), "hello");
        assert_eq!(trailers_out, Some(trailers()));
    }

    #[test]
    fn test_mismatched_transition_is_invariant_error() {
        let stream = StreamAdapter::new(FrameQueue::new());
        stream.state.close();

        let err = stream
            .transition(StateKind::Open, State::Closed)
            .unwrap_err();
        assert_eq!(
            err,
            StreamError::InvalidStateTransition {
                expected: StateKind::Open,
                found: StateKind::Closed,
            }
        );
    }

    #[test]
    fn test_mismatched_transition_after_fail_reports_failure() {
        let stream = StreamAdapter::new(FrameQueue::new());
        stream.fail(UpstreamError::ConnectionReset.into());

        let err = stream
            .transition(StateKind::Open, State::Closed)
            .unwrap_err();
        assert_eq!(err, UpstreamError::ConnectionReset.into());
    }

    #[tokio::test]
    async fn test_reads_logged_at_trace_level() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let queue = FrameQueue::new();
        queue.offer(Frame::data("abc", false));
        queue.offer(Frame::trailers(trailers()));
        let stream = StreamAdapter::new(queue);

        assert!(!stream.read().await.unwrap().is_end_stream());
        assert_eq!(stream.read().await.unwrap().into_trailers(), Some(trailers()));
        assert_eq!(stream.read().await.unwrap_err(), StreamError::StreamClosed);
    }

    #[tokio::test]
    async fn test_fail_acknowledges_only_first_call() {
        let stream = StreamAdapter::new(FrameQueue::new());
        assert!(stream.fail(UpstreamError::ConnectionReset.into()));
        assert!(!stream.fail(StreamError::StreamClosed));
        assert_eq!(stream.on_end().await, Err(UpstreamError::ConnectionReset.into()));
    }

    #[tokio::test]
    async fn test_fail_after_normal_close_is_not_acknowledged() {
        let queue = FrameQueue::new();
        queue.offer(Frame::data("x", true));
        let stream = StreamAdapter::new(queue);

        assert!(stream.read().await.unwrap().is_end_stream());
        assert!(!stream.fail(UpstreamError::ConnectionReset.into()));
        assert_eq!(stream.on_end().await, Ok(()));
    }
}
