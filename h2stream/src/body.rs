//! [`http_body::Body`] over a stream adapter.
//!
//! [`StreamBody`] lets the proxy hand an upstream stream straight to hyper
//! (or anything else speaking `http-body`) as a response body. Each Data
//! value becomes one data frame, the trailers become a trailers frame, and
//! the credit of a yielded frame is released before the next one is read.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::future::BoxFuture;
use h2stream_core::{FrameSource, StreamError};
use http_body::{Body, Frame, SizeHint};

use crate::adapter::StreamAdapter;
use crate::value::{Release, Value};

type ReadFuture = BoxFuture<'static, Result<Value, StreamError>>;
type ReleaseFuture = BoxFuture<'static, Result<(), StreamError>>;

/// A response body reading from a shared [`StreamAdapter`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use h2stream::{FrameQueue, StreamAdapter, StreamBody};
/// use h2stream_core::Frame;
/// use http_body_util::BodyExt;
///
/// # futures::executor::block_on(async {
/// let queue = FrameQueue::new();
/// queue.offer(Frame::data("hello", true));
///
/// let body = StreamBody::new(Arc::new(StreamAdapter::new(queue)));
/// let collected = body.collect().await.unwrap();
/// assert_eq!(collected.to_bytes(), "hello");
/// # });
/// ```
pub struct StreamBody<S> {
    adapter: Arc<StreamAdapter<S>>,
    read: Option<ReadFuture>,
    /// Credit of the frame last yielded, returned on the next poll.
    pending: Option<Release>,
    release: Option<ReleaseFuture>,
    done: bool,
}

impl<S> StreamBody<S>
where
    S: FrameSource + 'static,
{
    pub fn new(adapter: Arc<StreamAdapter<S>>) -> Self {
        Self {
            adapter,
            read: None,
            pending: None,
            release: None,
            done: false,
        }
    }

    /// The adapter this body reads from.
    pub fn adapter(&self) -> &Arc<StreamAdapter<S>> {
        &self.adapter
    }

    fn start_read(&self) -> ReadFuture {
        let adapter = self.adapter.clone();
        Box::pin(async move { adapter.read().await })
    }
}

impl<S> Body for StreamBody<S>
where
    S: FrameSource + 'static,
{
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        // The caller polling again means the previous frame was taken; its
        // credit goes back before the next read.
        if let Some(pending) = this.pending.take() {
            this.release = Some(pending.release());
        }
        if let Some(release) = this.release.as_mut() {
            let result = ready!(release.as_mut().poll(cx));
            this.release = None;
            if let Err(err) = result {
                this.done = true;
                this.adapter.fail(err.clone());
                return Poll::Ready(Some(Err(err)));
            }
        }

        if this.done {
            return Poll::Ready(None);
        }

        if this.read.is_none() {
            this.read = Some(this.start_read());
        }
        let Some(read) = this.read.as_mut() else {
            return Poll::Ready(None);
        };
        let result = ready!(read.as_mut().poll(cx));
        this.read = None;

        match result {
            Ok(Value::Data(data)) => {
                // Trailers may still be due after an END_STREAM Data value.
                this.done = data.is_end_stream() && this.adapter.is_closed();
                let (buf, release) = data.into_parts();
                this.pending = Some(release);
                Poll::Ready(Some(Ok(Frame::data(buf.into_bytes()))))
            }
            Ok(Value::Trailers(trailers)) => {
                this.done = true;
                Poll::Ready(Some(Ok(Frame::trailers(trailers))))
            }
            Err(err) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done && self.pending.is_none() && self.release.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::default()
    }
}

impl<S> std::fmt::Debug for StreamBody<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBody")
            .field("adapter", &self.adapter)
            .field("reading", &self.read.is_some())
            .field("pending", &self.pending.as_ref().map(Release::bytes))
            .field("releasing", &self.release.is_some())
            .field("done", &self.done)
            .finish()
    }
}
