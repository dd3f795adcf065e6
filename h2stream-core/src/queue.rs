//! Per-stream frame queue shared between the connection reader and the
//! stream consumer.
//!
//! The connection task pushes frames with [`FrameQueue::offer`]; the stream
//! consumer pulls them through the [`FrameSource`] interface, either one at a
//! time or by draining whatever is buffered.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::StreamError;
use crate::frame::Frame;

/// Source of one stream's frames, in arrival order.
///
/// Implementations must be safe to call from the producing connection task
/// and the consuming stream task at the same time.
pub trait FrameSource: Send + Sync {
    /// Number of frames buffered right now.
    fn len(&self) -> usize;

    /// Whether no frames are buffered right now.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll for the next frame.
    ///
    /// Returns `Pending` and registers the waker when nothing is buffered.
    /// Returns the failure once the source was failed and holds no more frames.
    fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Result<Frame, StreamError>>;

    /// Take every frame buffered right now without waiting.
    ///
    /// Returns an empty batch when nothing is buffered, and the failure
    /// once the source was failed and holds no more frames.
    fn drain(&self) -> Result<Vec<Frame>, StreamError>;

    /// Fail the source. Idempotent; the first error wins.
    ///
    /// With `discard` set, buffered frames are dropped so the consumer sees
    /// the failure on its next poll.
    fn fail(&self, error: StreamError, discard: bool);
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<Frame>,
    failure: Option<StreamError>,
    waker: Option<Waker>,
}

/// Unbounded single-producer single-consumer frame queue.
///
/// Cloning yields another handle to the same queue; typically the connection
/// keeps one clone to `offer` into and the stream adapter owns the other.
///
/// # Example
///
/// ```
/// use h2stream_core::{Frame, FrameQueue, FrameSource};
///
/// let queue = FrameQueue::new();
/// assert!(queue.offer(Frame::data("hello", false)));
/// assert!(queue.offer(Frame::data("world", true)));
///
/// let batch = queue.drain().unwrap();
/// assert_eq!(batch.len(), 2);
/// assert!(queue.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct FrameQueue {
    inner: Arc<Mutex<Inner>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a frame, waking a waiting consumer.
    ///
    /// Returns `false` (dropping the frame) once the queue has failed.
    pub fn offer(&self, frame: Frame) -> bool {
        let waker = {
            let mut inner = self.lock();
            if inner.failure.is_some() {
                return false;
            }
            inner.frames.push_back(frame);
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Pop one frame if one is buffered.
    ///
    /// Returns `None` when the queue is empty and has not failed.
    pub fn try_recv(&self) -> Option<Result<Frame, StreamError>> {
        let mut inner = self.lock();
        match inner.frames.pop_front() {
            Some(frame) => Some(Ok(frame)),
            None => inner.failure.clone().map(Err),
        }
    }

    /// Wait for the next frame.
    pub async fn recv(&self) -> Result<Frame, StreamError> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Whether [`fail`](FrameSource::fail) has been called.
    pub fn is_failed(&self) -> bool {
        self.lock().failure.is_some()
    }
}

impl FrameSource for FrameQueue {
    fn len(&self) -> usize {
        self.lock().frames.len()
    }

    fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Result<Frame, StreamError>> {
        let mut inner = self.lock();
        if let Some(frame) = inner.frames.pop_front() {
            return Poll::Ready(Ok(frame));
        }
        if let Some(failure) = &inner.failure {
            return Poll::Ready(Err(failure.clone()));
        }
        match &inner.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            _ => inner.waker = Some(cx.waker().clone()),
        }
        Poll::Pending
    }

    fn drain(&self) -> Result<Vec<Frame>, StreamError> {
        let mut inner = self.lock();
        if inner.frames.is_empty()
            && let Some(failure) = &inner.failure
        {
            return Err(failure.clone());
        }
        Ok(inner.frames.drain(..).collect())
    }

    fn fail(&self, error: StreamError, discard: bool) {
        let waker = {
            let mut inner = self.lock();
            if inner.failure.is_some() {
                return;
            }
            inner.failure = Some(error);
            if discard {
                inner.frames.clear();
            }
            inner.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}
