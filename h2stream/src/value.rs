//! Logical stream values returned by [`StreamAdapter::read`] and the credit
//! release that accompanies each Data value.
//!
//! [`StreamAdapter::read`]: crate::StreamAdapter::read

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use h2stream_core::{BufList, StreamError};
use http::HeaderMap;

// ============================================================================
// ReleaseCredit Trait
// ============================================================================

/// Receives the byte counts consumers release, so the transport can return
/// flow-control credit to the peer (typically as WINDOW_UPDATE frames).
///
/// The unit type `()` is the no-op implementation.
pub trait ReleaseCredit: Send + Sync {
    /// Report that `bytes` of this stream's window were consumed.
    fn release(&self, bytes: usize) -> BoxFuture<'static, Result<(), StreamError>>;
}

impl ReleaseCredit for () {
    #[inline]
    fn release(&self, _bytes: usize) -> BoxFuture<'static, Result<(), StreamError>> {
        future::ready(Ok(())).boxed()
    }
}

/// A wrapper that adapts a closure to the [`ReleaseCredit`] trait.
///
/// # Example
///
/// ```
/// use h2stream::{CreditFn, StreamError};
///
/// let credit = CreditFn::new(|bytes: usize| async move {
///     println!("returning {} bytes of window", bytes);
///     Ok::<(), StreamError>(())
/// });
/// ```
pub struct CreditFn<F> {
    f: F,
}

impl<F, Fut> CreditFn<F>
where
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
    /// Create a credit callback from a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for CreditFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreditFn").finish()
    }
}

impl<F, Fut> ReleaseCredit for CreditFn<F>
where
    F: Fn(usize) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), StreamError>> + Send + 'static,
{
    fn release(&self, bytes: usize) -> BoxFuture<'static, Result<(), StreamError>> {
        (self.f)(bytes).boxed()
    }
}

// ============================================================================
// Release
// ============================================================================

/// The pending credit release of one Data value.
///
/// Obtained from [`Data::into_parts`] when the bytes need to outlive the
/// value; call [`release`](Release::release) once the bytes are consumed.
/// Dropping it unreleased frees nothing extra but the credit is never
/// returned to the peer.
#[must_use = "dropping a Release never returns its flow-control credit"]
pub struct Release {
    bytes: usize,
    credit: Arc<dyn ReleaseCredit>,
}

impl Release {
    pub(crate) fn new(bytes: usize, credit: Arc<dyn ReleaseCredit>) -> Self {
        Self { bytes, credit }
    }

    /// Flow-control bytes this release will report.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Report the consumed bytes to the credit callback.
    ///
    /// Completes immediately without calling the callback when there is
    /// nothing to report.
    pub fn release(self) -> BoxFuture<'static, Result<(), StreamError>> {
        if self.bytes == 0 {
            return future::ready(Ok(())).boxed();
        }
        self.credit.release(self.bytes)
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Release")
            .field("bytes", &self.bytes)
            .finish()
    }
}

// ============================================================================
// Data / Value
// ============================================================================

/// A run of stream payload, possibly composed from several DATA frames.
#[must_use = "a Data value must be released to return flow-control credit"]
pub struct Data {
    buf: BufList,
    end_stream: bool,
    release: Release,
}

impl Data {
    pub(crate) fn new(buf: BufList, end_stream: bool, release: Release) -> Self {
        Self {
            buf,
            end_stream,
            release,
        }
    }

    /// The composed payload.
    pub fn buf(&self) -> &BufList {
        &self.buf
    }

    /// Payload length in bytes, excluding padding.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether this is the last payload of the stream.
    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    /// Flow-control bytes (payload and padding) folded into this value.
    pub fn bytes_to_release(&self) -> usize {
        self.release.bytes()
    }

    /// Copy of the payload as one contiguous buffer.
    ///
    /// Zero-copy when the payload came from a single frame.
    pub fn to_bytes(&self) -> Bytes {
        self.buf.clone().into_bytes()
    }

    /// Split into the payload and its pending release.
    pub fn into_parts(self) -> (BufList, Release) {
        (self.buf, self.release)
    }

    /// Release this value's flow-control credit.
    pub fn release(self) -> BoxFuture<'static, Result<(), StreamError>> {
        self.release.release()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("len", &self.buf.len())
            .field("segments", &self.buf.segments())
            .field("end_stream", &self.end_stream)
            .field("release", &self.release.bytes())
            .finish()
    }
}

/// One logical event of a stream.
#[derive(Debug)]
pub enum Value {
    /// Payload bytes.
    Data(Data),
    /// Trailing headers. Always the last value of a stream.
    Trailers(HeaderMap),
}

impl Value {
    /// Whether the peer marked this value as the end of the stream.
    ///
    /// Trailers that arrived in the same batch as the final Data value are
    /// still returned by the next read.
    pub fn is_end_stream(&self) -> bool {
        match self {
            Value::Data(data) => data.is_end_stream(),
            Value::Trailers(_) => true,
        }
    }

    pub fn into_data(self) -> Option<Data> {
        match self {
            Value::Data(data) => Some(data),
            Value::Trailers(_) => None,
        }
    }

    pub fn into_trailers(self) -> Option<HeaderMap> {
        match self {
            Value::Trailers(trailers) => Some(trailers),
            Value::Data(_) => None,
        }
    }
}
