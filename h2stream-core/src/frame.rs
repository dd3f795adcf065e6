//! Raw per-stream frames handed over by the transport.
//!
//! Frames arrive already decoded: DATA payloads as [`Bytes`] views into the
//! connection's read buffers and HEADERS blocks as a decoded [`HeaderMap`].

use std::fmt;

use bytes::Bytes;
use http::HeaderMap;

/// A DATA frame.
#[derive(Clone, PartialEq, Eq)]
pub struct DataFrame {
    /// Payload bytes, padding already stripped.
    payload: Bytes,
    /// Padding length, including the pad length octet.
    padding: usize,
    /// Whether END_STREAM was set.
    end_stream: bool,
}

impl DataFrame {
    /// Create a DATA frame without padding.
    pub fn new(payload: Bytes, end_stream: bool) -> Self {
        Self {
            payload,
            padding: 0,
            end_stream,
        }
    }

    /// Set the padding that was stripped from this frame.
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    /// Bytes this frame consumed from the flow-control window.
    ///
    /// Padding counts against the window (RFC 9113 Section 6.1), so it has
    /// to be credited back along with the payload.
    pub fn flow_len(&self) -> usize {
        self.payload.len() + self.padding
    }

    /// Take the payload out of the frame.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame")
            .field("len", &self.payload.len())
            .field("padding", &self.padding)
            .field("end_stream", &self.end_stream)
            .finish()
    }
}

/// A HEADERS block that arrived after the stream's initial headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadersFrame {
    headers: HeaderMap,
    end_stream: bool,
}

impl HeadersFrame {
    pub fn new(headers: HeaderMap, end_stream: bool) -> Self {
        Self {
            headers,
            end_stream,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    /// Whether this block is a trailer section.
    ///
    /// A header block in the body phase can only legally be trailers, which
    /// must carry END_STREAM (RFC 9113 Section 8.1).
    pub fn is_trailers(&self) -> bool {
        self.end_stream
    }

    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }
}

/// One frame of a single stream's body phase, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A DATA frame.
    Data(DataFrame),
    /// A HEADERS frame.
    Headers(HeadersFrame),
}

impl Frame {
    /// Create a DATA frame without padding.
    pub fn data(payload: impl Into<Bytes>, end_stream: bool) -> Self {
        Frame::Data(DataFrame::new(payload.into(), end_stream))
    }

    /// Create a trailers frame.
    pub fn trailers(headers: HeaderMap) -> Self {
        Frame::Headers(HeadersFrame::new(headers, true))
    }

    /// Whether this frame ends the stream.
    pub fn is_end_stream(&self) -> bool {
        match self {
            Frame::Data(data) => data.is_end_stream(),
            Frame::Headers(headers) => headers.is_end_stream(),
        }
    }

    /// Short name used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Data(_) => "DATA",
            Frame::Headers(h) if h.is_trailers() => "TRAILERS",
            Frame::Headers(_) => "HEADERS",
        }
    }
}

impl From<DataFrame> for Frame {
    fn from(frame: DataFrame) -> Self {
        Frame::Data(frame)
    }
}

impl From<HeadersFrame> for Frame {
    fn from(frame: HeadersFrame) -> Self {
        Frame::Headers(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_flow_len_includes_padding() {
        let frame = DataFrame::new(Bytes::from_static(b"hello"), false).with_padding(3);
        assert_eq!(frame.flow_len(), 8);
        assert_eq!(frame.payload().len(), 5);
    }

    #[test]
    fn test_frame_kind() {
        let mut headers = HeaderMap::new();
        headers.insert("grpc-status", HeaderValue::from_static("0"));

        assert_eq!(Frame::data("x", false).kind(), "DATA");
        assert_eq!(Frame::trailers(headers.clone()).kind(), "TRAILERS");
        assert_eq!(
            Frame::Headers(HeadersFrame::new(headers, false)).kind(),
            "HEADERS"
        );
    }

    #[test]
    fn test_trailers_are_end_stream() {
        assert!(Frame::trailers(HeaderMap::new()).is_end_stream());
        assert!(!Frame::data("x", false).is_end_stream());
        assert!(Frame::data("x", true).is_end_stream());
    }

    #[test]
    fn test_data_frame_debug_hides_payload() {
        let frame = DataFrame::new(Bytes::from_static(b"secret"), true);
        let debug = format!("{:?}", frame);
        assert!(debug.contains("len: 6"));
        assert!(!debug.contains("secret"));
    }
}
