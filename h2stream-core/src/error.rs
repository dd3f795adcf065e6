//! HTTP/2 stream error codes and types.
//!
//! This module provides the error types shared by frame producers and the
//! stream adapter:
//! - [`Reason`]: HTTP/2 error codes carried by RST_STREAM and GOAWAY
//! - [`UpstreamError`]: failures reported by the transport through `fail()`
//! - [`StreamError`]: every error a stream read, release or end signal can surface

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// HTTP/2 error codes, matching the codes defined in RFC 9113 Section 7.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum Reason {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl Reason {
    /// Get the wire name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NoError => "NO_ERROR",
            Reason::ProtocolError => "PROTOCOL_ERROR",
            Reason::InternalError => "INTERNAL_ERROR",
            Reason::FlowControlError => "FLOW_CONTROL_ERROR",
            Reason::SettingsTimeout => "SETTINGS_TIMEOUT",
            Reason::StreamClosed => "STREAM_CLOSED",
            Reason::FrameSizeError => "FRAME_SIZE_ERROR",
            Reason::RefusedStream => "REFUSED_STREAM",
            Reason::Cancel => "CANCEL",
            Reason::CompressionError => "COMPRESSION_ERROR",
            Reason::ConnectError => "CONNECT_ERROR",
            Reason::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            Reason::InadequateSecurity => "INADEQUATE_SECURITY",
            Reason::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }

    /// Map a raw error code from the wire.
    ///
    /// Unknown codes must be treated as `INTERNAL_ERROR` (RFC 9113 Section 7).
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => Reason::NoError,
            0x1 => Reason::ProtocolError,
            0x2 => Reason::InternalError,
            0x3 => Reason::FlowControlError,
            0x4 => Reason::SettingsTimeout,
            0x5 => Reason::StreamClosed,
            0x6 => Reason::FrameSizeError,
            0x7 => Reason::RefusedStream,
            0x8 => Reason::Cancel,
            0x9 => Reason::CompressionError,
            0xa => Reason::ConnectError,
            0xb => Reason::EnhanceYourCalm,
            0xc => Reason::InadequateSecurity,
            0xd => Reason::Http11Required,
            _ => Reason::InternalError,
        }
    }

    /// The raw error code.
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// Returns whether a request reset with this code may be retried.
    ///
    /// Only `REFUSED_STREAM` guarantees the peer did no processing
    /// (RFC 9113 Section 8.7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Reason::RefusedStream)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Reason`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown HTTP/2 error code")]
pub struct ParseReasonError(());

impl FromStr for Reason {
    type Err = ParseReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO_ERROR" => Ok(Reason::NoError),
            "PROTOCOL_ERROR" => Ok(Reason::ProtocolError),
            "INTERNAL_ERROR" => Ok(Reason::InternalError),
            "FLOW_CONTROL_ERROR" => Ok(Reason::FlowControlError),
            "SETTINGS_TIMEOUT" => Ok(Reason::SettingsTimeout),
            "STREAM_CLOSED" => Ok(Reason::StreamClosed),
            "FRAME_SIZE_ERROR" => Ok(Reason::FrameSizeError),
            "REFUSED_STREAM" => Ok(Reason::RefusedStream),
            "CANCEL" => Ok(Reason::Cancel),
            "COMPRESSION_ERROR" => Ok(Reason::CompressionError),
            "CONNECT_ERROR" => Ok(Reason::ConnectError),
            "ENHANCE_YOUR_CALM" => Ok(Reason::EnhanceYourCalm),
            "INADEQUATE_SECURITY" => Ok(Reason::InadequateSecurity),
            "HTTP_1_1_REQUIRED" => Ok(Reason::Http11Required),
            _ => Err(ParseReasonError(())),
        }
    }
}

/// Lifecycle position of a stream, used to describe failed transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateKind {
    Open,
    Closing,
    Closed,
}

impl StateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Open => "open",
            StateKind::Closing => "closing",
            StateKind::Closed => "closed",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by the transport that owns the connection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// The peer reset this stream with RST_STREAM.
    #[error("stream reset by peer: {0}")]
    Reset(Reason),

    /// The underlying connection was reset.
    #[error("connection reset")]
    ConnectionReset,

    /// The peer sent GOAWAY and this stream will not complete.
    #[error("connection going away: {0}")]
    GoAway(Reason),

    /// Any other transport failure (I/O error, TLS failure, ...).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by stream reads, releases and the end-of-stream signal.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A read was attempted after the stream reached its terminal state.
    #[error("stream closed")]
    StreamClosed,

    /// A frame shape that cannot be classified as payload or trailers.
    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// A state transition found the stream in an unexpected state.
    #[error("invalid state transition: expected {expected}, found {found}")]
    InvalidStateTransition { expected: StateKind, found: StateKind },

    /// The stream entered `Closing` without pending trailers.
    #[error("closing stream has no pending trailers")]
    MissingTrailers,

    /// An accumulation pass over a non-empty batch produced nothing.
    #[error("accumulation produced neither data nor trailers")]
    EmptyAccumulation,

    /// The transport failed the stream.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The flow-control credit callback failed.
    #[error("credit release failed: {0}")]
    Credit(String),
}

impl StreamError {
    /// Create an unexpected-frame error.
    pub fn unexpected_frame<S: Into<String>>(message: S) -> Self {
        StreamError::UnexpectedFrame(message.into())
    }

    /// Create a credit error.
    pub fn credit<S: Into<String>>(message: S) -> Self {
        StreamError::Credit(message.into())
    }

    /// Get the HTTP/2 error code to reset the stream with.
    ///
    /// Upstream failures report the code the peer sent; local failures map to:
    /// - StreamClosed: `STREAM_CLOSED`
    /// - UnexpectedFrame: `PROTOCOL_ERROR`
    /// - Credit: `FLOW_CONTROL_ERROR`
    /// - internal invariant violations: `INTERNAL_ERROR`
    pub fn reason(&self) -> Reason {
        match self {
            StreamError::StreamClosed => Reason::StreamClosed,
            StreamError::UnexpectedFrame(_) => Reason::ProtocolError,
            StreamError::InvalidStateTransition { .. }
            | StreamError::MissingTrailers
            | StreamError::EmptyAccumulation => Reason::InternalError,
            StreamError::Upstream(UpstreamError::Reset(reason))
            | StreamError::Upstream(UpstreamError::GoAway(reason)) => *reason,
            StreamError::Upstream(UpstreamError::ConnectionReset) => Reason::ConnectError,
            StreamError::Upstream(UpstreamError::Transport(_)) => Reason::InternalError,
            StreamError::Credit(_) => Reason::FlowControlError,
        }
    }

    /// Whether this error came from the transport rather than this stream.
    pub fn is_upstream(&self) -> bool {
        matches!(self, StreamError::Upstream(_))
    }

    /// Whether this error signals a broken internal invariant.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidStateTransition { .. }
                | StreamError::MissingTrailers
                | StreamError::EmptyAccumulation
        )
    }

    /// Returns whether the request that produced this error may be retried.
    ///
    /// This is a convenience wrapper for [`Reason::is_retryable()`].
    pub fn is_retryable(&self) -> bool {
        self.is_upstream() && self.reason().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_as_str() {
        assert_eq!(Reason::NoError.as_str(), "NO_ERROR");
        assert_eq!(Reason::RefusedStream.as_str(), "REFUSED_STREAM");
        assert_eq!(Reason::Http11Required.as_str(), "HTTP_1_1_REQUIRED");
    }

    #[test]
    fn test_reason_from_str() {
        assert_eq!("CANCEL".parse(), Ok(Reason::Cancel));
        assert_eq!("ENHANCE_YOUR_CALM".parse(), Ok(Reason::EnhanceYourCalm));
        assert_eq!("cancel".parse::<Reason>(), Err(ParseReasonError(())));
    }

    #[test]
    fn test_reason_from_u32_unknown_is_internal() {
        assert_eq!(Reason::from_u32(0x7), Reason::RefusedStream);
        assert_eq!(Reason::from_u32(0xff), Reason::InternalError);
        assert_eq!(Reason::Cancel.as_u32(), 0x8);
    }

    #[test]
    fn test_reason_serialize() {
        let json = serde_json::to_string(&Reason::FlowControlError).unwrap();
        assert_eq!(json, "\"FLOW_CONTROL_ERROR\"");
    }

    #[test]
    fn test_reason_is_retryable() {
        assert!(Reason::RefusedStream.is_retryable());
        assert!(!Reason::Cancel.is_retryable());
        assert!(!Reason::InternalError.is_retryable());
    }

    #[test]
    fn test_stream_error_display() {
        let err = StreamError::InvalidStateTransition {
            expected: StateKind::Open,
            found: StateKind::Closed,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: expected open, found closed"
        );

        let err = StreamError::from(UpstreamError::Reset(Reason::Cancel));
        assert_eq!(err.to_string(), "stream reset by peer: CANCEL");

        assert_eq!(StreamError::StreamClosed.to_string(), "stream closed");
    }

    #[test]
    fn test_stream_error_reason() {
        assert_eq!(StreamError::StreamClosed.reason(), Reason::StreamClosed);
        assert_eq!(
            StreamError::unexpected_frame("headers").reason(),
            Reason::ProtocolError
        );
        assert_eq!(StreamError::MissingTrailers.reason(), Reason::InternalError);
        assert_eq!(
            StreamError::from(UpstreamError::GoAway(Reason::EnhanceYourCalm)).reason(),
            Reason::EnhanceYourCalm
        );
        assert_eq!(StreamError::credit("window").reason(), Reason::FlowControlError);
    }

    #[test]
    fn test_stream_error_classification() {
        let refused = StreamError::from(UpstreamError::Reset(Reason::RefusedStream));
        assert!(refused.is_upstream());
        assert!(refused.is_retryable());
        assert!(!refused.is_internal());

        assert!(StreamError::EmptyAccumulation.is_internal());
        assert!(!StreamError::StreamClosed.is_retryable());
    }
}
