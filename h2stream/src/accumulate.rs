//! Folding a batch of frames into at most one Data and one Trailers value.

use h2stream_core::{BufList, Frame, StreamError};
use http::HeaderMap;

/// Payload folded from consecutive DATA frames.
#[derive(Debug, Default)]
pub(crate) struct AccumData {
    pub(crate) buf: BufList,
    /// Flow-control bytes: payload plus padding of every folded frame.
    pub(crate) bytes: usize,
    pub(crate) end_stream: bool,
}

/// Result of one accumulation pass.
#[derive(Debug, Default)]
pub(crate) struct StreamAccum {
    pub(crate) data: Option<AccumData>,
    pub(crate) trailers: Option<HeaderMap>,
    /// Frames found after the stream had already ended.
    pub(crate) dropped: usize,
}

impl StreamAccum {
    /// Flow-control bytes folded into the Data part.
    pub(crate) fn bytes(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.bytes)
    }
}

/// Walk `frames` in order, composing DATA payloads into one buffer.
///
/// The walk ends at a trailers frame. An END_STREAM DATA frame ends the
/// payload; trailers arriving right behind it in the same batch are still
/// picked up so they reach the consumer. Anything else after the end is a
/// peer protocol violation and is counted in `dropped`.
pub(crate) fn accumulate<I>(frames: I) -> Result<StreamAccum, StreamError>
where
    I: IntoIterator<Item = Frame>,
{
    let mut accum = StreamAccum::default();
    let mut end_stream = false;

    for frame in frames {
        if accum.trailers.is_some() {
            accum.dropped += 1;
            continue;
        }
        match frame {
            Frame::Headers(headers) if headers.is_trailers() => {
                accum.trailers = Some(headers.into_headers());
            }
            _ if end_stream => accum.dropped += 1,
            Frame::Data(frame) => {
                let data = accum.data.get_or_insert_with(AccumData::default);
                data.bytes += frame.flow_len();
                data.end_stream = frame.is_end_stream();
                end_stream = data.end_stream;
                data.buf.push(frame.into_payload());
            }
            Frame::Headers(_) => {
                return Err(StreamError::unexpected_frame(
                    "HEADERS without END_STREAM in stream body",
                ));
            }
        }
    }

    Ok(accum)
}
