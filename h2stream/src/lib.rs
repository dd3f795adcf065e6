//! HTTP/2 frame-to-stream adaptation.
//!
//! This crate turns the DATA and trailing HEADERS frames of one HTTP/2
//! stream into a sequence of logical values a proxy can consume: payload
//! runs ([`Data`]) and the final [`Trailers`](Value::Trailers).
//!
//! ## Features
//!
//! - Threshold-driven batching: shallow queues are read frame by frame,
//!   bursts are drained and coalesced into one zero-copy buffer
//! - Explicit flow-control credit: each Data value reports its consumed
//!   bytes to a [`ReleaseCredit`] callback when released
//! - A compare-and-swap lifecycle (`Open`, `Closing`, `Closed`) with a
//!   single-assignment end-of-stream signal
//! - [`StreamBody`], an `http_body::Body` for handing streams to hyper
//!
//! ## Example
//!
//! ```
//! use h2stream::{FrameQueue, StreamAdapter, Value};
//! use h2stream_core::Frame;
//! use http::HeaderMap;
//!
//! # futures::executor::block_on(async {
//! // The connection task offers frames as they arrive.
//! let queue = FrameQueue::new();
//! queue.offer(Frame::data("hello", false));
//! queue.offer(Frame::trailers(HeaderMap::new()));
//!
//! let stream = StreamAdapter::new(queue.clone());
//! while let Ok(value) = stream.read().await {
//!     match value {
//!         Value::Data(data) => {
//!             println!("{} bytes", data.len());
//!             data.release().await.unwrap();
//!         }
//!         Value::Trailers(trailers) => {
//!             println!("trailers: {:?}", trailers);
//!             break;
//!         }
//!     }
//! }
//! stream.on_end().await.unwrap();
//! # });
//! ```

mod accumulate;
mod adapter;
mod body;
mod config;
mod end;
mod state;
pub mod stats;
mod value;

pub use adapter::{StreamAdapter, StreamAdapterBuilder};
pub use body::StreamBody;
pub use config::{AdapterConfig, DEFAULT_ACCUMULATION_THRESHOLD};
pub use stats::{MemoryStats, StatsSink};
pub use value::{CreditFn, Data, Release, ReleaseCredit, Value};

// Re-export core types
pub use h2stream_core::{
    BufList, DataFrame, Frame, FrameQueue, FrameSource, HeadersFrame, Reason, StateKind,
    StreamError, UpstreamError,
};
