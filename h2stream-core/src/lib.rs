//! Core types for h2stream.
//!
//! This crate provides the types shared by the connection side that produces
//! per-stream frames and the stream adapter (`h2stream`) that consumes them.
//!
//! ## Modules
//!
//! - `error`: HTTP/2 error codes and stream error types
//! - `frame`: DATA and HEADERS frames of a single stream
//! - `buf_list`: Zero-copy composition of frame payloads
//! - `queue`: The frame source interface and its queue implementation

mod buf_list;
mod error;
mod frame;
mod queue;

pub use buf_list::*;
pub use error::*;
pub use frame::*;
pub use queue::*;
