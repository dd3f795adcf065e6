//! Shared helpers for the h2stream example binaries.

use std::net::SocketAddr;
use std::time::Duration;

use h2stream::{Frame, FrameQueue, FrameSource, UpstreamError};
use http::{HeaderMap, HeaderValue};

/// Address the example servers listen on, `0.0.0.0:$PORT` (default 3000).
pub fn server_addr() -> SocketAddr {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// How a simulated upstream ends its stream.
#[derive(Clone, Copy, Debug)]
pub enum Ending {
    /// Trailers with `grpc-status: 0`.
    Trailers,
    /// END_STREAM on the last DATA frame.
    EndStream,
    /// The connection resets mid-stream.
    Reset,
}

/// Spawn a task standing in for a connection reader.
///
/// Offers `bursts` groups of `burst_len` DATA frames into `queue`, pausing
/// `gap` between groups, then ends the stream as `ending` says.
pub fn spawn_upstream(
    queue: FrameQueue,
    bursts: usize,
    burst_len: usize,
    gap: Duration,
    ending: Ending,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for burst in 0..bursts {
            for i in 0..burst_len {
                let last = burst + 1 == bursts && i + 1 == burst_len;
                let end_stream = last && matches!(ending, Ending::EndStream);
                let chunk = format!("burst {burst} frame {i}\n");
                if !queue.offer(Frame::data(chunk, end_stream)) {
                    tracing::debug!("stream failed, upstream stops");
                    return;
                }
            }
            tokio::time::sleep(gap).await;
        }

        match ending {
            Ending::Trailers => {
                let mut trailers = HeaderMap::new();
                trailers.insert("grpc-status", HeaderValue::from_static("0"));
                queue.offer(Frame::trailers(trailers));
            }
            Ending::EndStream => {}
            Ending::Reset => queue.fail(UpstreamError::ConnectionReset.into(), true),
        }
    })
}
