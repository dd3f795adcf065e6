//! Example: serving a stream adapter as a response body
//!
//! Every request gets a response whose body is read from a simulated
//! upstream through a `StreamBody`. DATA frames are forwarded as they are
//! read and the upstream trailers become HTTP/2 response trailers.
//!
//! Run with: cargo run --bin serve-body
//! Test with:
//!   curl -v --http2-prior-knowledge http://localhost:3000/

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use h2stream::{FrameQueue, StreamAdapter, StreamBody};
use h2stream_examples::{Ending, server_addr, spawn_upstream};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;

async fn respond(_req: Request<Incoming>) -> Result<Response<StreamBody<FrameQueue>>, Infallible> {
    let queue = FrameQueue::new();
    let stream = Arc::new(StreamAdapter::new(queue.clone()));
    spawn_upstream(queue, 5, 3, Duration::from_millis(200), Ending::Trailers);

    let end = stream.on_end();
    tokio::spawn(async move {
        match end.await {
            Ok(()) => tracing::info!("response stream complete"),
            Err(err) => tracing::warn!(error = %err, "response stream failed"),
        }
    });

    let mut response = Response::new(StreamBody::new(stream));
    response
        .headers_mut()
        .insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/plain"));
    Ok(response)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let addr = server_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("=== Example: StreamBody over HTTP/2 ===");
    println!("Server listening on http://{}", addr);
    println!();
    println!("  curl -v --http2-prior-knowledge http://localhost:{}/", addr.port());

    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let served = auto::Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(socket), service_fn(respond))
                .await;
            if let Err(err) = served {
                tracing::warn!(%peer, error = %err, "connection error");
            }
        });
    }
}
