//! Example: bursty upstream read through a stream adapter
//!
//! A simulated connection offers DATA frames in bursts. The consumer reads
//! the stream twice, once with the default threshold and once with a
//! larger one, and prints how many reads each needed and what the stats
//! sink saw.
//!
//! Run with: cargo run --bin burst
//! Set RUST_LOG=h2stream=trace to see every read and state transition.

use std::sync::Arc;
use std::time::Duration;

use h2stream::stats::names;
use h2stream::{FrameQueue, MemoryStats, StreamAdapter, Value};
use h2stream_examples::{Ending, spawn_upstream};

async fn run(threshold: usize, ending: Ending) -> anyhow::Result<()> {
    let stats = Arc::new(MemoryStats::new());
    let queue = FrameQueue::new();
    let stream = StreamAdapter::builder(queue.clone())
        .accumulation_threshold(threshold)
        .stats_arc(stats.clone())
        .build();

    let upstream = spawn_upstream(queue, 4, 8, Duration::from_millis(20), ending);

    let mut reads = 0;
    let mut bytes = 0;
    loop {
        let value = match stream.read().await {
            Ok(value) => value,
            Err(err) => {
                println!("  read failed: {err}");
                break;
            }
        };
        reads += 1;
        match value {
            Value::Data(data) => {
                bytes += data.len();
                let end_stream = data.is_end_stream();
                data.release().await?;
                if end_stream && stream.is_closed() {
                    break;
                }
            }
            Value::Trailers(trailers) => {
                println!("  trailers: {trailers:?}");
                break;
            }
        }
    }
    upstream.await?;

    println!("  {reads} reads, {bytes} payload bytes");
    println!("  queue depth per read: {:?}", stats.samples(names::QUEUE_DEPTH));
    println!("  bytes per accumulation: {:?}", stats.samples(names::ACCUM_BYTES));
    println!("  end: {:?}", stream.on_end().await);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== threshold 1, trailers ===");
    run(1, Ending::Trailers).await?;
    println!();
    println!("=== threshold 4, end stream ===");
    run(4, Ending::EndStream).await?;
    println!();
    println!("=== threshold 1, connection reset ===");
    run(1, Ending::Reset).await?;
    Ok(())
}
