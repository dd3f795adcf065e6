//! Single-assignment end-of-stream signal.

use std::future::Future;

use h2stream_core::StreamError;
use tokio::sync::watch;

type Outcome = Option<Result<(), StreamError>>;

/// Resolved exactly once, either when the stream closes normally or with
/// the error that failed it. Later resolutions are ignored.
#[derive(Debug)]
pub(crate) struct EndSignal {
    tx: watch::Sender<Outcome>,
}

impl EndSignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Resolve the signal. Returns `false` if it was already resolved.
    pub(crate) fn resolve(&self, outcome: Result<(), StreamError>) -> bool {
        let mut outcome = Some(outcome);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = outcome.take();
            true
        })
    }

    /// The resolved outcome, if any.
    pub(crate) fn peek(&self) -> Outcome {
        self.tx.borrow().clone()
    }

    /// The failure the stream ended with, if it was failed.
    pub(crate) fn failure(&self) -> Option<StreamError> {
        match &*self.tx.borrow() {
            Some(Err(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// A future completing once the signal resolves.
    ///
    /// The future does not borrow the signal. If the signal is dropped
    /// unresolved, the stream was abandoned and the future yields
    /// `StreamClosed`.
    pub(crate) fn wait(&self) -> impl Future<Output = Result<(), StreamError>> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone().unwrap_or(Err(StreamError::StreamClosed)),
                Err(_) => Err(StreamError::StreamClosed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use h2stream_core::UpstreamError;

    #[test]
    fn test_first_resolution_wins() {
        let signal = EndSignal::new();
        assert!(signal.resolve(Err(UpstreamError::ConnectionReset.into())));
        assert!(!signal.resolve(Ok(())));
        assert!(!signal.resolve(Err(StreamError::StreamClosed)));

        assert_eq!(
            signal.peek(),
            Some(Err(UpstreamError::ConnectionReset.into()))
        );
        assert_eq!(signal.failure(), Some(UpstreamError::ConnectionReset.into()));
    }

    #[test]
    fn test_wait_pending_until_resolved() {
        let signal = EndSignal::new();
        let mut wait = Box::pin(signal.wait());
        assert!((&mut wait).now_or_never().is_none());

        signal.resolve(Ok(()));
        assert_eq!(wait.now_or_never(), Some(Ok(())));
    }

    #[test]
    fn test_wait_many_times() {
        let signal = EndSignal::new();
        signal.resolve(Ok(()));
        assert_eq!(signal.wait().now_or_never(), Some(Ok(())));
        assert_eq!(signal.wait().now_or_never(), Some(Ok(())));
        assert_eq!(signal.failure(), None);
    }

    #[test]
    fn test_dropped_unresolved_is_closed() {
        let signal = EndSignal::new();
        let wait = signal.wait();
        drop(signal);
        assert_eq!(wait.now_or_never(), Some(Err(StreamError::StreamClosed)));
    }
}
