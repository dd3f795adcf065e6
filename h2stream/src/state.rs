//! Stream lifecycle state and its compare-and-swap transitions.

use std::sync::{Mutex, MutexGuard, PoisonError};

use h2stream_core::StateKind;
use http::HeaderMap;

/// Lifecycle of one stream's receive side.
///
/// Transitions only move forward: `Open -> Closing -> Closed` or
/// `Open -> Closed`.
#[derive(Debug)]
pub(crate) enum State {
    /// Reads permitted.
    Open,
    /// A Data value was returned and these trailers are due on the next read.
    Closing(HeaderMap),
    /// Terminal.
    Closed,
}

impl State {
    pub(crate) fn kind(&self) -> StateKind {
        match self {
            State::Open => StateKind::Open,
            State::Closing(_) => StateKind::Closing,
            State::Closed => StateKind::Closed,
        }
    }
}

/// A tagged state cell whose only write is a compare-and-swap on the tag.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: Mutex<State>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::Open),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn kind(&self) -> StateKind {
        self.lock().kind()
    }

    /// Replace the state with `next` if it is currently in `expected`.
    ///
    /// On success the previous state is handed back so a pending payload
    /// (the trailers of `Closing`) can be taken out. On mismatch the state is
    /// left untouched and the kind actually found is returned.
    pub(crate) fn attempt_transition(
        &self,
        expected: StateKind,
        next: State,
    ) -> Result<State, StateKind> {
        let mut state = self.lock();
        let found = state.kind();
        if found != expected {
            return Err(found);
        }
        Ok(std::mem::replace(&mut *state, next))
    }

    /// Move to `Closed` from whatever state the stream is in.
    ///
    /// The forced close used when the stream fails: a compare-and-swap from
    /// the kind just observed, retried until it lands. Returns the kind the
    /// stream was in before.
    pub(crate) fn close(&self) -> StateKind {
        loop {
            let observed = self.kind();
            if observed == StateKind::Closed {
                return observed;
            }
            if let Ok(prev) = self.attempt_transition(observed, State::Closed) {
                return prev.kind();
            }
        }
    }
}
