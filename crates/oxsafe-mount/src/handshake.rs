//! One-shot handshake between a worker thread and the thread waiting on it.
//!
//! The worker owns a [`HandshakeSender`] and reports either success or
//! failure exactly once. The controller owns the matching
//! [`HandshakeReceiver`] and blocks on a condvar until the outcome arrives.
//! Both halves are consumed by use, so a second signal cannot be expressed;
//! the shared slot still asserts it.
//!
//! A sender dropped without signalling (early return, panic unwinding
//! through the worker) resolves the handshake as [`HandshakeError::Abandoned`],
//! so the receiver never waits forever on a dead worker.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Why a handshake did not deliver a success value.
#[derive(Debug, PartialEq, Eq)]
pub enum HandshakeError<E> {
    /// The worker reported this failure.
    Failed(E),
    /// The worker went away without reporting anything.
    Abandoned,
}

enum State<T, E> {
    Pending,
    Done(Result<T, HandshakeError<E>>),
    Taken,
}

struct Slot<T, E> {
    state: Mutex<State<T, E>>,
    cond: Condvar,
}

impl<T, E> Slot<T, E> {
    fn set(&self, outcome: Result<T, HandshakeError<E>>) {
        let mut state = self.state.lock();
        assert!(
            matches!(*state, State::Pending),
            "handshake signalled more than once"
        );
        *state = State::Done(outcome);
        self.cond.notify_all();
    }
}

/// Create a connected sender/receiver pair.
pub fn handshake<T, E>() -> (HandshakeSender<T, E>, HandshakeReceiver<T, E>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(State::Pending),
        cond: Condvar::new(),
    });
    (
        HandshakeSender {
            slot: Some(Arc::clone(&slot)),
        },
        HandshakeReceiver { slot },
    )
}

/// Worker half. Signal with [`succeed`](Self::succeed) or
/// [`fail`](Self::fail); dropping it unsignalled counts as abandonment.
pub struct HandshakeSender<T, E> {
    slot: Option<Arc<Slot<T, E>>>,
}

impl<T, E> HandshakeSender<T, E> {
    pub fn succeed(mut self, value: T) {
        if let Some(slot) = self.slot.take() {
            slot.set(Ok(value));
        }
    }

    pub fn fail(mut self, error: E) {
        if let Some(slot) = self.slot.take() {
            slot.set(Err(HandshakeError::Failed(error)));
        }
    }
}

impl<T, E> Drop for HandshakeSender<T, E> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.set(Err(HandshakeError::Abandoned));
        }
    }
}

/// Controller half.
pub struct HandshakeReceiver<T, E> {
    slot: Arc<Slot<T, E>>,
}

impl<T, E> HandshakeReceiver<T, E> {
    /// Block until the worker signals. No timeout.
    pub fn wait(self) -> Result<T, HandshakeError<E>> {
        let mut state = self.slot.state.lock();
        while matches!(*state, State::Pending) {
            self.slot.cond.wait(&mut state);
        }
        take(&mut state)
    }

    /// Like [`wait`](Self::wait), but gives the receiver back on timeout.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Result<T, HandshakeError<E>>, Self> {
        {
            let mut state = self.slot.state.lock();
            if matches!(*state, State::Pending) {
                let _ = self.slot.cond.wait_for(&mut state, timeout);
            }
            if !matches!(*state, State::Pending) {
                return Ok(take(&mut state));
            }
        }
        Err(self)
    }

    /// Whether the outcome has arrived, without blocking.
    pub fn is_signalled(&self) -> bool {
        !matches!(*self.slot.state.lock(), State::Pending)
    }
}

fn take<T, E>(state: &mut State<T, E>) -> Result<T, HandshakeError<E>> {
    match std::mem::replace(state, State::Taken) {
        State::Done(outcome) => outcome,
        State::Pending | State::Taken => unreachable!("handshake outcome taken before it was set"),
    }
}
