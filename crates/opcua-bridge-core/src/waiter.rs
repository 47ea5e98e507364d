//! Single-assignment value with any number of waiting readers.
//!
//! A [`Waiter`] stands in for a resource that is still being established.
//! Readers call [`Waiter::get`] and are suspended until the single writer
//! calls [`Waiter::set`]; from then on every reader gets the value
//! immediately.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

enum State<T> {
    Pending(VecDeque<oneshot::Sender<T>>),
    Ready(T),
}

/// Single-assignment, multi-reader future.
pub struct Waiter<T> {
    state: Mutex<State<T>>,
}

impl<T: Clone> Waiter<T> {
    /// Create an unset waiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending(VecDeque::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the value.
    ///
    /// Returns immediately once the value is set.
    pub async fn get(&self) -> T {
        loop {
            let receiver = {
                let mut state = self.lock();
                match &mut *state {
                    State::Ready(value) => return value.clone(),
                    State::Pending(waiting) => {
                        let (tx, rx) = oneshot::channel();
                        waiting.push_back(tx);
                        rx
                    }
                }
            };

            // A dropped sender means `set` ran; the next pass sees `Ready`.
            if let Ok(value) = receiver.await {
                return value;
            }
        }
    }

    /// The value, if already set.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        match &*self.lock() {
            State::Ready(value) => Some(value.clone()),
            State::Pending(_) => None,
        }
    }

    /// Whether the value has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(&*self.lock(), State::Ready(_))
    }

    /// Number of readers currently suspended in [`Waiter::get`].
    #[must_use]
    pub fn waiting(&self) -> usize {
        match &*self.lock() {
            State::Pending(waiting) => waiting.iter().filter(|tx| !tx.is_closed()).count(),
            State::Ready(_) => 0,
        }
    }

    /// Assign the value and release all waiting readers in arrival order.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::AlreadySet`] carrying the rejected value if the
    /// waiter was already assigned.
    pub fn set(&self, value: T) -> Result<(), WaiterError<T>> {
        let waiting = {
            let mut state = self.lock();
            if matches!(&*state, State::Ready(_)) {
                return Err(WaiterError::AlreadySet(value));
            }
            match std::mem::replace(&mut *state, State::Ready(value.clone())) {
                State::Pending(waiting) => waiting,
                State::Ready(_) => VecDeque::new(),
            }
        };

        for tx in waiting {
            // Readers that gave up have dropped their receiver.
            let _ = tx.send(value.clone());
        }

        Ok(())
    }
}

impl<T: Clone> Default for Waiter<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by [`Waiter`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaiterError<T> {
    /// The waiter already holds a value
    #[error("waiter value already set")]
    AlreadySet(T),
}
