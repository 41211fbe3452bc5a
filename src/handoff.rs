//! Single-slot "latest value" hand-off between a producer and the pipeline.
//!
//! Publishing overwrites whatever the consumer has not picked up yet, so the
//! consumer always works on the newest frame and never drains a backlog.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct SlotState<T> {
    value: Option<T>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct Publisher<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

#[derive(Debug)]
pub struct Latest<T> {
    slot: Arc<Slot<T>>,
}

#[derive(Debug, PartialEq)]
pub enum Recv<T> {
    Value(T),
    Timeout,
    Closed,
}

pub fn latest<T>() -> (Publisher<T>, Latest<T>) {
    let slot = Arc::new(Slot {
        state: Mutex::new(SlotState {
            value: None,
            closed: false,
            dropped: 0,
        }),
        ready: Condvar::new(),
    });
    (
        Publisher {
            slot: Arc::clone(&slot),
        },
        Latest { slot },
    )
}

impl<T> Publisher<T> {
    /// Returns false once the slot is closed.
    pub fn publish(&self, value: T) -> bool {
        let mut st = self.slot.lock();
        if st.closed {
            return false;
        }
        if st.value.replace(value).is_some() {
            st.dropped += 1;
        }
        drop(st);
        self.slot.ready.notify_one();
        true
    }

    /// Wake the consumer and refuse further values.
    pub fn close(&self) {
        self.slot.lock().closed = true;
        self.slot.ready.notify_all();
    }
}

impl<T> Latest<T> {
    /// Wait up to `timeout` for a value. A value published before close is
    /// still delivered.
    pub fn recv_timeout(&self, timeout: Duration) -> Recv<T> {
        let st = self.slot.lock();
        let (mut st, _) = self
            .slot
            .ready
            .wait_timeout_while(st, timeout, |s| s.value.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        match st.value.take() {
            Some(v) => Recv::Value(v),
            None if st.closed => Recv::Closed,
            None => Recv::Timeout,
        }
    }

    /// Values overwritten before the consumer saw them.
    pub fn dropped(&self) -> u64 {
        self.slot.lock().dropped
    }
}
