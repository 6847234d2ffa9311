//! Time sources for the sampler and the controller.
//!
//! Settle delays are part of the controller protocol, so the controller
//! never sleeps directly; it goes through a [`Delay`]. Likewise the sampler
//! reads time through a [`Clock`]. Tests substitute [`RecordedDelay`] and
//! [`ManualClock`] to run exact sequences without real time passing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested waits instead of sleeping. Clones share the record.
#[derive(Debug, Default, Clone)]
pub struct RecordedDelay {
    waits: Rc<RefCell<Vec<Duration>>>,
}

impl RecordedDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.waits.borrow().iter().sum()
    }

    pub fn clear(&self) {
        self.waits.borrow_mut().clear();
    }
}

impl Delay for RecordedDelay {
    fn delay(&mut self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

/// The OS monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
