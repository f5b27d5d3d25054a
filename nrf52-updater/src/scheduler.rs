//! Sleep and yield hooks used while waiting on the target.
//!
//! The updater never spins without giving the rest of the system a chance
//! to run: reset holds go through [`Scheduler::sleep`] and the NVMC
//! READY-poll yields once per iteration. Injecting the scheduler keeps the
//! update path testable without real delays.

use std::time::Duration;

/// Scheduling primitives borrowed from the surrounding system.
pub trait Scheduler {
    /// Blocks the current task for at least `duration`.
    fn sleep(&mut self, duration: Duration);

    /// Gives lower-priority tasks a chance to run.
    fn yield_now(&mut self);
}

/// [`Scheduler`] backed by the host OS thread API.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn yield_now(&mut self) {
        std::thread::yield_now();
    }
}
