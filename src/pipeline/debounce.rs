//! Latest-intent-wins coalescing of parameter changes
//!
//! Time is passed in by the caller, so the coalescer never reads a clock or
//! sleeps.

use std::time::{Duration, Instant};

/// Holds at most one pending intent and releases it after a quiet period
#[derive(Debug, Clone)]
pub struct IntentCoalescer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> IntentCoalescer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace any pending intent and restart the quiet window
    ///
    /// Returns the superseded intent, if there was one.
    pub fn submit(&mut self, intent: T, now: Instant) -> Option<T> {
        self.pending
            .replace((intent, now))
            .map(|(superseded, _)| superseded)
    }

    /// Take the pending intent once the window has elapsed since the last submit
    pub fn take_ready(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.pending.take().map(|(intent, _)| intent),
            _ => None,
        }
    }

    /// Instant at which the pending intent becomes ready
    pub fn deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .map(|(_, submitted)| *submitted + self.window)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending intent without delivering it
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(intent, _)| intent)
    }
}
