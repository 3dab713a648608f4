//! Collapses bursts of viewport-resize events into a bounded stream of
//! geometry recomputations: the first event recomputes immediately, further
//! events within the polling interval set a pending flag that one trailing
//! poll drains. The host owns the timer and calls `on_poll` every
//! `POLL_INTERVAL` time units while `is_polling` reports true.

/// Polling period between trailing recomputations, in host time units.
pub const POLL_INTERVAL: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOrigin {
    /// The top-level viewport. Only these events are coalesced.
    Viewport,
    /// Anything else bubbling a resize; ignored.
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Pending work was drained; recompute geometry now.
    Recompute,
    /// Nothing arrived during the last interval; the timer stops.
    Stop,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResizeCoalescer {
    polling: bool,
    pending: bool,
}

impl ResizeCoalescer {
    pub fn new() -> Self {
        ResizeCoalescer::default()
    }

    /// Reports whether the event should trigger an immediate recompute
    /// (leading edge). While the poll timer runs, events only mark work
    /// pending.
    pub fn on_resize(&mut self, origin: ResizeOrigin) -> bool {
        if origin != ResizeOrigin::Viewport {
            return false;
        }
        if self.polling {
            self.pending = true;
            return false;
        }
        self.polling = true;
        true
    }

    pub fn on_poll(&mut self) -> Poll {
        if self.pending {
            self.pending = false;
            Poll::Recompute
        } else {
            self.polling = false;
            Poll::Stop
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling
    }
}
