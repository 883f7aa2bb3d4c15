use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Named timer slots. Each slot holds at most one live timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerSlot {
    PopupAutohide,
    SliderSample,
    ShortUp,
    ShortDown,
    BluetoothDisplay,
}

impl TimerSlot {
    pub const ALL: [TimerSlot; 5] = [
        TimerSlot::PopupAutohide,
        TimerSlot::SliderSample,
        TimerSlot::ShortUp,
        TimerSlot::ShortDown,
        TimerSlot::BluetoothDisplay,
    ];
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    deadline: Instant,
    interval: Duration,
}

/// Deadline-based timer set driven by the owning event loop.
///
/// Timers are single-shot: a due slot returns to idle when it is popped.
/// Repeating behaviour is the handler re-arming its own slot.
#[derive(Debug, Default)]
pub struct TimerSet {
    slots: BTreeMap<TimerSlot, Armed>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever is pending in `slot` and start a fresh timer.
    pub fn arm(&mut self, slot: TimerSlot, delay: Duration, now: Instant) {
        let replaced = self
            .slots
            .insert(
                slot,
                Armed {
                    deadline: now + delay,
                    interval: delay,
                },
            )
            .is_some();
        debug!(?slot, ?delay, replaced, "timer armed");
    }

    /// No-op on an idle slot.
    pub fn cancel(&mut self, slot: TimerSlot) {
        if self.slots.remove(&slot).is_some() {
            debug!(?slot, "timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for slot in TimerSlot::ALL {
            self.cancel(slot);
        }
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Interval the slot was last armed with, if it is armed.
    pub fn interval(&self, slot: TimerSlot) -> Option<Duration> {
        self.slots.get(&slot).map(|armed| armed.interval)
    }

    pub fn deadline(&self, slot: TimerSlot) -> Option<Instant> {
        self.slots.get(&slot).map(|armed| armed.deadline)
    }

    /// Earliest pending deadline across all slots.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().map(|armed| armed.deadline).min()
    }

    pub fn time_until_deadline(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Remove and return the earliest slot whose deadline has passed.
    ///
    /// Slots are popped one at a time so a handler that cancels another slot
    /// prevents that slot from firing in the same pass.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerSlot> {
        let (slot, _) = self
            .slots
            .iter()
            .filter(|(_, armed)| armed.deadline <= now)
            .min_by_key(|(_, armed)| armed.deadline)
            .map(|(slot, armed)| (*slot, *armed))?;
        self.slots.remove(&slot);
        debug!(?slot, "timer fired");
        Some(slot)
    }
}
