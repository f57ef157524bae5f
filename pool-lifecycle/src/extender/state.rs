use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::{sync::oneshot, task::AbortHandle, time::Instant};

/// Start of the session and the ceiling no extension may cross.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    started: Instant,
    max_session_duration: Duration,
}

impl SessionClock {
    pub fn start(max_session_duration: Duration) -> Self {
        Self::starting_at(Instant::now(), max_session_duration)
    }

    pub fn starting_at(started: Instant, max_session_duration: Duration) -> Self {
        Self {
            started,
            max_session_duration,
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn deadline(&self) -> Instant {
        self.started + self.max_session_duration
    }

    /// Budget left before the ceiling, `None` once it is used up.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.started);
        self.max_session_duration
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }
}

/// The armed extension. Owned exclusively by the extender's slot.
#[derive(Debug)]
pub(crate) struct ExtensionWindow {
    pub id: u64,
    pub scheduled_at: Instant,
    pub expires_at: Instant,
    pub resolve: oneshot::Sender<()>,
    pub timer: AbortHandle,
}

impl ExtensionWindow {
    /// Stops the timer and releases whoever waits on the window.
    pub fn settle(self) {
        self.timer.abort();
        let _ = self.resolve.send(());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Armed {
        scheduled_at: Instant,
        expires_at: Instant,
    },
}

impl SlotState {
    pub fn is_armed(&self) -> bool {
        matches!(self, SlotState::Armed { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExtenderStats {
    /// Windows handed to the host.
    pub armed: u64,
    /// Windows resolved early by fresher activity or a new registration.
    pub superseded: u64,
    /// Windows that ran to their natural end.
    pub expired: u64,
    /// Signals ignored because the session budget was used up.
    pub exhausted: u64,
    /// Host refusals, e.g. a signal arriving outside any request.
    pub host_failures: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub armed: AtomicU64,
    pub superseded: AtomicU64,
    pub expired: AtomicU64,
    pub exhausted: AtomicU64,
    pub host_failures: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::AcqRel);
}

impl Counters {
    pub fn snapshot(&self) -> ExtenderStats {
        ExtenderStats {
            armed: self.armed.load(Ordering::Acquire),
            superseded: self.superseded.load(Ordering::Acquire),
            expired: self.expired.load(Ordering::Acquire),
            exhausted: self.exhausted.load(Ordering::Acquire),
            host_failures: self.host_failures.load(Ordering::Acquire),
        }
    }
}
