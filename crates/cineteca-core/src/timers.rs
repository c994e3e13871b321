//! Session-owned scheduled tasks
//!
//! The controller never sleeps. It records deadlines here and whoever drives
//! it (the runtime, or a test) calls back once the earliest one has passed.
//! Dropping or clearing the set cancels everything deterministically.

use std::time::{Duration, Instant};

/// The four timers a playback session may own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Delay before re-resolving a failed source
    RetryBackoff,
    /// Stall detection sampling
    BufferingSample,
    /// Hide controls after inactivity
    ControlsHide,
    /// Periodic progress write
    ProgressPersist,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::RetryBackoff,
        TimerKind::BufferingSample,
        TimerKind::ControlsHide,
        TimerKind::ProgressPersist,
    ];

    fn slot(self) -> usize {
        match self {
            TimerKind::RetryBackoff => 0,
            TimerKind::BufferingSample => 1,
            TimerKind::ControlsHide => 2,
            TimerKind::ProgressPersist => 3,
        }
    }
}

/// One optional deadline per [`TimerKind`]
#[derive(Debug, Default, Clone)]
pub struct TimerSet {
    deadlines: [Option<Instant>; 4],
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) a timer to fire `delay` after `now`
    pub fn arm(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        self.deadlines[kind.slot()] = Some(now + delay);
    }

    /// Arm only if not already pending
    pub fn arm_if_idle(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        if !self.is_armed(kind) {
            self.arm(kind, now, delay);
        }
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.deadlines[kind.slot()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.deadlines = [None; 4];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines[kind.slot()].is_some()
    }

    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines[kind.slot()]
    }

    pub fn armed_count(&self) -> usize {
        self.deadlines.iter().flatten().count()
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every timer due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = TimerKind::ALL
            .into_iter()
            .filter_map(|kind| match self.deadlines[kind.slot()] {
                Some(at) if at <= now => Some((at, kind)),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(at, _)| *at);

        for (_, kind) in &due {
            self.cancel(*kind);
        }
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_timers_fire_in_deadline_order() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::ControlsHide, t0, Duration::from_secs(3));
        timers.arm(TimerKind::ProgressPersist, t0, Duration::from_secs(1));
        timers.arm(TimerKind::RetryBackoff, t0, Duration::from_millis(500));

        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(500)));

        let due = timers.take_due(t0 + Duration::from_secs(1));
        assert_eq!(due, vec![TimerKind::RetryBackoff, TimerKind::ProgressPersist]);
        assert_eq!(timers.armed_count(), 1);
        assert!(timers.is_armed(TimerKind::ControlsHide));
    }

    #[test]
    fn test_cancel_all_clears_every_timer() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        for kind in TimerKind::ALL {
            timers.arm(kind, t0, Duration::from_secs(1));
        }
        timers.cancel_all();
        assert_eq!(timers.next_deadline(), None);
        assert!(timers.take_due(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_arm_if_idle_keeps_existing_deadline() {
        let t0 = Instant::now();
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::BufferingSample, t0, Duration::from_secs(1));
        timers.arm_if_idle(TimerKind::BufferingSample, t0, Duration::from_secs(5));
        assert_eq!(timers.deadline(TimerKind::BufferingSample), Some(t0 + Duration::from_secs(1)));
    }
}
