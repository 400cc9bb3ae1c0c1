//! Named, independently cancelable timers.
//!
//! A session owns a small fixed set of scheduled tasks (login timeout,
//! keep-alive ping, reconnect delay, throughput sampling). Each has exactly
//! one slot here, and arming a timer always replaces the previous schedule,
//! so rapid reconnects can never stack duplicate firings.

use std::time::Duration;
use tokio::time::Instant;

/// The named timers a stream client can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Login response not received in time
    LoginTimeout,
    /// Recurring keep-alive ping
    PingKeepalive,
    /// Delayed reconnect attempt
    Reconnect,
    /// Recurring throughput sample
    ThroughputSample,
}

const SLOT_COUNT: usize = 4;

impl TimerKind {
    fn index(self) -> usize {
        match self {
            TimerKind::LoginTimeout => 0,
            TimerKind::PingKeepalive => 1,
            TimerKind::Reconnect => 2,
            TimerKind::ThroughputSample => 3,
        }
    }

    const ALL: [TimerKind; SLOT_COUNT] = [
        TimerKind::LoginTimeout,
        TimerKind::PingKeepalive,
        TimerKind::Reconnect,
        TimerKind::ThroughputSample,
    ];
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    deadline: Instant,
    period: Option<Duration>,
}

/// One authoritative armed/disarmed state per timer.
#[derive(Debug, Default)]
pub struct TimerSet {
    slots: [Option<Slot>; SLOT_COUNT],
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer, replacing any previous schedule for this kind.
    pub fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.slots[kind.index()] = Some(Slot {
            deadline: Instant::now() + delay,
            period: None,
        });
    }

    /// Arm a recurring timer, replacing any previous schedule for this kind.
    pub fn arm_periodic(&mut self, kind: TimerKind, period: Duration) {
        self.slots[kind.index()] = Some(Slot {
            deadline: Instant::now() + period,
            period: Some(period),
        });
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.slots = [None; SLOT_COUNT];
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    /// Earliest pending deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.deadline)
            .min()
    }

    /// Pop the earliest timer that is due at `now`. Periodic timers are
    /// rescheduled one period out; one-shots are disarmed.
    pub fn fire_due(&mut self, now: Instant) -> Option<TimerKind> {
        let kind = TimerKind::ALL
            .iter()
            .filter_map(|&kind| {
                self.slots[kind.index()]
                    .filter(|slot| slot.deadline <= now)
                    .map(|slot| (kind, slot.deadline))
            })
            .min_by_key(|&(_, deadline)| deadline)
            .map(|(kind, _)| kind)?;

        let slot = self.slots[kind.index()].take();
        if let Some(Slot {
            period: Some(period),
            ..
        }) = slot
        {
            self.slots[kind.index()] = Some(Slot {
                deadline: now + period,
                period: Some(period),
            });
        }
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::LoginTimeout, Duration::from_secs(30));
        assert!(timers.is_armed(TimerKind::LoginTimeout));
        assert_eq!(timers.fire_due(Instant::now()), None);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(timers.fire_due(Instant::now()), Some(TimerKind::LoginTimeout));
        assert_eq!(timers.fire_due(Instant::now()), None);
        assert!(!timers.is_armed(TimerKind::LoginTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reschedules() {
        let mut timers = TimerSet::new();
        timers.arm_periodic(TimerKind::PingKeepalive, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(timers.fire_due(Instant::now()), Some(TimerKind::PingKeepalive));
        assert!(timers.is_armed(TimerKind::PingKeepalive));
        assert_eq!(timers.fire_due(Instant::now()), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(timers.fire_due(Instant::now()), Some(TimerKind::PingKeepalive));
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_replaces_previous_schedule() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::Reconnect, Duration::from_secs(1));
        timers.arm(TimerKind::Reconnect, Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(timers.fire_due(Instant::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_earliest_fires_first() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::LoginTimeout, Duration::from_secs(30));
        timers.arm(TimerKind::Reconnect, Duration::from_secs(10));
        assert_eq!(
            timers.next_deadline(),
            Some(Instant::now() + Duration::from_secs(10))
        );

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(timers.fire_due(Instant::now()), Some(TimerKind::Reconnect));
        assert_eq!(timers.fire_due(Instant::now()), Some(TimerKind::LoginTimeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let mut timers = TimerSet::new();
        timers.arm(TimerKind::LoginTimeout, Duration::from_secs(1));
        timers.arm_periodic(TimerKind::ThroughputSample, Duration::from_secs(1));
        timers.cancel_all();
        assert_eq!(timers.next_deadline(), None);
    }
}
