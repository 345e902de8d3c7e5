use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

/// Recurring timers supplied by the host.
pub trait Timers {
    fn start_timer(&mut self, interval: Duration) -> TimerId;
    fn stop_timer(&mut self, id: TimerId);
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    id: TimerId,
    interval: Duration,
    deadline: Instant,
}

/// Deadline list polled from the event loop.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u32,
    scheduled: Vec<Scheduled>,
    pub started: usize,
    pub stopped: usize,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_active(&self, id: TimerId) -> bool {
        self.scheduled.iter().any(|timer| timer.id == id)
    }

    #[cfg(test)]
    pub fn active_count(&self) -> usize {
        self.scheduled.len()
    }

    /// Return every timer due at `now`, re-arming each one for its next period.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due = Vec::new();
        for timer in &mut self.scheduled {
            if now >= timer.deadline {
                due.push(timer.id);
                timer.deadline = timer
                    .deadline
                    .checked_add(timer.interval)
                    .unwrap_or(now);
                if timer.deadline <= now {
                    timer.deadline = now + timer.interval;
                }
            }
        }
        due
    }
}

impl Timers for TimerQueue {
    fn start_timer(&mut self, interval: Duration) -> TimerId {
        self.next_id = self.next_id.wrapping_add(1);
        let id = TimerId(self.next_id);
        trace!(?id, ?interval, "timer start");
        self.scheduled.push(Scheduled {
            id,
            interval,
            deadline: Instant::now() + interval,
        });
        self.started += 1;
        id
    }

    fn stop_timer(&mut self, id: TimerId) {
        trace!(?id, "timer stop");
        self.scheduled.retain(|timer| timer.id != id);
        self.stopped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_every_interval() {
        let mut timers = TimerQueue::new();
        let id = timers.start_timer(Duration::from_millis(100));

        assert!(timers.poll(Instant::now()).is_empty());
        let later = Instant::now() + Duration::from_millis(150);
        assert_eq!(timers.poll(later), vec![id]);
        // re-armed, not due again at the same instant
        assert!(timers.poll(later).is_empty());
        assert_eq!(timers.poll(later + Duration::from_millis(100)), vec![id]);
    }

    #[test]
    fn stopped_timer_never_fires() {
        let mut timers = TimerQueue::new();
        let id = timers.start_timer(Duration::from_millis(10));
        timers.stop_timer(id);
        assert!(!timers.is_active(id));
        assert!(timers
            .poll(Instant::now() + Duration::from_secs(1))
            .is_empty());
    }
}
