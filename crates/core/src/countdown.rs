//! Deterministic countdowns computed from persisted anchor timestamps.

use chrono::{DateTime, Duration, Utc};

/// How the remaining time is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownFormat {
    /// `HH:MM:SS`, hours may exceed 24.
    Hms,
    /// `DD:HH:MM:SS`.
    Dhms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Waiting { remaining: Duration },
    Ready,
}

impl CountdownState {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Colour tier of the long countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    /// More than 4 days left is high, more than 1 day medium, anything else low.
    #[must_use]
    pub fn for_remaining(remaining: Duration) -> Self {
        if remaining > Duration::days(4) {
            Self::High
        } else if remaining > Duration::days(1) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A countdown of `duration` starting at `anchor`.
///
/// Without an anchor the countdown has not started: it reports the full
/// duration and is never ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    anchor: Option<DateTime<Utc>>,
    duration: Duration,
    format: CountdownFormat,
}

impl Countdown {
    #[must_use]
    pub fn new(anchor: Option<DateTime<Utc>>, duration: Duration, format: CountdownFormat) -> Self {
        Self {
            anchor,
            duration,
            format,
        }
    }

    #[must_use]
    pub fn anchor(&self) -> Option<DateTime<Utc>> {
        self.anchor
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn format(&self) -> CountdownFormat {
        self.format
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.anchor.is_some()
    }

    /// `max(0, duration - (now - anchor))`.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let Some(anchor) = self.anchor else {
            return self.duration;
        };
        let left = self.duration - (now - anchor);
        if left < Duration::zero() {
            Duration::zero()
        } else {
            left
        }
    }

    #[must_use]
    pub fn state(&self, now: DateTime<Utc>) -> CountdownState {
        let remaining = self.remaining(now);
        if self.is_active() && remaining <= Duration::zero() {
            CountdownState::Ready
        } else {
            CountdownState::Waiting { remaining }
        }
    }

    #[must_use]
    pub fn urgency(&self, now: DateTime<Utc>) -> Urgency {
        Urgency::for_remaining(self.remaining(now))
    }

    #[must_use]
    pub fn format_remaining(&self, now: DateTime<Utc>) -> String {
        format_duration(self.remaining(now), self.format)
    }
}

/// Zero-padded rendering of a non-negative duration.
#[must_use]
pub fn format_duration(duration: Duration, format: CountdownFormat) -> String {
    let total = duration.num_seconds().max(0);
    let seconds = total % 60;
    let minutes = (total / 60) % 60;
    match format {
        CountdownFormat::Hms => {
            let hours = total / 3600;
            format!("{hours:02}:{minutes:02}:{seconds:02}")
        }
        CountdownFormat::Dhms => {
            let hours = (total / 3600) % 24;
            let days = total / 86_400;
            format!("{days:02}:{hours:02}:{minutes:02}:{seconds:02}")
        }
    }
}

/// Latches a countdown once it reports `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTracker {
    countdown: Countdown,
    ready: bool,
}

impl CountdownTracker {
    #[must_use]
    pub fn new(countdown: Countdown) -> Self {
        Self {
            countdown,
            ready: false,
        }
    }

    #[must_use]
    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    /// Evaluate at `now`; once `Ready` has been observed it is returned forever.
    pub fn observe(&mut self, now: DateTime<Utc>) -> CountdownState {
        if self.ready {
            return CountdownState::Ready;
        }
        let state = self.countdown.state(now);
        self.ready = state.is_ready();
        state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn day_and_a_half() -> Countdown {
        Countdown::new(Some(fixed_now()), Duration::hours(36), CountdownFormat::Hms)
    }

    #[test]
    fn ready_exactly_at_anchor_plus_duration() {
        let countdown = day_and_a_half();
        let deadline = fixed_now() + Duration::hours(36);
        assert_eq!(
            countdown.state(deadline - Duration::seconds(1)),
            CountdownState::Waiting {
                remaining: Duration::seconds(1)
            }
        );
        assert_eq!(countdown.state(deadline), CountdownState::Ready);
        assert_eq!(countdown.remaining(deadline + Duration::hours(5)), Duration::zero());
    }

    #[test]
    fn tracker_never_returns_to_waiting() {
        let mut tracker = CountdownTracker::new(day_and_a_half());
        let deadline = fixed_now() + Duration::hours(36);
        assert!(!tracker.observe(deadline - Duration::seconds(1)).is_ready());
        assert!(tracker.observe(deadline).is_ready());
        assert!(tracker.observe(fixed_now()).is_ready());
    }

    #[test]
    fn missing_anchor_is_inactive_and_waiting() {
        let countdown = Countdown::new(None, Duration::days(7), CountdownFormat::Dhms);
        assert!(!countdown.is_active());
        assert_eq!(
            countdown.state(fixed_now() + Duration::days(30)),
            CountdownState::Waiting {
                remaining: Duration::days(7)
            }
        );
    }

    #[test]
    fn formats_hms_and_dhms() {
        let countdown = day_and_a_half();
        assert_eq!(countdown.format_remaining(fixed_now()), "36:00:00");
        let long = Duration::days(6) + Duration::hours(23) + Duration::minutes(59) + Duration::seconds(5);
        assert_eq!(format_duration(long, CountdownFormat::Dhms), "06:23:59:05");
    }

    #[test]
    fn urgency_tiers() {
        assert_eq!(Urgency::for_remaining(Duration::days(5)), Urgency::High);
        assert_eq!(Urgency::for_remaining(Duration::days(4)), Urgency::Medium);
        assert_eq!(Urgency::for_remaining(Duration::hours(30)), Urgency::Medium);
        assert_eq!(Urgency::for_remaining(Duration::hours(24)), Urgency::Low);
    }
}
