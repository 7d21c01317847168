//! [`WakeTime`]: when the daemon next needs attention.

use std::time::Instant;

/// Earliest point at which a subsystem needs the event loop to wake.
///
/// Ordering is by earliness: `Immediate < At(t) < Never`, and
/// `At(t1) < At(t2)` iff `t1 < t2`. The derive relies on variant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WakeTime {
    Immediate,
    At(Instant),
    #[default]
    Never,
}

impl WakeTime {
    /// The earlier of two wake times.
    pub fn earliest(self, other: WakeTime) -> WakeTime {
        self.min(other)
    }

    /// Fold many wake times, stopping at the first `Immediate`.
    pub fn earliest_of<I>(times: I) -> WakeTime
    where
        I: IntoIterator<Item = WakeTime>,
    {
        let mut acc = WakeTime::Never;
        for time in times {
            acc = acc.earliest(time);
            if acc.is_immediate() {
                break;
            }
        }
        acc
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, WakeTime::Immediate)
    }

    /// Whether an action with this due time may run at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self {
            WakeTime::Immediate => true,
            WakeTime::At(at) => *at <= now,
            WakeTime::Never => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            WakeTime::At(at) => Some(*at),
            _ => None,
        }
    }
}

impl From<Option<Instant>> for WakeTime {
    fn from(at: Option<Instant>) -> Self {
        at.map_or(WakeTime::Never, WakeTime::At)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn immediate_beats_everything() {
        let t = Instant::now();
        assert_eq!(WakeTime::At(t).earliest(WakeTime::Immediate), WakeTime::Immediate);
        assert_eq!(WakeTime::Never.earliest(WakeTime::Immediate), WakeTime::Immediate);
    }

    #[test]
    fn never_loses_to_everything() {
        let t = Instant::now();
        assert_eq!(WakeTime::Never.earliest(WakeTime::At(t)), WakeTime::At(t));
        assert_eq!(WakeTime::Never.earliest(WakeTime::Never), WakeTime::Never);
    }

    #[test]
    fn earlier_deadline_wins() {
        let t1 = Instant::now();
        let t2 = t1 + Duration::from_secs(5);
        assert_eq!(WakeTime::At(t2).earliest(WakeTime::At(t1)), WakeTime::At(t1));
        assert!(WakeTime::At(t1) < WakeTime::At(t2));
    }

    #[test]
    fn earliest_of_empty_is_never() {
        assert_eq!(WakeTime::earliest_of(std::iter::empty()), WakeTime::Never);
    }

    #[test]
    fn earliest_of_short_circuits_on_immediate() {
        let t = Instant::now();
        let folded = WakeTime::earliest_of([WakeTime::At(t), WakeTime::Immediate, WakeTime::Never]);
        assert_eq!(folded, WakeTime::Immediate);
    }

    #[test]
    fn due_checks() {
        let now = Instant::now();
        assert!(WakeTime::Immediate.is_due(now));
        assert!(WakeTime::At(now).is_due(now));
        assert!(!WakeTime::At(now + Duration::from_millis(1)).is_due(now));
        assert!(!WakeTime::Never.is_due(now));
    }
}
