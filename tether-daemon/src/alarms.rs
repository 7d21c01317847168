//! User alarms: callbacks due at a point in time.

use std::time::Instant;

use tether_core::WakeTime;

/// Called with the current time; returning `Some(at)` re-arms the alarm.
pub type AlarmCallback = Box<dyn FnMut(Instant) -> Option<Instant> + Send>;

struct Entry {
    due: Instant,
    seq: u64,
    callback: AlarmCallback,
}

#[derive(Default)]
pub struct UserAlarms {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl UserAlarms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn schedule(
        &mut self,
        due: Instant,
        callback: impl FnMut(Instant) -> Option<Instant> + Send + 'static,
    ) {
        self.push(due, Box::new(callback));
    }

    fn push(&mut self, due: Instant, callback: AlarmCallback) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { due, seq, callback });
    }

    /// Run every alarm due at `now`, earliest first. Re-armed alarms wait
    /// for the next call even when already due again.
    pub fn invoke(&mut self, now: Instant) -> usize {
        let (mut due, later): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|e| e.due <= now);
        self.entries = later;
        due.sort_by_key(|e| (e.due, e.seq));

        let fired = due.len();
        for mut entry in due {
            if let Some(next) = (entry.callback)(now) {
                self.push(next, entry.callback);
            }
        }
        fired
    }

    pub fn alarm(&self) -> WakeTime {
        self.entries.iter().map(|e| e.due).min().into()
    }
}
