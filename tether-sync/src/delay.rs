//! Delay queue: coalesces raw events into pending actions.
//!
//! ## Coalescing
//!
//! A new event for a path merges into the most recent *waiting* delay for
//! the same path:
//!
//! | waiting  | new      | result            |
//! |----------|----------|-------------------|
//! | attrib   | any      | new kind          |
//! | create   | delete   | both dropped      |
//! | create   | other    | create            |
//! | modify   | delete   | delete            |
//! | modify   | other    | modify            |
//! | delete   | create / modify | modify     |
//! | delete   | other    | delete            |
//!
//! Moves and the init action never merge. A merged delay keeps its original
//! due time.
//!
//! ## Ordering
//!
//! A delay is blocked while an earlier delay touches one of its paths, so
//! actions on the same path run one at a time and in event order. The init
//! action conflicts with everything.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tether_core::{EventKind, Pid, WakeTime};

use crate::event::FsEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStatus {
    Waiting,
    Active(Pid),
}

/// One pending or running action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delay {
    pub id: u64,
    pub kind: EventKind,
    /// Relative path; empty for the init action.
    pub path: PathBuf,
    pub path2: Option<PathBuf>,
    pub due: WakeTime,
    pub status: DelayStatus,
}

impl Delay {
    pub fn is_active(&self) -> bool {
        matches!(self.status, DelayStatus::Active(_))
    }

    fn touches(&self, path: &Path) -> bool {
        self.path == path || self.path2.as_deref() == Some(path)
    }
}

enum Merge {
    Keep,
    Replace(EventKind),
    Cancel,
    Stack,
}

fn merge(waiting: EventKind, new: EventKind) -> Merge {
    use EventKind::*;
    match (waiting, new) {
        (Init, _) | (_, Init) | (Move, _) | (_, Move) => Merge::Stack,
        (Attrib, Attrib) => Merge::Keep,
        (Attrib, new) => Merge::Replace(new),
        (Create, Delete) => Merge::Cancel,
        (Create, _) => Merge::Keep,
        (Modify, Delete) => Merge::Replace(Delete),
        (Modify, _) => Merge::Keep,
        (Delete, Create) | (Delete, Modify) => Merge::Replace(Modify),
        (Delete, _) => Merge::Keep,
    }
}

/// Per-unit queue of delays in arrival order.
#[derive(Debug)]
pub struct DelayQueue {
    delays: VecDeque<Delay>,
    next_id: u64,
    delay: Duration,
    max_delays: usize,
}

impl DelayQueue {
    pub fn new(delay: Duration, max_delays: usize) -> Self {
        Self {
            delays: VecDeque::new(),
            next_id: 0,
            delay,
            max_delays,
        }
    }

    pub fn len(&self) -> usize {
        self.delays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delays.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delay> {
        self.delays.iter()
    }

    pub fn get(&self, id: u64) -> Option<&Delay> {
        self.delays.iter().find(|d| d.id == id)
    }

    pub fn active_count(&self) -> usize {
        self.delays.iter().filter(|d| d.is_active()).count()
    }

    pub fn waiting_count(&self) -> usize {
        self.delays.len() - self.active_count()
    }

    /// Add a raw event, merging it into a waiting delay where possible.
    pub fn push(&mut self, event: FsEvent, now: Instant) {
        if let Some(index) = self.delays.iter().rposition(|d| d.touches(&event.path)) {
            let existing = &self.delays[index];
            if existing.status == DelayStatus::Waiting && existing.path == event.path {
                match merge(existing.kind, event.kind) {
                    Merge::Keep => return,
                    Merge::Replace(kind) => {
                        self.delays[index].kind = kind;
                        return;
                    }
                    Merge::Cancel => {
                        self.delays.remove(index);
                        return;
                    }
                    Merge::Stack => {}
                }
            }
        }
        let due = WakeTime::At(now + self.delay);
        self.enqueue(event.kind, event.path, event.path2, due);
    }

    /// Queue the init action; it is due at once and blocks everything after it.
    pub fn push_init(&mut self) -> u64 {
        self.enqueue(EventKind::Init, PathBuf::new(), None, WakeTime::Immediate)
    }

    fn enqueue(
        &mut self,
        kind: EventKind,
        path: PathBuf,
        path2: Option<PathBuf>,
        due: WakeTime,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.delays.push_back(Delay {
            id,
            kind,
            path,
            path2,
            due,
            status: DelayStatus::Waiting,
        });
        id
    }

    /// Past `max_delays` waiting entries, everything is due.
    fn flushing(&self) -> bool {
        self.waiting_count() > self.max_delays
    }

    /// Waiting delays not blocked by an earlier one, in queue order.
    ///
    /// Paths of every delay seen so far are collected in one pass, so a
    /// delay is blocked exactly when one of its paths is already in the set
    /// or an init action came before it.
    fn unblocked(&self) -> impl Iterator<Item = &Delay> + '_ {
        let mut touched: HashSet<&Path> = HashSet::new();
        let mut after_init = false;
        self.delays.iter().filter(move |delay| {
            let delay: &Delay = *delay;
            let blocked = after_init
                || (delay.kind == EventKind::Init && !touched.is_empty())
                || touched.contains(delay.path.as_path())
                || delay.path2.as_deref().is_some_and(|p| touched.contains(p));
            after_init |= delay.kind == EventKind::Init;
            touched.insert(delay.path.as_path());
            if let Some(path2) = delay.path2.as_deref() {
                touched.insert(path2);
            }
            !blocked && delay.status == DelayStatus::Waiting
        })
    }

    /// First waiting delay that may start at `now`.
    pub fn next_ready(&self, now: Instant) -> Option<u64> {
        let flushing = self.flushing();
        self.unblocked()
            .find(|d| flushing || d.due.is_due(now))
            .map(|d| d.id)
    }

    pub fn activate(&mut self, id: u64, pid: Pid) -> bool {
        match self.delays.iter_mut().find(|d| d.id == id) {
            Some(delay) => {
                delay.status = DelayStatus::Active(pid);
                true
            }
            None => false,
        }
    }

    pub fn postpone(&mut self, id: u64, until: Instant) {
        if let Some(delay) = self.delays.iter_mut().find(|d| d.id == id) {
            delay.due = WakeTime::At(until);
        }
    }

    pub fn remove(&mut self, id: u64) -> Option<Delay> {
        let index = self.delays.iter().position(|d| d.id == id)?;
        self.delays.remove(index)
    }

    /// Settle the action run by `pid`. With `retry` it waits again, due at once.
    pub fn settle(&mut self, pid: Pid, retry: bool) -> Option<Delay> {
        let index = self
            .delays
            .iter()
            .position(|d| d.status == DelayStatus::Active(pid))?;
        if retry {
            let delay = &mut self.delays[index];
            delay.status = DelayStatus::Waiting;
            delay.due = WakeTime::Immediate;
            Some(delay.clone())
        } else {
            self.delays.remove(index)
        }
    }

    /// Earliest due time among waiting delays that are not blocked.
    pub fn alarm(&self) -> WakeTime {
        if self.flushing() {
            return if self.unblocked().next().is_some() {
                WakeTime::Immediate
            } else {
                WakeTime::Never
            };
        }
        WakeTime::earliest_of(self.unblocked().map(|d| d.due))
    }
}
