//! Filesystem monitor backend on top of `notify`.
//!
//! ## Renames
//!
//! inotify reports one rename as three events sharing a tracker: `From`,
//! `To` and finally `Both`. Only `Both` becomes a move. A `From` is held
//! back until its `To` shows up; if anything else arrives first, or
//! [`RENAME_GRACE`] passes, it is reported as a delete (the file left the
//! watch root). A `To` without a held `From` is a create.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use tether_core::{EventKind, SyncConfig, WakeTime};
use tether_sync::FsEvent;

use crate::error::{io_err, DaemonError};

/// How long the first half of a rename waits for its partner.
pub const RENAME_GRACE: Duration = Duration::from_millis(100);

/// Trackers remembered after their `From` half was reported as a delete.
const SPLIT_TRACKERS: usize = 64;

/// Binds sync units to a live event source.
pub trait MonitorBackend {
    /// Start watching `config.source` on behalf of unit number `unit`.
    fn watch(&mut self, unit: usize, config: &SyncConfig) -> Result<(), DaemonError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorMessage {
    Event { unit: usize, event: FsEvent },
    /// The kernel queue overflowed; events were lost.
    Overflow { unit: usize },
}

/// Held `From` half of a rename.
#[derive(Debug)]
struct HeldFrom {
    tracker: usize,
    path: PathBuf,
    since: Instant,
}

/// Turns raw `notify` events under one watch root into monitor messages.
#[derive(Debug)]
pub struct EventTranslator {
    unit: usize,
    root: PathBuf,
    held: Vec<HeldFrom>,
    /// Trackers whose halves met; their `Both` event carries the move.
    paired: HashSet<usize>,
    /// Trackers whose `From` already went out as a delete.
    split: VecDeque<usize>,
}

impl EventTranslator {
    pub fn new(unit: usize, root: impl Into<PathBuf>) -> Self {
        Self {
            unit,
            root: root.into(),
            held: Vec::new(),
            paired: HashSet::new(),
            split: VecDeque::new(),
        }
    }

    pub fn translate(&mut self, event: &Event, now: Instant) -> Vec<MonitorMessage> {
        let tracker = event.tracker();

        // The partner of a held `From` is the only event that keeps it held.
        if let (NotifyKind::Modify(ModifyKind::Name(RenameMode::To)), Some(tracker)) =
            (event.kind, tracker)
        {
            if let Some(index) = self.held.iter().position(|h| h.tracker == tracker) {
                self.held.remove(index);
                self.paired.insert(tracker);
                return self.release_all();
            }
        }

        let mut out = self.release_all();
        if event.need_rescan() {
            out.push(MonitorMessage::Overflow { unit: self.unit });
            return out;
        }
        let kind = match event.kind {
            NotifyKind::Create(_) => EventKind::Create,
            NotifyKind::Remove(_) => EventKind::Delete,
            NotifyKind::Modify(ModifyKind::Metadata(_)) => EventKind::Attrib,
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                out.extend(self.both(event, tracker));
                return out;
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                if let (Some(tracker), Some(path)) = (tracker, self.first_path(event)) {
                    self.held.push(HeldFrom {
                        tracker,
                        path,
                        since: now,
                    });
                    return out;
                }
                EventKind::Delete
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Create,
            NotifyKind::Modify(_) => EventKind::Modify,
            NotifyKind::Access(_) | NotifyKind::Any | NotifyKind::Other => return out,
        };
        out.extend(
            event
                .paths
                .iter()
                .filter_map(|path| relative(&self.root, path))
                .map(|path| message(self.unit, FsEvent::new(kind, path))),
        );
        out
    }

    /// Report `From` halves held for at least [`RENAME_GRACE`] as deletes.
    pub fn release_stale(&mut self, now: Instant) -> Vec<MonitorMessage> {
        let stale = self
            .held
            .iter()
            .take_while(|h| now.saturating_duration_since(h.since) >= RENAME_GRACE)
            .count();
        let released: Vec<HeldFrom> = self.held.drain(..stale).collect();
        released.into_iter().map(|h| self.split_off(h)).collect()
    }

    /// When the oldest held `From` must be released.
    pub fn alarm(&self) -> WakeTime {
        self.held
            .first()
            .map_or(WakeTime::Never, |h| WakeTime::At(h.since + RENAME_GRACE))
    }

    fn release_all(&mut self) -> Vec<MonitorMessage> {
        let released: Vec<HeldFrom> = self.held.drain(..).collect();
        released.into_iter().map(|h| self.split_off(h)).collect()
    }

    fn split_off(&mut self, held: HeldFrom) -> MonitorMessage {
        if self.split.len() == SPLIT_TRACKERS {
            self.split.pop_front();
        }
        self.split.push_back(held.tracker);
        message(self.unit, FsEvent::new(EventKind::Delete, held.path))
    }

    fn both(&mut self, event: &Event, tracker: Option<usize>) -> Vec<MonitorMessage> {
        if let Some(tracker) = tracker {
            if !self.paired.remove(&tracker) {
                if let Some(index) = self.split.iter().position(|t| *t == tracker) {
                    // Both halves already went out as a delete and a create.
                    self.split.remove(index);
                    return Vec::new();
                }
            }
        }
        let unit = self.unit;
        match event.paths.as_slice() {
            [from, to] => match (relative(&self.root, from), relative(&self.root, to)) {
                (Some(from), Some(to)) => vec![message(unit, FsEvent::moved(from, to))],
                // A move across the root boundary is a delete or a create.
                (Some(from), None) => vec![message(unit, FsEvent::new(EventKind::Delete, from))],
                (None, Some(to)) => vec![message(unit, FsEvent::new(EventKind::Create, to))],
                (None, None) => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn first_path(&self, event: &Event) -> Option<PathBuf> {
        event.paths.first().and_then(|path| relative(&self.root, path))
    }
}

type SharedTranslator = Arc<Mutex<EventTranslator>>;

/// One recursive `notify` watcher per unit, all feeding a single channel.
pub struct NotifyMonitor {
    tx: mpsc::UnboundedSender<MonitorMessage>,
    watchers: Vec<RecommendedWatcher>,
    translators: Vec<SharedTranslator>,
}

impl NotifyMonitor {
    pub fn new(tx: mpsc::UnboundedSender<MonitorMessage>) -> Self {
        Self {
            tx,
            watchers: Vec::new(),
            translators: Vec::new(),
        }
    }

    /// Send held rename halves whose partner never came as deletes.
    pub fn release_renames(&self, now: Instant) {
        for translator in &self.translators {
            let mut translator = translator.lock().unwrap_or_else(PoisonError::into_inner);
            for message in translator.release_stale(now) {
                let _ = self.tx.send(message);
            }
        }
    }

    /// Earliest time a held rename half must be released.
    pub fn alarm(&self) -> WakeTime {
        WakeTime::earliest_of(self.translators.iter().map(|translator| {
            translator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .alarm()
        }))
    }
}

impl MonitorBackend for NotifyMonitor {
    fn watch(&mut self, unit: usize, config: &SyncConfig) -> Result<(), DaemonError> {
        // Canonicalize so event paths (which arrive resolved) strip cleanly.
        let root = fs::canonicalize(&config.source).map_err(|e| io_err(&config.source, e))?;

        let translator: SharedTranslator = Arc::new(Mutex::new(EventTranslator::new(unit, &root)));
        let shared = translator.clone();
        let tx = self.tx.clone();
        let name = config.name.clone();
        let mut watcher = recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                // Send under the lock so releases from the driver stay in order.
                let mut translator = shared.lock().unwrap_or_else(PoisonError::into_inner);
                for message in translator.translate(&event, Instant::now()) {
                    let _ = tx.send(message);
                }
            }
            Err(err) => tracing::warn!(sync = %name, error = %err, "watcher event error"),
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(sync = %config.name, path = %root.display(), "watching");
        self.watchers.push(watcher);
        self.translators.push(translator);
        Ok(())
    }
}

fn message(unit: usize, event: FsEvent) -> MonitorMessage {
    MonitorMessage::Event { unit, event }
}

fn relative(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use notify::event::{CreateKind, DataChange, Flag, MetadataKind, RemoveKind};
    use tether_sync::DelayQueue;

    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/docs")
    }

    fn event(kind: NotifyKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(root().join(path)))
    }

    fn rename(mode: RenameMode, paths: &[&str], tracker: usize) -> Event {
        event(NotifyKind::Modify(ModifyKind::Name(mode)), paths).set_tracker(tracker)
    }

    fn translate(event: &Event) -> Vec<MonitorMessage> {
        EventTranslator::new(0, root()).translate(event, Instant::now())
    }

    #[test]
    fn create_and_remove_map_directly() {
        let created = translate(&event(NotifyKind::Create(CreateKind::File), &["a.txt"]));
        assert_eq!(
            created,
            vec![message(0, FsEvent::new(EventKind::Create, "a.txt"))]
        );
        let removed = EventTranslator::new(1, root())
            .translate(&event(NotifyKind::Remove(RemoveKind::Any), &["sub/b"]), Instant::now());
        assert_eq!(
            removed,
            vec![message(1, FsEvent::new(EventKind::Delete, "sub/b"))]
        );
    }

    #[test]
    fn metadata_is_attrib_and_data_is_modify() {
        let attrib = translate(&event(
            NotifyKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["a"],
        ));
        assert_eq!(attrib, vec![message(0, FsEvent::new(EventKind::Attrib, "a"))]);
        let modify = translate(&event(
            NotifyKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["a"],
        ));
        assert_eq!(modify, vec![message(0, FsEvent::new(EventKind::Modify, "a"))]);
    }

    #[test]
    fn rename_sequence_becomes_a_single_move() {
        let now = Instant::now();
        let mut translator = EventTranslator::new(0, root());
        let mut messages = Vec::new();
        messages.extend(translator.translate(&rename(RenameMode::From, &["old"], 7), now));
        messages.extend(translator.translate(&rename(RenameMode::To, &["new"], 7), now));
        messages.extend(translator.translate(&rename(RenameMode::Both, &["old", "new"], 7), now));
        assert_eq!(messages, vec![message(0, FsEvent::moved("old", "new"))]);
        assert_eq!(translator.alarm(), WakeTime::Never);

        let mut queue = DelayQueue::new(Duration::from_secs(1), 100);
        for message in messages {
            if let MonitorMessage::Event { event, .. } = message {
                queue.push(event, now);
            }
        }
        let kinds: Vec<EventKind> = queue.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![EventKind::Move]);
    }

    #[test]
    fn untracked_both_is_a_move() {
        let moved = translate(&event(NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)), &["old", "new"]));
        assert_eq!(moved, vec![message(0, FsEvent::moved("old", "new"))]);
    }

    #[test]
    fn unpaired_from_is_a_delete_once_something_else_arrives() {
        let now = Instant::now();
        let mut translator = EventTranslator::new(0, root());
        assert!(translator.translate(&rename(RenameMode::From, &["gone"], 3), now).is_empty());
        assert_eq!(translator.alarm(), WakeTime::At(now + RENAME_GRACE));

        let messages = translator.translate(&event(NotifyKind::Create(CreateKind::File), &["b"]), now);
        assert_eq!(
            messages,
            vec![
                message(0, FsEvent::new(EventKind::Delete, "gone")),
                message(0, FsEvent::new(EventKind::Create, "b")),
            ]
        );
    }

    #[test]
    fn unpaired_from_is_released_after_grace() {
        let now = Instant::now();
        let mut translator = EventTranslator::new(0, root());
        translator.translate(&rename(RenameMode::From, &["gone"], 3), now);
        assert!(translator.release_stale(now).is_empty());
        assert_eq!(
            translator.release_stale(now + RENAME_GRACE),
            vec![message(0, FsEvent::new(EventKind::Delete, "gone"))]
        );
        assert_eq!(translator.alarm(), WakeTime::Never);
    }

    #[test]
    fn late_halves_do_not_add_a_move() {
        let now = Instant::now();
        let mut translator = EventTranslator::new(0, root());
        translator.translate(&rename(RenameMode::From, &["old"], 5), now);
        let released = translator.release_stale(now + RENAME_GRACE);
        let created = translator.translate(&rename(RenameMode::To, &["new"], 5), now);
        let both = translator.translate(&rename(RenameMode::Both, &["old", "new"], 5), now);
        assert_eq!(released, vec![message(0, FsEvent::new(EventKind::Delete, "old"))]);
        assert_eq!(created, vec![message(0, FsEvent::new(EventKind::Create, "new"))]);
        assert!(both.is_empty());
    }

    #[test]
    fn move_into_root_is_a_create() {
        let into = translate(&rename(RenameMode::To, &["arrived"], 9));
        assert_eq!(into, vec![message(0, FsEvent::new(EventKind::Create, "arrived"))]);
    }

    #[test]
    fn move_out_of_root_is_a_delete() {
        let ev = Event::new(NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root().join("old"))
            .add_path(PathBuf::from("/elsewhere/old"));
        assert_eq!(
            translate(&ev),
            vec![message(0, FsEvent::new(EventKind::Delete, "old"))]
        );
    }

    #[test]
    fn rescan_flag_is_overflow() {
        let ev = Event::new(NotifyKind::Other).set_flag(Flag::Rescan);
        assert_eq!(
            EventTranslator::new(3, root()).translate(&ev, Instant::now()),
            vec![MonitorMessage::Overflow { unit: 3 }]
        );
    }

    #[test]
    fn root_itself_and_access_are_ignored() {
        assert!(translate(&event(NotifyKind::Modify(ModifyKind::Any), &[""])).is_empty());
        assert!(translate(&event(NotifyKind::Access(notify::event::AccessKind::Any), &["a"])).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn real_rename_is_reported_once() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("old.txt"), "x").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = NotifyMonitor::new(tx);
        monitor
            .watch(0, &SyncConfig::new("docs", dir.path(), "/tmp/unused"))
            .unwrap();

        fs::rename(dir.path().join("old.txt"), dir.path().join("new.txt")).unwrap();

        let mut messages = Vec::new();
        while let Ok(Some(received)) =
            tokio::time::timeout(Duration::from_millis(500), rx.recv()).await
        {
            messages.push(received);
        }
        monitor.release_renames(Instant::now() + RENAME_GRACE);
        while let Ok(received) = rx.try_recv() {
            messages.push(received);
        }
        assert_eq!(messages, vec![message(0, FsEvent::moved("old.txt", "new.txt"))]);
    }
}
