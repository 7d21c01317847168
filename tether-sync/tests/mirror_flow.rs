//! A `Mirror` unit driven through bursts of events, the way the scheduler
//! drives it.

use std::io;
use std::time::{Duration, Instant};

use tether_callback::Translator;
use tether_core::{CallbackBodies, EventKind, Pid, SyncConfig, WakeTime, WorkerCommand};
use tether_sync::{FsEvent, Mirror, Spawner, SyncUnit};

#[derive(Default)]
struct Recorder {
    next: u32,
    scripts: Vec<String>,
}

impl Spawner for Recorder {
    fn spawn(&mut self, command: &WorkerCommand) -> io::Result<Pid> {
        self.next += 1;
        self.scripts
            .push(command.script().unwrap_or_default().to_string());
        Ok(Pid(self.next))
    }
}

const DELAY: Duration = Duration::from_secs(2);

fn unit(max_processes: usize) -> Mirror {
    let mut config = SyncConfig::new("site", "/var/www", "/mnt/www");
    config.delay_secs = DELAY.as_secs();
    config.max_processes = max_processes;
    config.init = false;
    config.callbacks = CallbackBodies {
        on_create: Some("create {{ path }}".into()),
        on_modify: Some("modify {{ path }}".into()),
        on_delete: Some("delete {{ path }}".into()),
        on_move: Some("move {{ path }} {{ path2 }}".into()),
        ..Default::default()
    };
    let callbacks = Translator::new()
        .translate(&config.name, &config.callbacks)
        .expect("translate");
    let mut mirror = Mirror::new(config);
    mirror.install_callbacks(callbacks);
    mirror
}

#[test]
fn editor_save_burst_becomes_one_action() {
    let start = Instant::now();
    let mut mirror = unit(4);
    let mut spawner = Recorder::default();

    // Write to a temp file, rename over the target, touch attributes.
    mirror.push_event(FsEvent::new(EventKind::Create, ".index.html.swp"), start);
    mirror.push_event(FsEvent::new(EventKind::Modify, ".index.html.swp"), start);
    mirror.push_event(FsEvent::new(EventKind::Delete, ".index.html.swp"), start);
    mirror.push_event(FsEvent::new(EventKind::Modify, "index.html"), start);
    mirror.push_event(FsEvent::new(EventKind::Attrib, "index.html"), start);
    mirror.push_event(FsEvent::new(EventKind::Modify, "index.html"), start);

    assert_eq!(mirror.alarm(), WakeTime::At(start + DELAY));
    assert!(!mirror.invoke_actions(start, &mut spawner), "not due yet");

    assert!(mirror.invoke_actions(start + DELAY, &mut spawner));
    assert_eq!(spawner.scripts, vec!["modify index.html"]);
}

#[test]
fn actions_on_one_path_run_in_order() {
    let start = Instant::now();
    let due = start + DELAY;
    let mut mirror = unit(4);
    let mut spawner = Recorder::default();

    mirror.push_event(FsEvent::moved("a", "b"), start);
    mirror.push_event(FsEvent::new(EventKind::Modify, "b"), start);
    mirror.push_event(FsEvent::new(EventKind::Create, "c"), start);

    mirror.invoke_actions(due, &mut spawner);
    assert_eq!(spawner.scripts, vec!["move a b", "create c"]);

    assert!(mirror.collect(Pid(1), 0));
    mirror.invoke_actions(due, &mut spawner);
    assert_eq!(spawner.scripts.last().map(String::as_str), Some("modify b"));
}

#[test]
fn unit_limit_holds_back_ready_actions() {
    let start = Instant::now();
    let due = start + DELAY;
    let mut mirror = unit(2);
    let mut spawner = Recorder::default();
    for name in ["a", "b", "c", "d"] {
        mirror.push_event(FsEvent::new(EventKind::Create, name), start);
    }

    mirror.invoke_actions(due, &mut spawner);
    assert_eq!(spawner.scripts.len(), 2);
    assert_eq!(mirror.alarm(), WakeTime::Never);

    mirror.collect(Pid(2), 0);
    assert_eq!(mirror.alarm(), WakeTime::At(due));
    mirror.invoke_actions(due, &mut spawner);
    assert_eq!(spawner.scripts, vec!["create a", "create b", "create c"]);

    let report = mirror.report();
    assert_eq!((report.active, report.waiting), (2, 1));
}
