//! Domain types shared across the tether crates.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured sync unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncName(pub String);

impl fmt::Display for SyncName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SyncName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SyncName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Operating-system process id of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Monitor backend a sync unit asks to be bound to.
///
/// Only [`MonitorKind::Inotify`] has a backend; any other name survives
/// parsing so the daemon can reject it with a proper diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MonitorKind {
    #[default]
    Inotify,
    Other(String),
}

impl From<String> for MonitorKind {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("inotify") {
            MonitorKind::Inotify
        } else {
            MonitorKind::Other(s)
        }
    }
}

impl From<MonitorKind> for String {
    fn from(kind: MonitorKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for MonitorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorKind::Inotify => write!(f, "inotify"),
            MonitorKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Kind of a pending action. `Init` is the one-time startup action of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Init,
    Attrib,
    Create,
    Delete,
    Modify,
    Move,
}

impl EventKind {
    /// Every kind, in callback-slot order.
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::Init,
            EventKind::Attrib,
            EventKind::Create,
            EventKind::Delete,
            EventKind::Modify,
            EventKind::Move,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Init => "init",
            EventKind::Attrib => "attrib",
            EventKind::Create => "create",
            EventKind::Delete => "delete",
            EventKind::Modify => "modify",
            EventKind::Move => "move",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Worker commands
// ---------------------------------------------------------------------------

/// A fully rendered worker invocation, ready to hand to a launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl WorkerCommand {
    /// Run `script` through `/bin/sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.into()],
            cwd: None,
        }
    }

    /// The script body when this is a shell command.
    pub fn script(&self) -> Option<&str> {
        match self.args.as_slice() {
            [flag, body] if flag == "-c" => Some(body.as_str()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(SyncName::from("docs").to_string(), "docs");
        assert_eq!(Pid(4242).to_string(), "4242");
    }

    #[test]
    fn monitor_kind_parses_case_insensitively() {
        assert_eq!(MonitorKind::from("INotify".to_string()), MonitorKind::Inotify);
        assert_eq!(
            MonitorKind::from("fsevents".to_string()),
            MonitorKind::Other("fsevents".to_string())
        );
        assert_eq!(MonitorKind::Other("kqueue".into()).to_string(), "kqueue");
    }

    #[test]
    fn shell_command_exposes_script() {
        let cmd = WorkerCommand::shell("echo hi");
        assert_eq!(cmd.program, PathBuf::from("/bin/sh"));
        assert_eq!(cmd.script(), Some("echo hi"));
    }
}
