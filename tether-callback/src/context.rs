//! Event context: the serializable payload a callback template sees.

use std::path::Path;

use serde::{Deserialize, Serialize};

use tether_core::{EventKind, SyncConfig};

/// Variables available to callback bodies.
///
/// Paths are relative to the sync's source; the `*_path` fields are the
/// joined absolute forms. Missing values render as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub name: String,
    pub event: String,
    /// Source directory, always with a trailing `/`.
    pub source: String,
    pub target: String,
    pub path: String,
    pub path2: String,
    pub source_path: String,
    pub target_path: String,
    pub target_path2: String,
}

impl EventContext {
    /// Build the context for one action of `sync`.
    pub fn new(
        sync: &SyncConfig,
        kind: EventKind,
        path: Option<&Path>,
        path2: Option<&Path>,
    ) -> Self {
        let mut source = sync.source.display().to_string();
        if !source.ends_with('/') {
            source.push('/');
        }
        let rel = |p: Option<&Path>| p.map(|p| p.display().to_string()).unwrap_or_default();
        let path = rel(path);
        let path2 = rel(path2);

        let source_path = format!("{source}{path}");
        let target_path = join_target(&sync.target, &path);
        let target_path2 = if path2.is_empty() {
            String::new()
        } else {
            join_target(&sync.target, &path2)
        };

        EventContext {
            name: sync.name.0.clone(),
            event: kind.to_string(),
            source,
            target: sync.target.clone(),
            path,
            path2,
            source_path,
            target_path,
            target_path2,
        }
    }

    /// Convert to a [`tera::Context`] for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, tera::Error> {
        tera::Context::from_serialize(self)
    }
}

fn join_target(target: &str, path: &str) -> String {
    if path.is_empty() {
        target.to_string()
    } else if target.ends_with('/') {
        format!("{target}{path}")
    } else {
        format!("{target}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync() -> SyncConfig {
        SyncConfig::new("docs", "/srv/docs", "backup:/srv/docs")
    }

    #[test]
    fn context_fields_populated() {
        let ctx = EventContext::new(
            &sync(),
            EventKind::Modify,
            Some(Path::new("a/b.txt")),
            None,
        );
        assert_eq!(ctx.name, "docs");
        assert_eq!(ctx.event, "modify");
        assert_eq!(ctx.source, "/srv/docs/");
        assert_eq!(ctx.source_path, "/srv/docs/a/b.txt");
        assert_eq!(ctx.target_path, "backup:/srv/docs/a/b.txt");
        assert!(ctx.path2.is_empty());
        assert!(ctx.target_path2.is_empty());
    }

    #[test]
    fn init_context_points_at_roots() {
        let ctx = EventContext::new(&sync(), EventKind::Init, None, None);
        assert_eq!(ctx.source_path, "/srv/docs/");
        assert_eq!(ctx.target_path, "backup:/srv/docs");
    }

    #[test]
    fn move_context_carries_both_paths() {
        let mut config = sync();
        config.target = "/mnt/docs/".to_string();
        let ctx = EventContext::new(
            &config,
            EventKind::Move,
            Some(Path::new("old.txt")),
            Some(Path::new("new.txt")),
        );
        assert_eq!(ctx.target_path, "/mnt/docs/old.txt");
        assert_eq!(ctx.target_path2, "/mnt/docs/new.txt");
    }

    #[test]
    fn to_tera_context_succeeds() {
        let ctx = EventContext::new(&sync(), EventKind::Create, Some(Path::new("x")), None);
        ctx.to_tera_context().expect("context conversion");
    }
}
