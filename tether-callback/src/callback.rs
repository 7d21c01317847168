//! Compiled callbacks for one sync.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tera::Tera;

use tether_core::{EventKind, WorkerCommand};

use crate::context::EventContext;
use crate::error::CallbackError;

/// Configuration slot name for `kind`.
pub fn slot_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Init => "on_startup",
        EventKind::Attrib => "on_attrib",
        EventKind::Create => "on_create",
        EventKind::Delete => "on_delete",
        EventKind::Modify => "on_modify",
        EventKind::Move => "on_move",
    }
}

/// The compiled callbacks of one sync, keyed by the event kind they handle.
#[derive(Clone, Default)]
pub struct CallbackSet {
    tera: Arc<Tera>,
    slots: BTreeMap<EventKind, String>,
}

impl CallbackSet {
    pub(crate) fn new(tera: Tera, slots: BTreeMap<EventKind, String>) -> Self {
        Self {
            tera: Arc::new(tera),
            slots,
        }
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Render the callback for `kind` into a worker command.
    ///
    /// `Ok(None)` when no callback handles `kind` or it renders to nothing.
    pub fn render(
        &self,
        kind: EventKind,
        ctx: &EventContext,
    ) -> Result<Option<WorkerCommand>, CallbackError> {
        let Some(name) = self.slots.get(&kind) else {
            return Ok(None);
        };
        let render_err = |source: tera::Error| CallbackError::Render {
            slot: slot_name(kind).to_string(),
            source,
        };
        let tera_ctx = ctx.to_tera_context().map_err(render_err)?;
        let script = self.tera.render(name, &tera_ctx).map_err(render_err)?;
        let script = script.trim();
        if script.is_empty() {
            return Ok(None);
        }
        Ok(Some(WorkerCommand::shell(script)))
    }
}

impl fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSet")
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}
