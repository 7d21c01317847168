//! Tera translator: compiles [`CallbackBodies`] into a [`CallbackSet`].
//!
//! # Template variables
//!
//! | Variable       | Meaning                                          |
//! |----------------|--------------------------------------------------|
//! | `name`         | sync name                                        |
//! | `event`        | `init`, `attrib`, `create`, `delete`, `modify`, `move` |
//! | `source`       | source root with trailing `/`                    |
//! | `target`       | target as configured                             |
//! | `path`         | path relative to the source                      |
//! | `path2`        | move destination, relative                       |
//! | `source_path`  | `source` + `path`                                |
//! | `target_path`  | `target` joined with `path`                      |
//! | `target_path2` | `target` joined with `path2`                     |
//!
//! The `quote` filter wraps a value in single quotes for `/bin/sh`.

use std::collections::{BTreeMap, HashMap};

use tera::{Tera, Value};

use tether_core::{CallbackBodies, EventKind, SyncName};

use crate::callback::{slot_name, CallbackSet};
use crate::error::CallbackError;

/// Quote `raw` so `/bin/sh` reads it back as one literal word.
pub fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

fn quote_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(Value::String(shell_quote(&raw)))
}

fn template_name(sync: &SyncName, kind: EventKind) -> String {
    format!("{}/{}", sync.0, slot_name(kind))
}

/// Compiles callback bodies once, at initialization.
#[derive(Debug, Clone, Default)]
pub struct Translator;

impl Translator {
    pub fn new() -> Self {
        Translator
    }

    /// Compile every configured slot of one sync.
    ///
    /// Fails on the first body that is not a valid template.
    pub fn translate(
        &self,
        sync: &SyncName,
        bodies: &CallbackBodies,
    ) -> Result<CallbackSet, CallbackError> {
        let mut tera = Tera::default();
        tera.register_filter("quote", quote_filter);

        let mut slots = BTreeMap::new();
        for (kind, body) in bodies.slots() {
            let name = template_name(sync, kind);
            tera.add_raw_template(&name, body)
                .map_err(|source| CallbackError::Compile {
                    sync: sync.0.clone(),
                    slot: slot_name(kind).to_string(),
                    source,
                })?;
            slots.insert(kind, name);
        }
        Ok(CallbackSet::new(tera, slots))
    }
}
