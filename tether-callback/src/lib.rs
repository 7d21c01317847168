//! # tether-callback
//!
//! Compiles the scripted callback bodies of a sync into typed callback values.
//!
//! Bodies are Tera templates rendered against an [`EventContext`]; the result
//! is a shell script wrapped in a [`WorkerCommand`](tether_core::WorkerCommand).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tether_callback::{EventContext, Translator};
//! use tether_core::{EventKind, SyncConfig};
//!
//! fn compile(sync: &SyncConfig) {
//!     let translator = Translator::new();
//!     if let Ok(callbacks) = translator.translate(&sync.name, &sync.callbacks) {
//!         let ctx = EventContext::new(sync, EventKind::Init, None, None);
//!         if let Ok(Some(command)) = callbacks.render(EventKind::Init, &ctx) {
//!             println!("{:?}", command.script());
//!         }
//!     }
//! }
//! ```

pub mod callback;
pub mod context;
pub mod error;
pub mod translator;

pub use callback::CallbackSet;
pub use context::EventContext;
pub use error::CallbackError;
pub use translator::{shell_quote, Translator};
