//! Error types for tether-callback.

use thiserror::Error;

/// All errors that can arise from compiling or rendering callbacks.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// A callback body is not a valid template.
    #[error("sync '{sync}': cannot compile {slot} callback: {source}")]
    Compile {
        sync: String,
        slot: String,
        #[source]
        source: tera::Error,
    },

    /// Rendering failed, e.g. an unknown variable.
    #[error("cannot render {slot} callback: {source}")]
    Render {
        slot: String,
        #[source]
        source: tera::Error,
    },
}
