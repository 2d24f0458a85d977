//! Error types for the stage factory and plugin loading.

use pointflow_core::PipelineError;

/// Errors raised by driver creation and plugin loading.
///
/// Plugin errors are isolated per plugin: discovery reports them and moves
/// on to the next candidate. Driver-lookup errors are fatal to the call
/// that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No constructor is registered under the requested type name.
    #[error("no {kind} driver registered for type '{name}'")]
    DriverNotFound {
        /// Registry consulted (`reader`, `filter`, or `writer`).
        kind: &'static str,
        /// The requested driver-type name.
        name: String,
    },

    /// A shared library could not be loaded.
    #[error("plugin '{path}' failed to load: {reason}")]
    PluginLoad {
        /// Path handed to the loader.
        path: String,
        /// Loader-reported reason.
        reason: String,
    },

    /// A well-known entry point was missing from a plugin.
    #[error("plugin '{path}' is missing symbol '{symbol}'")]
    PluginSymbol {
        /// Path of the offending plugin.
        path: String,
        /// The symbol that failed to resolve.
        symbol: String,
    },

    /// A plugin reported a version this host does not support.
    #[error("plugin '{name}' reports version {found}, host expects {expected}")]
    PluginVersion {
        /// Logical plugin name.
        name: String,
        /// Version the plugin reported.
        found: u32,
        /// Version this host was built against.
        expected: u32,
    },

    /// A path handed to plugin registration does not follow the plugin
    /// naming convention.
    #[error("'{0}' is not a pointflow plugin filename")]
    InvalidPluginName(String),

    /// An error surfaced from the pipeline engine.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}
