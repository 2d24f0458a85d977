//! Naming-convention plugin discovery and loading.
//!
//! Plugins are shared libraries named `libpointflow_plugin_{kind}_{name}`
//! (for example `libpointflow_plugin_writer_text.so`). Each exports two
//! entry points derived from its filename:
//!
//! - `PointflowRegister_{kind}_{name}` — called with the [`StageFactory`]
//!   so the plugin can register its drivers
//! - `PointflowRegister_version_{kind}_{name}` — returns the plugin API
//!   version, checked against [`PLUGIN_API_VERSION`] before the plugin is
//!   trusted
//!
//! The filesystem scan and the naming/version logic live here; the actual
//! dynamic loading is abstracted behind [`DynamicLoader`] so the whole
//! mechanism is testable without real shared libraries.
//!
//! [`StageFactory`]: crate::factory::StageFactory

mod loader;

pub use loader::LibLoader;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DriverError;
use crate::factory::StageFactory;

/// Version token a plugin must report to be trusted by this host.
pub const PLUGIN_API_VERSION: u32 = 1;

/// Filename prefix identifying candidate plugin libraries.
pub const PLUGIN_PREFIX: &str = "libpointflow_plugin";

/// Environment variable holding colon-separated plugin directories.
pub const DRIVER_PATH_ENV: &str = "POINTFLOW_DRIVER_PATH";

/// Fallback plugin directories used when [`DRIVER_PATH_ENV`] is unset.
pub const DEFAULT_DRIVER_PATH: &str = "/usr/local/lib:./lib";

/// Registration entry point exported by a plugin.
pub type PluginRegisterFn = extern "C" fn(&StageFactory);

/// Version entry point exported by a plugin.
pub type PluginVersionFn = extern "C" fn() -> u32;

/// A loaded plugin library able to resolve the two well-known entry points.
///
/// The returned function pointers stay valid for the life of the library;
/// the factory keeps every loaded library alive for the process, so loaded
/// plugin code is never unloaded during a run.
pub trait PluginLibrary: Send + Sync {
    /// Resolves the registration entry point by symbol name.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PluginSymbol`] when the symbol is absent.
    fn register_fn(&self, symbol: &str) -> Result<PluginRegisterFn, DriverError>;

    /// Resolves the version entry point by symbol name.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PluginSymbol`] when the symbol is absent.
    fn version_fn(&self, symbol: &str) -> Result<PluginVersionFn, DriverError>;
}

/// Capability for loading shared libraries.
///
/// Production code uses [`LibLoader`]; tests inject mocks to exercise
/// discovery and version checking without real shared libraries.
pub trait DynamicLoader: Send + Sync {
    /// Loads the library at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PluginLoad`] when the library cannot be
    /// loaded.
    fn load(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, DriverError>;
}

/// One plugin file selected for loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCandidate {
    /// Canonical basename with every trailing extension stripped.
    pub basename: String,
    /// Path to the chosen filesystem entry.
    pub path: PathBuf,
}

/// Returns the canonical basename of a plugin filename: the name with all
/// trailing extensions stripped, so versioned filenames collapse to one
/// logical plugin (`libpointflow_plugin_writer_text.1.2.so` and
/// `libpointflow_plugin_writer_text.so` both yield
/// `libpointflow_plugin_writer_text`).
#[must_use]
pub fn plugin_basename(filename: &str) -> &str {
    match filename.find('.') {
        Some(dot) => &filename[..dot],
        None => filename,
    }
}

/// Derives the logical plugin name from a canonical basename by stripping
/// the plugin prefix.
///
/// # Errors
///
/// Returns [`DriverError::InvalidPluginName`] when the basename does not
/// carry the prefix.
pub fn plugin_name(basename: &str) -> Result<String, DriverError> {
    let lower = basename.to_ascii_lowercase();
    let prefixed = format!("{PLUGIN_PREFIX}_");
    if lower.starts_with(&prefixed) {
        Ok(basename[prefixed.len()..].to_string())
    } else {
        Err(DriverError::InvalidPluginName(basename.to_string()))
    }
}

/// Returns the registration symbol for a logical plugin name.
#[must_use]
pub fn register_symbol(name: &str) -> String {
    format!("PointflowRegister_{name}")
}

/// Returns the version symbol for a logical plugin name.
#[must_use]
pub fn version_symbol(name: &str) -> String {
    format!("PointflowRegister_version_{name}")
}

fn has_library_suffix(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    Path::new(&lower)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| matches!(ext, "so" | "dylib" | "dll"))
}

/// Scans one directory for plugin candidates.
///
/// Entries whose filename starts with [`PLUGIN_PREFIX`] (case-insensitive)
/// and ends in a shared-library suffix are collapsed by canonical basename;
/// when several entries share a basename, a symbolic link is preferred over
/// a regular file (the symlink is treated as the most-current build).
/// Exactly one candidate per basename is returned, sorted by basename.
#[must_use]
pub fn discover_plugins(dir: &Path) -> Vec<PluginCandidate> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut by_basename: Vec<(String, PathBuf, bool)> = Vec::new();
    for entry in entries.flatten() {
        let filename = entry.file_name();
        let Some(filename) = filename.to_str() else {
            continue;
        };
        if !filename
            .to_ascii_lowercase()
            .starts_with(PLUGIN_PREFIX)
        {
            continue;
        }
        if !has_library_suffix(filename) {
            continue;
        }

        let basename = plugin_basename(filename).to_string();
        let is_symlink = entry
            .file_type()
            .map(|t| t.is_symlink())
            .unwrap_or(false);
        let path = entry.path();

        match by_basename.iter_mut().find(|(b, _, _)| *b == basename) {
            Some((_, existing_path, existing_symlink)) => {
                // Prefer the symlink over a hard file of the same basename.
                if is_symlink && !*existing_symlink {
                    *existing_path = path;
                    *existing_symlink = true;
                }
            }
            None => by_basename.push((basename, path, is_symlink)),
        }
    }

    by_basename.sort_by(|a, b| a.0.cmp(&b.0));
    by_basename
        .into_iter()
        .map(|(basename, path, _)| PluginCandidate { basename, path })
        .collect()
}

/// Returns the configured plugin directories: the colon-separated value of
/// [`DRIVER_PATH_ENV`], or [`DEFAULT_DRIVER_PATH`] when unset or empty.
#[must_use]
pub fn plugin_directories() -> Vec<PathBuf> {
    let raw = std::env::var(DRIVER_PATH_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_DRIVER_PATH.to_string());
    raw.split(':')
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}
