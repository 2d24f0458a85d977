//! Shared-library loading via `libloading`.

#![allow(unsafe_code)]

use std::path::Path;

use crate::error::DriverError;

use super::{DynamicLoader, PluginLibrary, PluginRegisterFn, PluginVersionFn};

/// The production [`DynamicLoader`], backed by `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibLoader;

struct LoadedLibrary {
    path: String,
    library: libloading::Library,
}

impl DynamicLoader for LibLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, DriverError> {
        let display = path.display().to_string();
        // SAFETY: loading a library runs its initializers. Plugins are
        // trusted code selected by the configured driver path; the version
        // entry point is checked before any driver registration happens.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| {
            DriverError::PluginLoad {
                path: display.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Box::new(LoadedLibrary {
            path: display,
            library,
        }))
    }
}

impl LoadedLibrary {
    fn symbol<T: Copy>(&self, symbol: &str) -> Result<T, DriverError> {
        let name = format!("{symbol}\0");
        // SAFETY: the caller requests one of the two well-known entry-point
        // types; a plugin exporting the symbol with a different signature is
        // undefined behavior, which is inherent to convention-based plugin
        // loading. The function pointer remains valid because the factory
        // keeps this library alive for the process lifetime.
        let resolved = unsafe { self.library.get::<T>(name.as_bytes()) }.map_err(|_| {
            DriverError::PluginSymbol {
                path: self.path.clone(),
                symbol: symbol.to_string(),
            }
        })?;
        Ok(*resolved)
    }
}

impl PluginLibrary for LoadedLibrary {
    fn register_fn(&self, symbol: &str) -> Result<PluginRegisterFn, DriverError> {
        self.symbol::<PluginRegisterFn>(symbol)
    }

    fn version_fn(&self, symbol: &str) -> Result<PluginVersionFn, DriverError> {
        self.symbol::<PluginVersionFn>(symbol)
    }
}
