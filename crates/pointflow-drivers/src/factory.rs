//! Stage factory: driver registries, filename inference, plugin loading.
//!
//! The [`StageFactory`] maps driver-type names to zero-argument
//! constructors. Built-in drivers are registered at construction, followed
//! by any plugins discovered in the configured driver path; registrations
//! live for the process and are never removed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use pointflow_core::{Driver, Options};

use crate::error::DriverError;
use crate::plugin::{
    self, DynamicLoader, LibLoader, PluginLibrary, PLUGIN_API_VERSION,
};

/// Constructor producing a fresh driver instance.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn Driver> + Send + Sync>;

/// Registry and loader mapping driver-type names to stage constructors.
///
/// # Example
///
/// ```rust,ignore
/// use pointflow_drivers::StageFactory;
///
/// let factory = StageFactory::new();
/// let reader = factory.create_reader("readers.faux")?;
/// let writer_type = factory.infer_writer_driver("out.csv");
/// ```
pub struct StageFactory {
    readers: RwLock<FxHashMap<String, DriverFactory>>,
    filters: RwLock<FxHashMap<String, DriverFactory>>,
    writers: RwLock<FxHashMap<String, DriverFactory>>,
    /// Loaded plugin libraries, kept alive for the process.
    loaded: Mutex<Vec<Box<dyn PluginLibrary>>>,
}

impl StageFactory {
    /// Creates a factory with the built-in drivers registered and any
    /// plugins in the configured driver path discovered and loaded.
    ///
    /// Plugin failures are reported and skipped; they never abort
    /// construction.
    #[must_use]
    pub fn new() -> Self {
        let factory = Self::empty();
        factory.register_known_drivers();
        factory.load_plugins();
        factory
    }

    /// Creates a bare factory with nothing registered.
    ///
    /// Useful for tests and for hosts that register a custom driver set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            readers: RwLock::new(FxHashMap::default()),
            filters: RwLock::new(FxHashMap::default()),
            writers: RwLock::new(FxHashMap::default()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    fn register_known_drivers(&self) {
        self.register_reader("readers.faux", Arc::new(|| {
            Box::new(crate::readers::FauxReader::default())
        }));
        self.register_filter("filters.merge", Arc::new(|| {
            Box::new(crate::filters::MergeFilter::default())
        }));
        self.register_filter("filters.decimation", Arc::new(|| {
            Box::new(crate::filters::DecimationFilter::default())
        }));
        self.register_filter("filters.sort", Arc::new(|| {
            Box::new(crate::filters::SortFilter::default())
        }));
        self.register_writer("writers.text", Arc::new(|| {
            Box::new(crate::writers::TextWriter::default())
        }));
    }

    // ---- Registration ----

    /// Registers a reader constructor. The last registration for a name
    /// wins.
    pub fn register_reader(&self, name: impl Into<String>, factory: DriverFactory) {
        self.readers.write().insert(name.into(), factory);
    }

    /// Registers a filter constructor. The last registration for a name
    /// wins.
    pub fn register_filter(&self, name: impl Into<String>, factory: DriverFactory) {
        self.filters.write().insert(name.into(), factory);
    }

    /// Registers a writer constructor. The last registration for a name
    /// wins.
    pub fn register_writer(&self, name: impl Into<String>, factory: DriverFactory) {
        self.writers.write().insert(name.into(), factory);
    }

    /// Returns whether a reader type is registered.
    #[must_use]
    pub fn has_reader(&self, name: &str) -> bool {
        self.readers.read().contains_key(name)
    }

    /// Returns whether a filter type is registered.
    #[must_use]
    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.read().contains_key(name)
    }

    /// Returns whether a writer type is registered.
    #[must_use]
    pub fn has_writer(&self, name: &str) -> bool {
        self.writers.read().contains_key(name)
    }

    // ---- Creation ----

    /// Creates a new reader of the given driver type.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DriverNotFound`] when the type is not
    /// registered.
    pub fn create_reader(&self, name: &str) -> Result<Box<dyn Driver>, DriverError> {
        Self::create(&self.readers, "reader", name)
    }

    /// Creates a new filter of the given driver type.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DriverNotFound`] when the type is not
    /// registered.
    pub fn create_filter(&self, name: &str) -> Result<Box<dyn Driver>, DriverError> {
        Self::create(&self.filters, "filter", name)
    }

    /// Creates a new writer of the given driver type.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DriverNotFound`] when the type is not
    /// registered.
    pub fn create_writer(&self, name: &str) -> Result<Box<dyn Driver>, DriverError> {
        Self::create(&self.writers, "writer", name)
    }

    fn create(
        registry: &RwLock<FxHashMap<String, DriverFactory>>,
        kind: &'static str,
        name: &str,
    ) -> Result<Box<dyn Driver>, DriverError> {
        let registry = registry.read();
        let factory = registry.get(name).ok_or_else(|| DriverError::DriverNotFound {
            kind,
            name: name.to_string(),
        })?;
        Ok(factory())
    }

    // ---- Driver inference ----

    /// Derives a reader driver type from a filename's extension.
    ///
    /// Core formats map unconditionally; optional formats (`pcd`, `rxp`,
    /// the NITF family) apply only when a plugin has registered the
    /// corresponding driver. Returns `None` when no mapping exists.
    #[must_use]
    pub fn infer_reader_driver(&self, filename: &str) -> Option<String> {
        let ext = extension_of(filename)?;
        let driver = match ext.as_str() {
            "las" | "laz" => "readers.las",
            "bin" => "readers.terrasolid",
            "qi" => "readers.qfit",
            "bpf" => "readers.bpf",
            "sbet" => "readers.sbet",
            "sqlite" => "readers.sqlite",
            "pcd" if self.has_reader("readers.pcd") => "readers.pcd",
            "rxp" if self.has_reader("readers.rxp") => "readers.rxp",
            "nitf" | "ntf" | "nsf" if self.has_reader("readers.nitf") => "readers.nitf",
            _ => return None,
        };
        Some(driver.to_string())
    }

    /// Derives a writer driver type from a filename's extension.
    ///
    /// The literal target `STDOUT` (case-insensitive), a missing extension,
    /// and any unmapped extension all fall back to the default text writer,
    /// so every filename maps to a driver.
    #[must_use]
    pub fn infer_writer_driver(&self, filename: &str) -> String {
        const TEXT: &str = "writers.text";
        if filename.eq_ignore_ascii_case("stdout") {
            return TEXT.to_string();
        }
        let driver = match extension_of(filename).as_deref() {
            Some("las" | "laz") => "writers.las",
            Some("sbet") => "writers.sbet",
            Some("sqlite") => "writers.sqlite",
            Some("pcd") if self.has_writer("writers.pcd") => "writers.pcd",
            Some("csv" | "json" | "xyz" | "txt") | None => TEXT,
            Some(_) => TEXT,
        };
        driver.to_string()
    }

    /// Returns the option adjustments implied by a writer filename: the
    /// `filename` itself, plus a compression hint for `.laz` output.
    #[must_use]
    pub fn infer_writer_options(&self, filename: &str) -> Options {
        let mut options = Options::new();
        if extension_of(filename).as_deref() == Some("laz") {
            options.add("compression", true);
        }
        if extension_of(filename).as_deref() == Some("pcd") && self.has_writer("writers.pcd") {
            options.add("format", "PCD");
        }
        options.add("filename", filename);
        options
    }

    // ---- Plugin loading ----

    /// Discovers and loads plugins from the configured driver path.
    ///
    /// Directories come from the `POINTFLOW_DRIVER_PATH` environment
    /// variable (colon-separated), falling back to the default pair of
    /// locations. Returns the number of plugins registered; failures are
    /// reported and skipped.
    pub fn load_plugins(&self) -> usize {
        let dirs = plugin::plugin_directories();
        self.load_plugins_from(&dirs, &LibLoader)
    }

    /// Discovers and loads plugins from explicit directories with an
    /// injected loader.
    ///
    /// Every candidate that fails to load, resolve its entry points, or
    /// pass the version check is reported and skipped; discovery always
    /// continues with the next candidate.
    pub fn load_plugins_from(&self, dirs: &[PathBuf], loader: &dyn DynamicLoader) -> usize {
        let mut registered = 0;
        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            for candidate in plugin::discover_plugins(dir) {
                match self.register_plugin_with(&candidate.path, loader) {
                    Ok(name) => {
                        debug!(plugin = %name, path = %candidate.path.display(), "registered plugin");
                        registered += 1;
                    }
                    Err(e) => {
                        warn!(path = %candidate.path.display(), error = %e, "skipping plugin");
                    }
                }
            }
        }
        registered
    }

    /// Loads one plugin with the production loader.
    ///
    /// # Errors
    ///
    /// Returns the load, symbol, naming, or version error that prevented
    /// registration.
    pub fn register_plugin(&self, path: &Path) -> Result<String, DriverError> {
        self.register_plugin_with(path, &LibLoader)
    }

    /// Loads one plugin with an injected loader, returning the logical
    /// plugin name on success.
    ///
    /// The filename is collapsed to its canonical basename, the plugin
    /// prefix is stripped to obtain the logical name, and the two
    /// convention-derived entry points are resolved. The version entry
    /// point runs first; only a compatible plugin gets to register drivers.
    ///
    /// # Errors
    ///
    /// Returns the load, symbol, naming, or version error that prevented
    /// registration.
    pub fn register_plugin_with(
        &self,
        path: &Path,
        loader: &dyn DynamicLoader,
    ) -> Result<String, DriverError> {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| DriverError::InvalidPluginName(path.display().to_string()))?;
        let basename = plugin::plugin_basename(filename);
        let name = plugin::plugin_name(basename)?;

        let library = loader.load(path)?;
        let version = library.version_fn(&plugin::version_symbol(&name))?();
        if version != PLUGIN_API_VERSION {
            return Err(DriverError::PluginVersion {
                name,
                found: version,
                expected: PLUGIN_API_VERSION,
            });
        }

        let register = library.register_fn(&plugin::register_symbol(&name))?;
        register(self);
        self.loaded.lock().push(library);
        Ok(name)
    }
}

impl Default for StageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageFactory")
            .field("readers", &self.readers.read().len())
            .field("filters", &self.filters.read().len())
            .field("writers", &self.writers.read().len())
            .field("plugins", &self.loaded.lock().len())
            .finish()
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}
