//! Stage configuration options.
//!
//! [`Options`] is an ordered multimap of named configuration values.
//! Names are case-normalized (ASCII lowercase) on insert and lookup, values
//! are stored as strings and retrieved typed through [`std::str::FromStr`].
//! Several entries may share a name; lookups return the first.

use std::fmt;

use crate::error::PipelineError;

/// One named configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    name: String,
    value: String,
}

impl OptionEntry {
    /// Returns the normalized option name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw string value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Ordered multimap of named configuration values attached to a stage.
///
/// # Example
///
/// ```
/// use pointflow_core::Options;
///
/// let opts = Options::new()
///     .with("count", 1000)
///     .with("Mode", "ramp");
/// assert_eq!(opts.get::<u64>("count").unwrap(), 1000);
/// // Lookup is case-normalized.
/// assert_eq!(opts.get::<String>("mode").unwrap(), "ramp");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: Vec<OptionEntry>,
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl Options {
    /// Creates an empty option set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an option. Duplicate names are allowed; lookups return the
    /// first entry with a given name.
    pub fn add(&mut self, name: impl AsRef<str>, value: impl ToString) {
        self.entries.push(OptionEntry {
            name: normalize(name.as_ref()),
            value: value.to_string(),
        });
    }

    /// Appends an option only if no entry with that name exists.
    ///
    /// Calling this twice with the same name and different values keeps the
    /// first value.
    pub fn add_conditional(&mut self, name: impl AsRef<str>, value: impl ToString) {
        if !self.has(name.as_ref()) {
            self.add(name, value);
        }
    }

    /// Builder-style [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl ToString) -> Self {
        self.add(name, value);
        self
    }

    /// Returns whether an entry with the given name exists.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let name = normalize(name);
        self.entries.iter().any(|e| e.name == name)
    }

    /// Returns the first raw value for a name, if present.
    #[must_use]
    pub fn get_raw(&self, name: &str) -> Option<&str> {
        let name = normalize(name);
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Returns every raw value recorded under a name, in insertion order.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        let name = normalize(name);
        self.entries
            .iter()
            .filter(move |e| e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Returns the first value for a name, parsed as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingOption`] when no entry with the name
    /// exists, or [`PipelineError::InvalidOption`] when the value cannot be
    /// parsed.
    pub fn get<T>(&self, name: &str) -> Result<T, PipelineError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        let raw = self
            .get_raw(name)
            .ok_or_else(|| PipelineError::MissingOption(normalize(name)))?;
        raw.parse::<T>().map_err(|e| PipelineError::InvalidOption {
            name: normalize(name),
            reason: e.to_string(),
        })
    }

    /// Returns the first value for a name parsed as `T`, or `default` when
    /// no entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOption`] when a value is present but
    /// cannot be parsed; a missing name is not an error.
    pub fn get_or<T>(&self, name: &str, default: T) -> Result<T, PipelineError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.get_raw(name) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|e| PipelineError::InvalidOption {
                name: normalize(name),
                reason: e.to_string(),
            }),
        }
    }

    /// Appends every entry of `other`.
    pub fn merge(&mut self, other: &Options) {
        self.entries.extend(other.entries.iter().cloned());
    }

    /// Appends the entries of `other` whose names are absent here.
    ///
    /// This is the conditional merge used when a stage adopts inherited
    /// configuration without overriding anything it set itself.
    pub fn merge_conditional(&mut self, other: &Options) {
        for entry in &other.entries {
            if !self.has(&entry.name) {
                self.entries.push(entry.clone());
            }
        }
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the option set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.iter()
    }
}
