//! Spatial reference handling.
//!
//! The engine treats geometry as an opaque capability: a
//! [`SpatialReference`] carries a WKT-style definition string and the
//! engine only ever asks whether it is empty and copies it around. Actual
//! coordinate transformation belongs to collaborating crates.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// An opaque spatial reference definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpatialReference {
    definition: String,
}

impl SpatialReference {
    /// Creates a reference from a WKT or authority string (e.g. `EPSG:4326`).
    #[must_use]
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into(),
        }
    }

    /// Returns whether no reference has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definition.is_empty()
    }

    /// Returns the horizontal-only representation.
    ///
    /// Vertical datum handling is delegated to the geometry collaborator;
    /// the engine reports the definition it was handed.
    #[must_use]
    pub fn wkt(&self) -> &str {
        &self.definition
    }

    /// Returns the compound (horizontal + vertical) representation.
    #[must_use]
    pub fn compound_wkt(&self) -> &str {
        &self.definition
    }
}

impl FromStr for SpatialReference {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_by_default() {
        assert!(SpatialReference::default().is_empty());
        assert!(!SpatialReference::new("EPSG:26910").is_empty());
    }

    #[test]
    fn test_parses_from_option_string() {
        let srs: SpatialReference = "EPSG:4326".parse().unwrap();
        assert_eq!(srs.wkt(), "EPSG:4326");
        assert_eq!(srs.compound_wkt(), "EPSG:4326");
    }
}
