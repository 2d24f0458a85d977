//! Dimension layout for the shared point table.
//!
//! A [`PointLayout`] maps dimension names to storage types and fixed byte
//! offsets within a point record. The layout is append-only while stages
//! prepare; it is finalized exactly once, immediately before the first
//! stage executes, and rejects registration afterwards.

use fxhash::FxHashMap;

use crate::error::PipelineError;

/// Storage type of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimType {
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl DimType {
    /// Returns the storage size in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

/// Identifier of a registered dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimId(pub u32);

/// Description of one registered dimension.
#[derive(Debug, Clone)]
pub struct DimInfo {
    /// Dimension identifier.
    pub id: DimId,
    /// Dimension name (e.g. `X`, `Intensity`).
    pub name: String,
    /// Storage type.
    pub dim_type: DimType,
    /// Byte offset within a point record.
    pub offset: usize,
}

/// Append-only name-to-storage-type registry with fixed-stride offsets.
#[derive(Debug, Default)]
pub struct PointLayout {
    dims: Vec<DimInfo>,
    index: FxHashMap<String, DimId>,
    point_size: usize,
    finalized: bool,
}

impl PointLayout {
    /// Creates an empty layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a dimension, or returns the existing id when the same name
    /// was already registered with the same storage type.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LayoutFinalized`] after [`finalize`](Self::finalize),
    /// and [`PipelineError::DimensionConflict`] when the name exists with a
    /// different storage type.
    pub fn register_dim(
        &mut self,
        name: impl Into<String>,
        dim_type: DimType,
    ) -> Result<DimId, PipelineError> {
        let name = name.into();
        if let Some(&id) = self.index.get(&name) {
            let existing = self.dims[id.0 as usize].dim_type;
            if existing == dim_type {
                return Ok(id);
            }
            return Err(PipelineError::DimensionConflict {
                name,
                existing,
                requested: dim_type,
            });
        }
        if self.finalized {
            return Err(PipelineError::LayoutFinalized(name));
        }

        // Dimension counts are tiny; u32 ids follow the teacher's node ids.
        #[allow(clippy::cast_possible_truncation)]
        let id = DimId(self.dims.len() as u32);
        self.dims.push(DimInfo {
            id,
            name: name.clone(),
            dim_type,
            offset: self.point_size,
        });
        self.point_size += dim_type.size();
        self.index.insert(name, id);
        Ok(id)
    }

    /// Freezes the dimension set. Idempotent.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Returns whether the layout has been finalized.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns the dimension registered under `name`.
    #[must_use]
    pub fn dim(&self, name: &str) -> Option<&DimInfo> {
        self.index.get(name).map(|id| &self.dims[id.0 as usize])
    }

    /// Returns the dimension with the given id.
    #[must_use]
    pub fn dim_info(&self, id: DimId) -> Option<&DimInfo> {
        self.dims.get(id.0 as usize)
    }

    /// Looks up a dimension id by name.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownDimension`] when absent.
    pub fn require_dim(&self, name: &str) -> Result<DimId, PipelineError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::UnknownDimension(name.to_string()))
    }

    /// Returns every registered dimension in registration order.
    #[must_use]
    pub fn dims(&self) -> &[DimInfo] {
        &self.dims
    }

    /// Returns the byte size of one point record.
    #[must_use]
    pub fn point_size(&self) -> usize {
        self.point_size
    }
}
