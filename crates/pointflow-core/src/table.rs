//! Shared point storage for one pipeline run.
//!
//! A [`PointTable`] holds the dimension layout, the metadata tree, the
//! table-level spatial reference, and the row store. It is shared by
//! reference by every stage in a run: clones are handles onto the same
//! table.
//!
//! Rows are fixed-stride byte records laid out by the finalized
//! [`PointLayout`]. Field access goes through the declared storage type;
//! the engine-facing value type is `f64`, converted on the way in and out.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::PipelineError;
use crate::layout::{DimId, DimType, PointLayout};
use crate::metadata::MetadataNode;
use crate::srs::SpatialReference;

/// Index of one point record in the table's row store.
pub type PointId = u64;

struct RowStore {
    data: Vec<u8>,
    point_size: usize,
    count: usize,
}

struct TableInner {
    layout: RwLock<PointLayout>,
    metadata: MetadataNode,
    srs: RwLock<SpatialReference>,
    rows: RwLock<RowStore>,
    next_view_id: AtomicU32,
}

/// Process-wide-per-pipeline storage of layout, metadata, and rows.
///
/// Lifetime spans one full pipeline execution; every stage holds the same
/// underlying table through cheap clones.
#[derive(Clone)]
pub struct PointTable {
    inner: Arc<TableInner>,
}

impl Default for PointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PointTable {
    /// Creates an empty table with an empty layout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TableInner {
                layout: RwLock::new(PointLayout::new()),
                metadata: MetadataNode::root(),
                srs: RwLock::new(SpatialReference::default()),
                rows: RwLock::new(RowStore {
                    data: Vec::new(),
                    point_size: 0,
                    count: 0,
                }),
                next_view_id: AtomicU32::new(0),
            }),
        }
    }

    /// Returns a read guard on the layout.
    #[must_use]
    pub fn layout(&self) -> RwLockReadGuard<'_, PointLayout> {
        self.inner.layout.read()
    }

    /// Returns a write guard on the layout, for dimension registration and
    /// finalization during the stage lifecycle.
    #[must_use]
    pub fn layout_mut(&self) -> RwLockWriteGuard<'_, PointLayout> {
        self.inner.layout.write()
    }

    /// Returns a handle to the metadata tree root.
    #[must_use]
    pub fn metadata(&self) -> MetadataNode {
        self.inner.metadata.clone()
    }

    /// Returns the table-level spatial reference.
    ///
    /// This is "the" reference of the data as seen by downstream writers:
    /// the last stage (in execution-completion order) that held a non-empty
    /// reference wrote it here.
    #[must_use]
    pub fn spatial_reference(&self) -> SpatialReference {
        self.inner.srs.read().clone()
    }

    /// Sets the table-level spatial reference. Last writer wins.
    pub fn set_spatial_reference(&self, srs: SpatialReference) {
        *self.inner.srs.write() = srs;
    }

    /// Returns the number of point records stored.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.inner.rows.read().count
    }

    /// Appends one zeroed point record and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LayoutNotFinalized`] when called before the
    /// layout freeze; the record stride is not known until then.
    pub fn add_point(&self) -> Result<PointId, PipelineError> {
        let point_size = {
            let layout = self.layout();
            if !layout.is_finalized() {
                return Err(PipelineError::LayoutNotFinalized);
            }
            layout.point_size()
        };
        let mut rows = self.inner.rows.write();
        rows.point_size = point_size;
        let new_len = rows.data.len() + point_size;
        rows.data.resize(new_len, 0);
        let id = rows.count as PointId;
        rows.count += 1;
        Ok(id)
    }

    /// Writes a field of one point, converting through the declared storage
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownDimension`] for an unregistered id and
    /// [`PipelineError::PointOutOfRange`] for an out-of-bounds point.
    pub fn set_field(&self, dim: DimId, id: PointId, value: f64) -> Result<(), PipelineError> {
        let (offset, dim_type) = self.dim_slot(dim)?;
        let mut rows = self.inner.rows.write();
        let base = Self::row_base(&rows, id)? + offset;
        encode(&mut rows.data[base..base + dim_type.size()], dim_type, value);
        Ok(())
    }

    /// Reads a field of one point, converting through the declared storage
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownDimension`] for an unregistered id and
    /// [`PipelineError::PointOutOfRange`] for an out-of-bounds point.
    pub fn field(&self, dim: DimId, id: PointId) -> Result<f64, PipelineError> {
        let (offset, dim_type) = self.dim_slot(dim)?;
        let rows = self.inner.rows.read();
        let base = Self::row_base(&rows, id)? + offset;
        Ok(decode(&rows.data[base..base + dim_type.size()], dim_type))
    }

    fn dim_slot(&self, dim: DimId) -> Result<(usize, DimType), PipelineError> {
        let layout = self.layout();
        let info = layout
            .dim_info(dim)
            .ok_or_else(|| PipelineError::UnknownDimension(format!("#{}", dim.0)))?;
        Ok((info.offset, info.dim_type))
    }

    fn row_base(rows: &RowStore, id: PointId) -> Result<usize, PipelineError> {
        #[allow(clippy::cast_possible_truncation)]
        let idx = id as usize;
        if idx >= rows.count {
            return Err(PipelineError::PointOutOfRange {
                index: idx,
                len: rows.count,
            });
        }
        Ok(idx * rows.point_size)
    }

    pub(crate) fn next_view_id(&self) -> u32 {
        self.inner.next_view_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for PointTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointTable")
            .field("dims", &self.layout().dims().len())
            .field("finalized", &self.layout().is_finalized())
            .field("points", &self.point_count())
            .field("srs", &self.spatial_reference())
            .finish_non_exhaustive()
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn encode(buf: &mut [u8], dim_type: DimType, value: f64) {
    match dim_type {
        DimType::I8 => buf.copy_from_slice(&(value as i8).to_le_bytes()),
        DimType::U8 => buf.copy_from_slice(&(value as u8).to_le_bytes()),
        DimType::I16 => buf.copy_from_slice(&(value as i16).to_le_bytes()),
        DimType::U16 => buf.copy_from_slice(&(value as u16).to_le_bytes()),
        DimType::I32 => buf.copy_from_slice(&(value as i32).to_le_bytes()),
        DimType::U32 => buf.copy_from_slice(&(value as u32).to_le_bytes()),
        DimType::I64 => buf.copy_from_slice(&(value as i64).to_le_bytes()),
        DimType::U64 => buf.copy_from_slice(&(value as u64).to_le_bytes()),
        DimType::F32 => buf.copy_from_slice(&(value as f32).to_le_bytes()),
        DimType::F64 => buf.copy_from_slice(&value.to_le_bytes()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode(buf: &[u8], dim_type: DimType) -> f64 {
    // Slice lengths are produced from `dim_type.size()`, so the conversions
    // below cannot fail.
    match dim_type {
        DimType::I8 => f64::from(buf[0] as i8),
        DimType::U8 => f64::from(buf[0]),
        DimType::I16 => f64::from(i16::from_le_bytes([buf[0], buf[1]])),
        DimType::U16 => f64::from(u16::from_le_bytes([buf[0], buf[1]])),
        DimType::I32 => f64::from(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        DimType::U32 => f64::from(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        DimType::I64 => i64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]) as f64,
        DimType::U64 => u64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]) as f64,
        DimType::F32 => f64::from(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])),
        DimType::F64 => f64::from_le_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]),
    }
}
