//! Point views: reorderable index sets over a shared table.
//!
//! A [`PointView`] is an ordered sequence of point ids into a
//! [`PointTable`]. Views are the unit of data flowing between stages: a
//! stage with no inputs gets one fresh empty view to populate, consuming
//! stages derive new views over the same table, and independent views may
//! reference overlapping or disjoint rows.
//!
//! [`PointViewSet`] is an insertion-ordered set deduplicated by view id,
//! matching the engine's merge semantics: a fan-in filter that returns the
//! same accumulated view from every runner contributes it once.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::PipelineError;
use crate::layout::DimId;
use crate::table::{PointId, PointTable};

/// Shared handle to a view.
pub type PointViewRef = Arc<PointView>;

/// An ordered index set over rows in a shared table.
pub struct PointView {
    id: u32,
    table: PointTable,
    indices: RwLock<Vec<PointId>>,
}

impl PointView {
    /// Creates a fresh empty view over the table.
    #[must_use]
    pub fn new(table: &PointTable) -> PointViewRef {
        Arc::new(Self {
            id: table.next_view_id(),
            table: table.clone(),
            indices: RwLock::new(Vec::new()),
        })
    }

    /// Creates another empty view over the same table.
    #[must_use]
    pub fn make_new(&self) -> PointViewRef {
        Self::new(&self.table)
    }

    /// Returns the view id, unique within its table.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the table this view indexes into.
    #[must_use]
    pub fn table(&self) -> &PointTable {
        &self.table
    }

    /// Returns the number of points in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.read().len()
    }

    /// Returns whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.read().is_empty()
    }

    /// Appends a new zeroed point to the table and to this view, returning
    /// its position within the view.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LayoutNotFinalized`] before the layout
    /// freeze.
    pub fn add_point(&self) -> Result<usize, PipelineError> {
        let id = self.table.add_point()?;
        let mut indices = self.indices.write();
        indices.push(id);
        Ok(indices.len() - 1)
    }

    /// Appends an existing table row to this view.
    pub fn append_id(&self, id: PointId) {
        self.indices.write().push(id);
    }

    /// Appends every point of `other`, in order.
    pub fn append_view(&self, other: &PointView) {
        let other_ids = other.indices.read().clone();
        self.indices.write().extend(other_ids);
    }

    /// Returns the table row id at a view position.
    #[must_use]
    pub fn point_id(&self, position: usize) -> Option<PointId> {
        self.indices.read().get(position).copied()
    }

    /// Replaces the view's ordering with the given row ids.
    ///
    /// Used by reordering filters; the ids must refer to rows of this
    /// view's table.
    pub fn set_order(&self, ids: Vec<PointId>) {
        *self.indices.write() = ids;
    }

    /// Returns a snapshot of the row ids, in view order.
    #[must_use]
    pub fn ids(&self) -> Vec<PointId> {
        self.indices.read().clone()
    }

    /// Reads a field of the point at a view position.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PointOutOfRange`] for a bad position and
    /// propagates table-level field errors.
    pub fn field(&self, dim: DimId, position: usize) -> Result<f64, PipelineError> {
        let id = self
            .point_id(position)
            .ok_or(PipelineError::PointOutOfRange {
                index: position,
                len: self.len(),
            })?;
        self.table.field(dim, id)
    }

    /// Writes a field of the point at a view position.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PointOutOfRange`] for a bad position and
    /// propagates table-level field errors.
    pub fn set_field(&self, dim: DimId, position: usize, value: f64) -> Result<(), PipelineError> {
        let id = self
            .point_id(position)
            .ok_or(PipelineError::PointOutOfRange {
                index: position,
                len: self.len(),
            })?;
        self.table.set_field(dim, id, value)
    }
}

impl std::fmt::Debug for PointView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointView")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered set of views, deduplicated by view id.
#[derive(Debug, Default, Clone)]
pub struct PointViewSet {
    views: Vec<PointViewRef>,
}

impl PointViewSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding one view.
    #[must_use]
    pub fn from_view(view: PointViewRef) -> Self {
        let mut set = Self::new();
        set.insert(view);
        set
    }

    /// Inserts a view, keeping the first occurrence of each view id.
    pub fn insert(&mut self, view: PointViewRef) {
        if !self.views.iter().any(|v| v.id() == view.id()) {
            self.views.push(view);
        }
    }

    /// Inserts every view of `other`, preserving order and dedup semantics.
    pub fn extend(&mut self, other: PointViewSet) {
        for view in other.views {
            self.insert(view);
        }
    }

    /// Returns the number of views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Iterates views in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PointViewRef> {
        self.views.iter()
    }
}

impl IntoIterator for PointViewSet {
    type Item = PointViewRef;
    type IntoIter = std::vec::IntoIter<PointViewRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.into_iter()
    }
}

impl<'a> IntoIterator for &'a PointViewSet {
    type Item = &'a PointViewRef;
    type IntoIter = std::slice::Iter<'a, PointViewRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DimType;

    fn table_with_x() -> (PointTable, DimId) {
        let table = PointTable::new();
        let x = {
            let mut layout = table.layout_mut();
            let x = layout.register_dim("X", DimType::F64).unwrap();
            layout.finalize();
            x
        };
        (table, x)
    }

    #[test]
    fn test_views_share_rows() {
        let (table, x) = table_with_x();
        let a = PointView::new(&table);
        let pos = a.add_point().unwrap();
        a.set_field(x, pos, 5.0).unwrap();

        // A second view referencing the same row sees the same data.
        let b = a.make_new();
        b.append_id(a.point_id(pos).unwrap());
        assert!((b.field(x, 0).unwrap() - 5.0).abs() < f64::EPSILON);

        b.set_field(x, 0, 6.0).unwrap();
        assert!((a.field(x, pos).unwrap() - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_view_ids_are_distinct() {
        let (table, _) = table_with_x();
        let a = PointView::new(&table);
        let b = PointView::new(&table);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_reorder() {
        let (table, x) = table_with_x();
        let view = PointView::new(&table);
        for v in [3.0, 1.0, 2.0] {
            let pos = view.add_point().unwrap();
            view.set_field(x, pos, v).unwrap();
        }

        let mut ids = view.ids();
        ids.reverse();
        view.set_order(ids);

        let values: Vec<f64> = (0..view.len()).map(|p| view.field(x, p).unwrap()).collect();
        assert_eq!(values, vec![2.0, 1.0, 3.0]);
    }

    #[test]
    fn test_set_dedups_by_view_id() {
        let (table, _) = table_with_x();
        let view = PointView::new(&table);

        let mut set = PointViewSet::new();
        set.insert(view.clone());
        set.insert(view.clone());
        assert_eq!(set.len(), 1);

        let mut other = PointViewSet::from_view(view.make_new());
        other.insert(view);
        set.extend(other);
        assert_eq!(set.len(), 2);
    }
}
