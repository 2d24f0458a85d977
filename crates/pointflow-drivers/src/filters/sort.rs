//! In-place dimension sort filter.

use pointflow_core::{
    DimId, Driver, Options, PipelineError, PointViewRef, PointViewSet, StageContext, StageKind,
};

/// `filters.sort`: reorders each view by a named dimension, ascending.
///
/// Options: `dimension` (required). The sort reorders the view's index
/// sequence in place; the underlying rows never move.
#[derive(Debug, Default)]
pub struct SortFilter {
    dimension: String,
    dim: Option<DimId>,
}

impl Driver for SortFilter {
    fn name(&self) -> &str {
        "filters.sort"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn process_options(&mut self, options: &Options) -> Result<(), PipelineError> {
        self.dimension = options.get("dimension")?;
        Ok(())
    }

    fn ready(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        // The layout is finalized by now, so the id is stable for the run.
        self.dim = Some(ctx.table.layout().require_dim(&self.dimension)?);
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        let dim = self
            .dim
            .ok_or_else(|| PipelineError::NotPrepared(self.name().to_string()))?;

        let mut keyed: Vec<(f64, u64)> = Vec::with_capacity(view.len());
        for pos in 0..view.len() {
            let id = view.point_id(pos).ok_or(PipelineError::PointOutOfRange {
                index: pos,
                len: view.len(),
            })?;
            keyed.push((view.field(dim, pos)?, id));
        }
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        view.set_order(keyed.into_iter().map(|(_, id)| id).collect());
        Ok(PointViewSet::from_view(view))
    }
}
