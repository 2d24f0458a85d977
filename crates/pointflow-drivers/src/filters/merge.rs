//! Fan-in merge filter.

use parking_lot::Mutex;

use pointflow_core::{
    Driver, PipelineError, PointViewRef, PointViewSet, StageContext, StageKind,
};

/// `filters.merge`: accumulates every input view into one output view.
///
/// Each runner appends its view's points to a shared accumulator and
/// returns the accumulator itself; view-set deduplication collapses those
/// returns into a single output view. The accumulator resets at every
/// execute, so the stage can be reused across runs.
///
/// Points land in runner order, which is unspecified across concurrent
/// runners; callers needing a deterministic order sort downstream.
#[derive(Debug, Default)]
pub struct MergeFilter {
    merged: Mutex<Option<PointViewRef>>,
}

impl Driver for MergeFilter {
    fn name(&self) -> &str {
        "filters.merge"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn ready(&mut self, _ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        *self.merged.lock() = None;
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        let merged = {
            let mut slot = self.merged.lock();
            let merged = slot.get_or_insert_with(|| view.make_new()).clone();
            merged.append_view(&view);
            merged
        };
        Ok(PointViewSet::from_view(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::FauxReader;
    use pointflow_core::{Options, Pipeline, PointTable};

    #[test]
    fn test_merges_sibling_readers_into_one_view() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add(Box::new(FauxReader::default()));
        let b = pipeline.add(Box::new(FauxReader::default()));
        let merge = pipeline.add(Box::new(MergeFilter::default()));
        pipeline.set_input(merge, a).unwrap();
        pipeline.set_input(merge, b).unwrap();
        pipeline
            .set_options(a, Options::new().with("count", 3).with("log", "devnull"))
            .unwrap();
        pipeline
            .set_options(b, Options::new().with("count", 4).with("log", "devnull"))
            .unwrap();

        let table = PointTable::new();
        pipeline.prepare(merge, &table).unwrap();
        let views = pipeline.execute(merge, &table).unwrap();

        assert_eq!(views.len(), 1);
        assert_eq!(views.iter().next().unwrap().len(), 7);
    }

    #[test]
    fn test_accumulator_resets_between_executes() {
        let mut pipeline = Pipeline::new();
        let reader = pipeline.add(Box::new(FauxReader::default()));
        let merge = pipeline.add(Box::new(MergeFilter::default()));
        pipeline.set_input(merge, reader).unwrap();
        pipeline
            .set_options(
                reader,
                Options::new().with("count", 2).with("log", "devnull"),
            )
            .unwrap();

        let table = PointTable::new();
        pipeline.prepare(merge, &table).unwrap();
        let first = pipeline.execute(merge, &table).unwrap();
        let second = pipeline.execute(merge, &table).unwrap();

        assert_eq!(first.iter().next().unwrap().len(), 2);
        // A fresh accumulator, not the first run's view grown larger.
        assert_eq!(second.iter().next().unwrap().len(), 2);
    }
}
