//! Every-Nth-point decimation filter.

use pointflow_core::{
    Driver, Options, PipelineError, PointViewRef, PointViewSet, StageKind,
};

/// `filters.decimation`: keeps every `step`-th point of each input view.
///
/// Options: `step` (default 1), `offset` (first position considered,
/// default 0), `limit` (maximum points kept per view, 0 = unlimited).
/// Stateless per view, so independent views decimate concurrently.
#[derive(Debug)]
pub struct DecimationFilter {
    step: usize,
    offset: usize,
    limit: usize,
}

impl Default for DecimationFilter {
    fn default() -> Self {
        Self {
            step: 1,
            offset: 0,
            limit: 0,
        }
    }
}

impl Driver for DecimationFilter {
    fn name(&self) -> &str {
        "filters.decimation"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn process_options(&mut self, options: &Options) -> Result<(), PipelineError> {
        self.step = options.get_or("step", 1)?;
        if self.step == 0 {
            return Err(PipelineError::InvalidOption {
                name: "step".to_string(),
                reason: "step must be at least 1".to_string(),
            });
        }
        self.offset = options.get_or("offset", 0)?;
        self.limit = options.get_or("limit", 0)?;
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        let decimated = view.make_new();
        let mut kept = 0usize;
        for pos in (self.offset..view.len()).step_by(self.step) {
            if self.limit > 0 && kept >= self.limit {
                break;
            }
            if let Some(id) = view.point_id(pos) {
                decimated.append_id(id);
                kept += 1;
            }
        }
        Ok(PointViewSet::from_view(decimated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::FauxReader;
    use pointflow_core::{Pipeline, PointTable};

    fn run_decimation(count: u64, opts: Options) -> usize {
        let mut pipeline = Pipeline::new();
        let reader = pipeline.add(Box::new(FauxReader::default()));
        let decimation = pipeline.add(Box::new(DecimationFilter::default()));
        pipeline.set_input(decimation, reader).unwrap();
        pipeline
            .set_options(
                reader,
                Options::new().with("count", count).with("log", "devnull"),
            )
            .unwrap();
        pipeline.set_options(decimation, opts).unwrap();

        let table = PointTable::new();
        pipeline.prepare(decimation, &table).unwrap();
        let views = pipeline.execute(decimation, &table).unwrap();
        let len = views.iter().next().unwrap().len();
        len
    }

    #[test]
    fn test_step_keeps_every_nth() {
        assert_eq!(run_decimation(10, Options::new().with("step", 3)), 4);
    }

    #[test]
    fn test_offset_skips_leading_points() {
        assert_eq!(
            run_decimation(10, Options::new().with("step", 3).with("offset", 1)),
            3
        );
    }

    #[test]
    fn test_limit_caps_output() {
        assert_eq!(
            run_decimation(10, Options::new().with("step", 1).with("limit", 4)),
            4
        );
    }

    #[test]
    fn test_zero_step_is_rejected() {
        let mut pipeline = Pipeline::new();
        let reader = pipeline.add(Box::new(FauxReader::default()));
        let decimation = pipeline.add(Box::new(DecimationFilter::default()));
        pipeline.set_input(decimation, reader).unwrap();
        pipeline
            .set_options(
                reader,
                Options::new().with("count", 1).with("log", "devnull"),
            )
            .unwrap();
        pipeline
            .set_options(decimation, Options::new().with("step", 0))
            .unwrap();

        let table = PointTable::new();
        let err = pipeline.prepare(decimation, &table).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOption { name, .. } if name == "step"));
    }
}
