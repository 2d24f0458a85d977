//! Synthetic point reader.

use pointflow_core::{
    DimType, Driver, Options, PipelineError, PointLayout, PointViewRef, PointViewSet, StageKind,
};

/// Point generation mode of the faux reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    /// Linear interpolation from the minimum to the maximum bound.
    #[default]
    Ramp,
    /// Every point sits at the minimum bound.
    Constant,
}

/// `readers.faux`: generates synthetic points without touching the
/// filesystem.
///
/// Options: `count` (required), `mode` (`ramp` or `constant`, default
/// `ramp`), and the bounds `minx`/`miny`/`minz`/`maxx`/`maxy`/`maxz`
/// (default unit cube). Used by tests, benchmarks, and pipeline smoke
/// checks in place of a format reader.
#[derive(Debug, Default)]
pub struct FauxReader {
    count: u64,
    mode: Mode,
    min: [f64; 3],
    max: [f64; 3],
}

impl Driver for FauxReader {
    fn name(&self) -> &str {
        "readers.faux"
    }

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn process_options(&mut self, options: &Options) -> Result<(), PipelineError> {
        self.count = options.get("count")?;
        self.mode = match options.get_or("mode", String::from("ramp"))?.as_str() {
            "ramp" => Mode::Ramp,
            "constant" => Mode::Constant,
            other => {
                return Err(PipelineError::InvalidOption {
                    name: "mode".to_string(),
                    reason: format!("expected 'ramp' or 'constant', got '{other}'"),
                })
            }
        };
        self.min = [
            options.get_or("minx", 0.0)?,
            options.get_or("miny", 0.0)?,
            options.get_or("minz", 0.0)?,
        ];
        self.max = [
            options.get_or("maxx", 1.0)?,
            options.get_or("maxy", 1.0)?,
            options.get_or("maxz", 1.0)?,
        ];
        Ok(())
    }

    fn add_dimensions(&mut self, layout: &mut PointLayout) -> Result<(), PipelineError> {
        layout.register_dim("X", DimType::F64)?;
        layout.register_dim("Y", DimType::F64)?;
        layout.register_dim("Z", DimType::F64)?;
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        let (x, y, z) = {
            let layout = view.table().layout();
            (
                layout.require_dim("X")?,
                layout.require_dim("Y")?,
                layout.require_dim("Z")?,
            )
        };

        for i in 0..self.count {
            let t = match self.mode {
                Mode::Constant => 0.0,
                #[allow(clippy::cast_precision_loss)]
                Mode::Ramp => {
                    if self.count > 1 {
                        i as f64 / (self.count - 1) as f64
                    } else {
                        0.0
                    }
                }
            };
            let pos = view.add_point()?;
            view.set_field(x, pos, self.min[0] + t * (self.max[0] - self.min[0]))?;
            view.set_field(y, pos, self.min[1] + t * (self.max[1] - self.min[1]))?;
            view.set_field(z, pos, self.min[2] + t * (self.max[2] - self.min[2]))?;
        }
        Ok(PointViewSet::from_view(view))
    }
}
