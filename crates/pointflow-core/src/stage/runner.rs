//! Per-view execution units.

use parking_lot::Mutex;

use crate::error::PipelineError;
use crate::view::{PointViewRef, PointViewSet};

use super::Driver;

/// One schedulable unit of work: a stage applied to one input view.
///
/// The engine creates one runner per view during a stage's execute fan-out
/// and dispatches [`run`](Self::run) onto the worker pool; runners execute
/// concurrently with respect to each other. [`wait`](Self::wait) consumes
/// the runner once the fan-out has joined, so a runner can never be reused.
pub struct StageRunner<'a> {
    stage: &'a dyn Driver,
    view: PointViewRef,
    result: Mutex<Option<Result<PointViewSet, PipelineError>>>,
}

impl<'a> StageRunner<'a> {
    /// Binds a stage to one input view.
    #[must_use]
    pub fn new(stage: &'a dyn Driver, view: PointViewRef) -> Self {
        Self {
            stage,
            view,
            result: Mutex::new(None),
        }
    }

    /// Executes the unit, storing its result for [`wait`](Self::wait).
    ///
    /// Called from a worker thread; the stage's `run` hook does the actual
    /// per-view work.
    pub fn run(&self) {
        let result = self.stage.run(self.view.clone());
        *self.result.lock() = Some(result);
    }

    /// Returns the unit's result, or propagates its failure.
    ///
    /// Must only be called after the fan-out has joined; consuming the
    /// runner enforces single use.
    ///
    /// # Errors
    ///
    /// Propagates the failure raised inside the unit, or reports a unit
    /// that was never executed.
    pub fn wait(self) -> Result<PointViewSet, PipelineError> {
        match self.result.into_inner() {
            Some(result) => result,
            None => Err(PipelineError::execution(
                self.stage.name(),
                "stage runner completed without a result",
            )),
        }
    }
}

impl std::fmt::Debug for StageRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("stage", &self.stage.name())
            .field("view", &self.view.id())
            .finish_non_exhaustive()
    }
}
