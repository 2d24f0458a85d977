//! The stage arena and the prepare/execute traversal.

use std::fmt;

use fxhash::{FxHashMap, FxHashSet};

use crate::error::PipelineError;
use crate::exec::ExecPool;
use crate::options::Options;
use crate::srs::SpatialReference;
use crate::table::PointTable;
use crate::view::{PointView, PointViewSet};

use super::runner::StageRunner;
use super::{Driver, StageBase, StageContext};

/// Opaque handle to a stage within one [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StageHandle(u32);

impl StageHandle {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StageHandle({})", self.0)
    }
}

struct StageNode {
    driver: Box<dyn Driver>,
    base: StageBase,
}

/// Arena of stages forming one processing DAG.
///
/// The pipeline owns every stage; callers compose the graph with
/// [`add`](Self::add) and [`set_input`](Self::set_input), configure stages
/// through the [`StageBase`] accessors, then call
/// [`prepare`](Self::prepare) followed by [`execute`](Self::execute) on the
/// terminal stage.
///
/// The input graph must be acyclic; the traversals assume it and a cyclic
/// graph produces unspecified (though terminating) visit order.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<StageNode>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handles of the stages whose driver-type name matches,
    /// searching the whole arena.
    #[must_use]
    pub fn find_stage(&self, name: &str) -> Vec<StageHandle> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, node)| node.driver.name().eq_ignore_ascii_case(name))
            .map(|(i, _)| {
                // Arena size is bounded by pipeline construction.
                #[allow(clippy::cast_possible_truncation)]
                StageHandle(i as u32)
            })
            .collect()
    }

    /// Adds a stage and returns its handle.
    pub fn add(&mut self, driver: Box<dyn Driver>) -> StageHandle {
        // Arena size is bounded by pipeline construction; u32 handles
        // follow the teacher's node-id convention.
        #[allow(clippy::cast_possible_truncation)]
        let handle = StageHandle(self.stages.len() as u32);
        self.stages.push(StageNode {
            driver,
            base: StageBase::default(),
        });
        handle
    }

    /// Declares `input` as the next upstream input of `stage`.
    ///
    /// Inputs execute in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] when either handle is not
    /// part of this pipeline.
    pub fn set_input(&mut self, stage: StageHandle, input: StageHandle) -> Result<(), PipelineError> {
        self.check(stage)?;
        self.check(input)?;
        self.stages[stage.index()].base.push_input(input);
        Ok(())
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns whether the pipeline holds no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns a stage's common state.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] for a foreign handle.
    pub fn base(&self, stage: StageHandle) -> Result<&StageBase, PipelineError> {
        self.check(stage)?;
        Ok(&self.stages[stage.index()].base)
    }

    /// Returns a stage's common state mutably.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] for a foreign handle.
    pub fn base_mut(&mut self, stage: StageHandle) -> Result<&mut StageBase, PipelineError> {
        self.check(stage)?;
        Ok(&mut self.stages[stage.index()].base)
    }

    /// Returns a stage's driver.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] for a foreign handle.
    pub fn driver(&self, stage: StageHandle) -> Result<&dyn Driver, PipelineError> {
        self.check(stage)?;
        Ok(self.stages[stage.index()].driver.as_ref())
    }

    /// Replaces a stage's options.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] for a foreign handle.
    pub fn set_options(&mut self, stage: StageHandle, options: Options) -> Result<(), PipelineError> {
        self.base_mut(stage)?.set_options(options);
        Ok(())
    }

    /// Sets a stage's spatial reference programmatically.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStage`] for a foreign handle.
    pub fn set_spatial_reference(
        &mut self,
        stage: StageHandle,
        srs: SpatialReference,
    ) -> Result<(), PipelineError> {
        self.base_mut(stage)?.set_spatial_reference(srs);
        Ok(())
    }

    /// Prepares the DAG rooted at `terminal` against the shared table.
    ///
    /// Recurses into every upstream input first (depth-first, serial), so
    /// dependencies are configured before dependents; each stage is
    /// prepared exactly once even when it feeds several downstream stages.
    /// Per stage: cross-cutting options, driver option processing, metadata
    /// subtree creation (first prepare only), driver initialization,
    /// dimension contribution, and the `prepared` hook.
    ///
    /// # Errors
    ///
    /// The first failing stage aborts the whole chain; no rollback is
    /// attempted and `execute` must not be called afterwards.
    pub fn prepare(&mut self, terminal: StageHandle, table: &PointTable) -> Result<(), PipelineError> {
        self.check(terminal)?;
        let mut visited = FxHashSet::default();
        self.prepare_stage(terminal, table, &mut visited)
    }

    fn prepare_stage(
        &mut self,
        handle: StageHandle,
        table: &PointTable,
        visited: &mut FxHashSet<StageHandle>,
    ) -> Result<(), PipelineError> {
        if !visited.insert(handle) {
            return Ok(());
        }

        let inputs = self.stages[handle.index()].base.inputs().to_vec();
        for &input in &inputs {
            self.check(input)?;
            self.prepare_stage(input, table, visited)?;
        }

        // First input's stream, for log inheritance.
        let inherited = inputs
            .first()
            .and_then(|&i| self.stages[i.index()].base.log().map(super::StageLog::stream));

        let node = &mut self.stages[handle.index()];
        let name = node.driver.name().to_string();
        let log = node.base.process_common_options(&name, inherited)?;
        node.driver.process_options(&node.base.options)?;

        let metadata = node.base.ensure_metadata(table, &name);
        let mut ctx = StageContext {
            table,
            metadata,
            log,
        };
        node.driver.initialize(&mut ctx)?;
        {
            let mut layout = table.layout_mut();
            node.driver.add_dimensions(&mut layout)?;
        }
        node.driver.prepared(&mut ctx)?;
        Ok(())
    }

    /// Executes the DAG rooted at `terminal`, returning the views it
    /// produces.
    ///
    /// The layout is finalized exactly once, here, before any stage runs.
    /// Inputs execute upstream-first in declaration order; a stage feeding
    /// several downstream stages executes once and its views are shared.
    /// Per stage: the `ready` hook, one concurrent [`StageRunner`] per
    /// view, result collection in runner-creation order, then the `done`
    /// hook and table-level spatial-reference propagation (last completing
    /// stage with a non-empty reference wins).
    ///
    /// # Errors
    ///
    /// A failure in any runner or hook fails this call; in-flight sibling
    /// runners still complete but their results are discarded, and
    /// metadata mutations performed so far may be inconsistent.
    pub fn execute(
        &mut self,
        terminal: StageHandle,
        table: &PointTable,
    ) -> Result<PointViewSet, PipelineError> {
        self.check(terminal)?;
        table.layout_mut().finalize();
        let mut memo = FxHashMap::default();
        self.execute_stage(terminal, table, &mut memo)
    }

    fn execute_stage(
        &mut self,
        handle: StageHandle,
        table: &PointTable,
        memo: &mut FxHashMap<StageHandle, PointViewSet>,
    ) -> Result<PointViewSet, PipelineError> {
        if let Some(views) = memo.get(&handle) {
            return Ok(views.clone());
        }

        let inputs = self.stages[handle.index()].base.inputs().to_vec();
        let mut views = PointViewSet::new();
        if inputs.is_empty() {
            views.insert(PointView::new(table));
        } else {
            for &input in &inputs {
                self.check(input)?;
                let produced = self.execute_stage(input, table, memo)?;
                views.extend(produced);
            }
        }

        let name = self.stages[handle.index()].driver.name().to_string();
        let (metadata, log) = {
            let base = &self.stages[handle.index()].base;
            match (base.metadata(), base.log()) {
                (Some(metadata), Some(log)) => (metadata, log.clone()),
                _ => return Err(PipelineError::NotPrepared(name)),
            }
        };
        log.debug(&format!("executing over {} view(s)", views.len()));

        {
            let node = &mut self.stages[handle.index()];
            let mut ctx = StageContext {
                table,
                metadata: metadata.clone(),
                log: log.clone(),
            };
            node.driver.ready(&mut ctx)?;
        }

        let driver: &dyn Driver = self.stages[handle.index()].driver.as_ref();
        let runners: Vec<StageRunner<'_>> = views
            .iter()
            .map(|view| StageRunner::new(driver, view.clone()))
            .collect();
        ExecPool::global().scope(|scope| {
            for runner in &runners {
                scope.spawn(move |_| runner.run());
            }
        });

        let mut outputs = PointViewSet::new();
        for runner in runners {
            outputs.extend(runner.wait()?);
        }

        {
            let node = &mut self.stages[handle.index()];
            let mut ctx = StageContext {
                table,
                metadata,
                log,
            };
            node.driver.done(&mut ctx)?;
            if !node.base.spatial_reference().is_empty() {
                table.set_spatial_reference(node.base.spatial_reference().clone());
            }
        }

        memo.insert(handle, outputs.clone());
        Ok(outputs)
    }

    fn check(&self, handle: StageHandle) -> Result<(), PipelineError> {
        if handle.index() < self.stages.len() {
            Ok(())
        } else {
            Err(PipelineError::UnknownStage(handle.0))
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.driver.name()).collect();
        f.debug_struct("Pipeline").field("stages", &names).finish()
    }
}
