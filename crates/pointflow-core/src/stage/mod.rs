//! Stage composition and the two-phase pipeline lifecycle.
//!
//! A stage is one node in the processing DAG: common state ([`StageBase`])
//! plus a driver ([`Driver`]) supplying the type-specific hooks. Stages
//! live in a [`Pipeline`] arena and refer to their upstream inputs through
//! opaque [`StageHandle`]s; the pipeline owns every stage and a stage never
//! owns another stage.
//!
//! ## Lifecycle
//!
//! ```text
//! prepare(terminal)                 execute(terminal)
//!   recurse inputs first              finalize layout (once)
//!   common options (debug/log/srs)    recurse inputs first, union views
//!   driver.process_options            driver.ready (once per stage)
//!   metadata subtree (created once)   one StageRunner per view, in parallel
//!   driver.initialize                 collect in runner-creation order
//!   driver.add_dimensions             driver.done + table SRS propagation
//!   driver.prepared
//! ```
//!
//! `prepare` is strictly serial and depth-first; `execute`'s per-view
//! fan-out is the only concurrency in the engine.

mod pipeline;
mod runner;

#[cfg(test)]
mod tests;

pub use pipeline::{Pipeline, StageHandle};
pub use runner::StageRunner;

use smallvec::SmallVec;

use crate::error::PipelineError;
use crate::layout::PointLayout;
use crate::metadata::MetadataNode;
use crate::options::Options;
use crate::srs::SpatialReference;
use crate::stagelog::{LogLevel, LogStream, StageLog};
use crate::table::PointTable;
use crate::view::{PointViewRef, PointViewSet};

/// Capability class of a stage driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Produces points from an external source into fresh views.
    Reader,
    /// Transforms or routes upstream views.
    Filter,
    /// Persists points from upstream views.
    Writer,
}

/// Engine state handed to driver hooks.
///
/// The table is the run's shared [`PointTable`]; `metadata` is this stage's
/// own subtree and `log` its stage log. Both are cheap handles a driver may
/// keep (for example to log from per-view work).
pub struct StageContext<'a> {
    /// The shared table for this run.
    pub table: &'a PointTable,
    /// This stage's metadata subtree.
    pub metadata: MetadataNode,
    /// This stage's log.
    pub log: StageLog,
}

/// Type-specific behavior of a stage.
///
/// The engine calls these hooks at the fixed lifecycle points documented on
/// [`Pipeline::prepare`] and [`Pipeline::execute`] and otherwise treats the
/// implementation as opaque. All hooks except [`run`](Self::run) execute on
/// the preparing/executing thread; `run` is called concurrently, once per
/// view, from worker threads.
pub trait Driver: Send + Sync {
    /// The driver-type name (e.g. `readers.las`). Also used as the stage's
    /// metadata node name and log leader.
    fn name(&self) -> &str;

    /// The capability class of this driver.
    fn kind(&self) -> StageKind;

    /// Validates and captures driver-specific options.
    ///
    /// # Errors
    ///
    /// Any malformed or required-but-missing option aborts the whole
    /// prepare chain.
    fn process_options(&mut self, options: &Options) -> Result<(), PipelineError> {
        let _ = options;
        Ok(())
    }

    /// One-time setup after option processing (connections, handles).
    ///
    /// # Errors
    ///
    /// Failures abort the prepare chain.
    fn initialize(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let _ = ctx;
        Ok(())
    }

    /// Contributes this driver's dimensions to the shared layout.
    ///
    /// # Errors
    ///
    /// Propagates layout registration failures.
    fn add_dimensions(&mut self, layout: &mut PointLayout) -> Result<(), PipelineError> {
        let _ = layout;
        Ok(())
    }

    /// Called once when this stage's preparation has completed.
    ///
    /// # Errors
    ///
    /// Failures abort the prepare chain.
    fn prepared(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let _ = ctx;
        Ok(())
    }

    /// Called once per execute, before any per-view work (e.g. opening
    /// sinks).
    ///
    /// # Errors
    ///
    /// Failures fail the stage's execute.
    fn ready(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let _ = ctx;
        Ok(())
    }

    /// Processes one view, returning the view set this stage contributes
    /// downstream.
    ///
    /// Called concurrently for independent views; implementations needing
    /// cross-view state must synchronize it themselves. The default passes
    /// the input view through unchanged.
    ///
    /// # Errors
    ///
    /// A failure here is fatal to the enclosing execute call.
    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        Ok(PointViewSet::from_view(view))
    }

    /// Called once after every runner of this stage has completed.
    ///
    /// # Errors
    ///
    /// Failures fail the stage's execute.
    fn done(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let _ = ctx;
        Ok(())
    }
}

/// Common state carried by every stage.
#[derive(Debug, Default)]
pub struct StageBase {
    options: Options,
    inputs: SmallVec<[StageHandle; 4]>,
    srs: SpatialReference,
    log: Option<StageLog>,
    metadata: Option<MetadataNode>,
    debug: bool,
    verbose: u32,
}

impl StageBase {
    /// Returns the stage's options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Replaces the stage's options.
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    /// Merges options in without overwriting any name already present.
    pub fn add_conditional_options(&mut self, options: &Options) {
        self.options.merge_conditional(options);
    }

    /// Returns the upstream stage handles, in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[StageHandle] {
        &self.inputs
    }

    pub(crate) fn push_input(&mut self, input: StageHandle) {
        self.inputs.push(input);
    }

    /// Returns this stage's spatial reference (possibly empty).
    #[must_use]
    pub fn spatial_reference(&self) -> &SpatialReference {
        &self.srs
    }

    /// Sets this stage's spatial reference.
    ///
    /// The in-memory reference is always updated; the metadata subtree (if
    /// already created) receives `spatialreference` / `comp_spatialreference`
    /// nodes only if none exist yet.
    pub fn set_spatial_reference(&mut self, srs: SpatialReference) {
        self.srs = srs;
        if let Some(metadata) = &self.metadata {
            write_srs_metadata(metadata, &self.srs);
        }
    }

    /// Returns this stage's log, once prepare has created it.
    #[must_use]
    pub fn log(&self) -> Option<&StageLog> {
        self.log.as_ref()
    }

    /// Returns this stage's metadata subtree, once prepare has created it.
    #[must_use]
    pub fn metadata(&self) -> Option<MetadataNode> {
        self.metadata.clone()
    }

    /// Returns whether the `debug` option was set.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the effective verbosity.
    #[must_use]
    pub fn verbosity(&self) -> u32 {
        self.verbose
    }

    /// Processes the cross-cutting options shared by every stage: `debug`,
    /// `verbose`, `log`, and `spatialreference`.
    ///
    /// A stage with no inputs creates its own log sink from the named
    /// target (default `stdlog`); a stage with inputs either creates a sink
    /// from an explicitly supplied target or inherits `inherited` (its
    /// first input's stream) while keeping its own name as leader.
    pub(crate) fn process_common_options(
        &mut self,
        name: &str,
        inherited: Option<LogStream>,
    ) -> Result<StageLog, PipelineError> {
        self.debug = self.options.get_or("debug", false)?;
        self.verbose = self.options.get_or("verbose", 0u32)?;
        if self.debug && self.verbose == 0 {
            self.verbose = 1;
        }

        let mut log = if self.inputs.is_empty() {
            let target = self.options.get_or("log", String::from("stdlog"))?;
            StageLog::new(name, &target)?
        } else if self.options.has("log") {
            let target: String = self.options.get("log")?;
            StageLog::new(name, &target)?
        } else {
            match inherited {
                Some(stream) => StageLog::with_stream(name, stream),
                None => StageLog::new(name, "stdlog")?,
            }
        };
        log.set_level(LogLevel::from_verbosity(self.verbose));
        self.log = Some(log.clone());

        // An explicitly supplied reference is adopted immediately; absent
        // that, resolution stays deferred for a later setter.
        if let Some(raw) = self.options.get_raw("spatialreference") {
            self.srs = SpatialReference::new(raw);
        }
        Ok(log)
    }

    pub(crate) fn ensure_metadata(&mut self, table: &PointTable, name: &str) -> MetadataNode {
        match &self.metadata {
            Some(node) => node.clone(),
            None => {
                let node = table.metadata().add(name);
                if !self.srs.is_empty() {
                    write_srs_metadata(&node, &self.srs);
                }
                self.metadata = Some(node.clone());
                node
            }
        }
    }
}

/// Writes the spatial-reference nodes under a stage's metadata subtree,
/// unless a `spatialreference` node already exists there.
fn write_srs_metadata(metadata: &MetadataNode, srs: &SpatialReference) {
    if metadata
        .find_child(|c| c.name() == "spatialreference")
        .is_none()
    {
        metadata.add_value("spatialreference", srs.wkt(), "SRS of this stage");
        metadata.add_value("comp_spatialreference", srs.compound_wkt(), "SRS of this stage");
    }
}
