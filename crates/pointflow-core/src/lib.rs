//! # Pointflow Core
//!
//! The pipeline execution engine for `pointflow`: readers ingest points,
//! filters transform or route them, and writers persist them. This crate
//! owns the pieces every driver shares:
//!
//! - **Options**: ordered, case-normalized configuration attached to a stage
//! - **`PointTable` / `PointView`**: shared row storage and the reorderable
//!   index sets that flow between stages
//! - **Stage lifecycle**: the two-phase prepare/execute contract over an
//!   arbitrary DAG of stages
//! - **`StageRunner`**: one schedulable (stage, view) unit, fanned out onto
//!   a process-wide worker pool
//!
//! ## Design principles
//!
//! 1. **Prepare is serial, execute fans out** — configuration mutates shared
//!    per-stage state and runs depth-first on one thread; only per-view work
//!    is parallel.
//! 2. **Stages never own stages** — the [`Pipeline`] arena owns every stage
//!    and inputs are opaque [`StageHandle`]s, so rearranging a graph can
//!    never dangle.
//! 3. **One table per run** — layout and metadata are shared by reference
//!    and the dimension set freezes before the first point is produced.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pointflow_core::{Options, Pipeline, PointTable};
//!
//! let mut pipeline = Pipeline::new();
//! let reader = pipeline.add(Box::new(MyReader::default()));
//! let writer = pipeline.add(Box::new(MyWriter::default()));
//! pipeline.set_input(writer, reader)?;
//!
//! let table = PointTable::new();
//! pipeline.prepare(writer, &table)?;
//! let views = pipeline.execute(writer, &table)?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod exec;
pub mod layout;
pub mod metadata;
pub mod options;
pub mod srs;
pub mod stage;
pub mod stagelog;
pub mod table;
pub mod view;

pub use error::PipelineError;
pub use exec::ExecPool;
pub use layout::{DimId, DimType, PointLayout};
pub use metadata::MetadataNode;
pub use options::Options;
pub use srs::SpatialReference;
pub use stage::{Driver, Pipeline, StageBase, StageContext, StageHandle, StageKind, StageRunner};
pub use stagelog::{LogLevel, StageLog};
pub use table::{PointId, PointTable};
pub use view::{PointView, PointViewRef, PointViewSet};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
