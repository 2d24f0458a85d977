//! # Pointflow
//!
//! A composable data-processing pipeline engine for large point-cloud
//! datasets: readers ingest points, filters transform or route them,
//! writers persist them, and a factory discovers driver implementations,
//! built-in or dynamically loaded at runtime.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use pointflow::{Options, Pipeline, PointTable, StageFactory};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = StageFactory::new();
//!
//! let mut pipeline = Pipeline::new();
//! let reader = pipeline.add(factory.create_reader("readers.faux")?);
//! let writer = pipeline.add(factory.create_writer(&factory.infer_writer_driver("out.csv"))?);
//! pipeline.set_input(writer, reader)?;
//!
//! pipeline.set_options(reader, Options::new().with("count", 1000))?;
//! pipeline.set_options(writer, factory.infer_writer_options("out.csv"))?;
//!
//! let table = PointTable::new();
//! pipeline.prepare(writer, &table)?;
//! let views = pipeline.execute(writer, &table)?;
//! println!("wrote {} view(s)", views.len());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export the engine.
pub use pointflow_core::{
    DimId, DimType, Driver, ExecPool, LogLevel, MetadataNode, Options, Pipeline, PipelineError,
    PointId, PointLayout, PointTable, PointView, PointViewRef, PointViewSet, SpatialReference,
    StageBase, StageContext, StageHandle, StageKind, StageLog, StageRunner,
};

// Re-export the factory and driver surface.
pub use pointflow_drivers::{
    filters, plugin, readers, writers, DriverError, DriverFactory, StageFactory,
};
