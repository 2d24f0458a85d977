//! Unit tests for the stage lifecycle: prepare/execute ordering, view
//! fan-out, spatial-reference propagation, and failure handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::error::PipelineError;
use crate::layout::{DimType, PointLayout};
use crate::options::Options;
use crate::srs::SpatialReference;
use crate::table::PointTable;
use crate::view::{PointViewRef, PointViewSet};

type EventLog = Arc<Mutex<Vec<String>>>;

fn record(events: &EventLog, what: impl Into<String>) {
    events.lock().push(what.into());
}

/// Reader producing `count` points with a ramping X value.
struct RampReader {
    label: &'static str,
    count: u64,
    events: EventLog,
}

impl RampReader {
    fn new(label: &'static str, events: EventLog) -> Self {
        Self {
            label,
            count: 0,
            events,
        }
    }
}

impl Driver for RampReader {
    fn name(&self) -> &str {
        self.label
    }

    fn kind(&self) -> StageKind {
        StageKind::Reader
    }

    fn process_options(&mut self, options: &Options) -> Result<(), PipelineError> {
        record(&self.events, format!("{}:process_options", self.label));
        self.count = options.get_or("count", 4u64)?;
        Ok(())
    }

    fn initialize(&mut self, _ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        record(&self.events, format!("{}:initialize", self.label));
        Ok(())
    }

    fn add_dimensions(&mut self, layout: &mut PointLayout) -> Result<(), PipelineError> {
        layout.register_dim("X", DimType::F64)?;
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        record(&self.events, format!("{}:run", self.label));
        let x = view.table().layout().require_dim("X")?;
        for i in 0..self.count {
            let pos = view.add_point()?;
            #[allow(clippy::cast_precision_loss)]
            view.set_field(x, pos, i as f64)?;
        }
        Ok(PointViewSet::from_view(view))
    }
}

/// Filter copying its input into `pieces` derived views.
struct SplitFilter {
    pieces: usize,
}

impl Driver for SplitFilter {
    fn name(&self) -> &str {
        "filters.split"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        let mut out = PointViewSet::new();
        for piece in 0..self.pieces {
            let derived = view.make_new();
            for pos in (piece..view.len()).step_by(self.pieces) {
                if let Some(id) = view.point_id(pos) {
                    derived.append_id(id);
                }
            }
            out.insert(derived);
        }
        Ok(out)
    }
}

/// Stateless filter adding a constant to X, in a fresh derived view.
struct ShiftFilter {
    label: &'static str,
    events: EventLog,
}

impl Driver for ShiftFilter {
    fn name(&self) -> &str {
        self.label
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn process_options(&mut self, _options: &Options) -> Result<(), PipelineError> {
        record(&self.events, format!("{}:process_options", self.label));
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        record(&self.events, format!("{}:run", self.label));
        let x = view.table().layout().require_dim("X")?;
        let derived = view.make_new();
        for pos in 0..view.len() {
            let id = view.point_id(pos).ok_or(PipelineError::PointOutOfRange {
                index: pos,
                len: view.len(),
            })?;
            derived.append_id(id);
            let value = view.field(x, pos)?;
            derived.set_field(x, pos, value + 100.0)?;
        }
        Ok(PointViewSet::from_view(derived))
    }
}

/// Filter failing on every view.
struct FailFilter;

impl Driver for FailFilter {
    fn name(&self) -> &str {
        "filters.fail"
    }

    fn kind(&self) -> StageKind {
        StageKind::Filter
    }

    fn run(&self, _view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        Err(PipelineError::execution("filters.fail", "induced failure"))
    }
}

/// Writer recording whether its hooks ran and what it saw.
#[derive(Default)]
struct ProbeWriter {
    ready_calls: Arc<AtomicUsize>,
    done_calls: Arc<AtomicUsize>,
    views_seen: Arc<AtomicUsize>,
}

impl Driver for ProbeWriter {
    fn name(&self) -> &str {
        "writers.probe"
    }

    fn kind(&self) -> StageKind {
        StageKind::Writer
    }

    fn ready(&mut self, _ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        self.views_seen.fetch_add(1, Ordering::SeqCst);
        Ok(PointViewSet::from_view(view))
    }

    fn done(&mut self, _ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        self.done_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn events() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

// ---- prepare ----

#[test]
fn test_prepare_runs_upstream_first() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let filter = pipeline.add(Box::new(ShiftFilter {
        label: "filters.shift",
        events: log.clone(),
    }));
    pipeline.set_input(filter, reader).unwrap();

    let table = PointTable::new();
    pipeline.prepare(filter, &table).unwrap();

    let seen = log.lock().clone();
    assert_eq!(
        seen,
        vec![
            "readers.a:process_options",
            "readers.a:initialize",
            "filters.shift:process_options",
        ]
    );
}

#[test]
fn test_prepare_visits_each_stage_once_in_diamond() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let left = pipeline.add(Box::new(ShiftFilter {
        label: "filters.left",
        events: log.clone(),
    }));
    let right = pipeline.add(Box::new(ShiftFilter {
        label: "filters.right",
        events: log.clone(),
    }));
    let writer = pipeline.add(Box::new(ProbeWriter::default()));
    pipeline.set_input(left, reader).unwrap();
    pipeline.set_input(right, reader).unwrap();
    pipeline.set_input(writer, left).unwrap();
    pipeline.set_input(writer, right).unwrap();

    let table = PointTable::new();
    pipeline.prepare(writer, &table).unwrap();

    let seen = log.lock().clone();
    let reader_preps = seen
        .iter()
        .filter(|e| *e == "readers.a:process_options")
        .count();
    assert_eq!(reader_preps, 1);
    // Upstream before downstream.
    let pos = |needle: &str| seen.iter().position(|e| e == needle).unwrap();
    assert!(pos("readers.a:process_options") < pos("filters.left:process_options"));
    assert!(pos("readers.a:process_options") < pos("filters.right:process_options"));
}

#[test]
fn test_prepare_failure_surfaces_offending_option() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));
    pipeline
        .set_options(reader, Options::new().with("count", "many"))
        .unwrap();

    let table = PointTable::new();
    let err = pipeline.prepare(reader, &table).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidOption { name, .. } if name == "count"));
}

#[test]
fn test_metadata_subtree_created_once() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();
    pipeline.prepare(reader, &table).unwrap();

    let subtrees = table
        .metadata()
        .children()
        .iter()
        .filter(|c| c.name() == "readers.a")
        .count();
    assert_eq!(subtrees, 1);
}

#[test]
fn test_debug_forces_verbosity() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));
    pipeline
        .set_options(
            reader,
            Options::new().with("debug", true).with("log", "devnull"),
        )
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();
    assert_eq!(pipeline.base(reader).unwrap().verbosity(), 1);
}

#[test]
fn test_log_stream_inherited_from_first_input() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let filter = pipeline.add(Box::new(ShiftFilter {
        label: "filters.shift",
        events: log,
    }));
    pipeline.set_input(filter, reader).unwrap();
    pipeline
        .set_options(reader, Options::new().with("log", "devnull"))
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(filter, &table).unwrap();

    let reader_stream = pipeline.base(reader).unwrap().log().unwrap().stream();
    let filter_log = pipeline.base(filter).unwrap().log().unwrap();
    assert!(filter_log.stream().same_sink(&reader_stream));
    assert_eq!(filter_log.leader(), "filters.shift");
}

// ---- execute ----

#[test]
fn test_execute_before_prepare_is_an_error() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));

    let table = PointTable::new();
    let err = pipeline.execute(reader, &table).unwrap_err();
    assert!(matches!(err, PipelineError::NotPrepared(name) if name == "readers.a"));
}

#[test]
fn test_reader_gets_one_fresh_view() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));
    pipeline
        .set_options(reader, Options::new().with("count", 3))
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();
    let views = pipeline.execute(reader, &table).unwrap();

    assert_eq!(views.len(), 1);
    let view = views.iter().next().unwrap();
    assert_eq!(view.len(), 3);
    assert!(table.layout().is_finalized());
}

#[test]
fn test_layout_rejects_dims_after_execute() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();
    pipeline.execute(reader, &table).unwrap();

    let err = table
        .layout_mut()
        .register_dim("Late", DimType::F64)
        .unwrap_err();
    assert!(matches!(err, PipelineError::LayoutFinalized(_)));
}

#[test]
fn test_split_then_parallel_filter_preserves_content() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let split = pipeline.add(Box::new(SplitFilter { pieces: 4 }));
    let shift = pipeline.add(Box::new(ShiftFilter {
        label: "filters.shift",
        events: log,
    }));
    pipeline.set_input(split, reader).unwrap();
    pipeline.set_input(shift, split).unwrap();
    pipeline
        .set_options(reader, Options::new().with("count", 16))
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(shift, &table).unwrap();
    let views = pipeline.execute(shift, &table).unwrap();

    // 4 independent views, processed concurrently, each shifted by 100.
    assert_eq!(views.len(), 4);
    let x = table.layout().require_dim("X").unwrap();
    let mut all: Vec<f64> = Vec::new();
    for view in &views {
        assert_eq!(view.len(), 4);
        for pos in 0..view.len() {
            all.push(view.field(x, pos).unwrap());
        }
    }
    all.sort_by(f64::total_cmp);
    let expected: Vec<f64> = (0..16).map(|i| f64::from(i) + 100.0).collect();
    assert_eq!(all, expected);
}

#[test]
fn test_diamond_executes_shared_stage_once() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let left = pipeline.add(Box::new(ShiftFilter {
        label: "filters.left",
        events: log.clone(),
    }));
    let right = pipeline.add(Box::new(ShiftFilter {
        label: "filters.right",
        events: log.clone(),
    }));
    let writer_probe = ProbeWriter::default();
    let views_seen = writer_probe.views_seen.clone();
    let writer = pipeline.add(Box::new(writer_probe));
    pipeline.set_input(left, reader).unwrap();
    pipeline.set_input(right, reader).unwrap();
    pipeline.set_input(writer, left).unwrap();
    pipeline.set_input(writer, right).unwrap();

    let table = PointTable::new();
    pipeline.prepare(writer, &table).unwrap();
    let views = pipeline.execute(writer, &table).unwrap();

    let reader_runs = log.lock().iter().filter(|e| *e == "readers.a:run").count();
    assert_eq!(reader_runs, 1);
    // Each branch derived its own view from the shared upstream view.
    assert_eq!(views.len(), 2);
    assert_eq!(views_seen.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failing_runner_fails_execute_and_skips_writer() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));
    let fail = pipeline.add(Box::new(FailFilter));
    let writer_probe = ProbeWriter::default();
    let ready_calls = writer_probe.ready_calls.clone();
    let writer = pipeline.add(Box::new(writer_probe));
    pipeline.set_input(fail, reader).unwrap();
    pipeline.set_input(writer, fail).unwrap();

    let table = PointTable::new();
    pipeline.prepare(writer, &table).unwrap();
    let err = pipeline.execute(writer, &table).unwrap_err();

    assert!(matches!(err, PipelineError::Execution { stage, .. } if stage == "filters.fail"));
    // The writer never became ready, so no output was produced.
    assert_eq!(ready_calls.load(Ordering::SeqCst), 0);
}

// ---- spatial reference ----

#[test]
fn test_stage_without_srs_stays_empty() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();
    pipeline.execute(reader, &table).unwrap();

    assert!(pipeline.base(reader).unwrap().spatial_reference().is_empty());
    assert!(table.spatial_reference().is_empty());
}

#[test]
fn test_srs_is_not_inherited_field_level() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let filter = pipeline.add(Box::new(ShiftFilter {
        label: "filters.shift",
        events: log,
    }));
    pipeline.set_input(filter, reader).unwrap();
    pipeline
        .set_options(
            reader,
            Options::new().with("spatialreference", "EPSG:26910"),
        )
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(filter, &table).unwrap();
    pipeline.execute(filter, &table).unwrap();

    // The filter's own reference stays empty; propagation is table-level.
    assert!(pipeline.base(filter).unwrap().spatial_reference().is_empty());
    assert_eq!(table.spatial_reference().wkt(), "EPSG:26910");
}

#[test]
fn test_table_srs_is_last_completer() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let first = pipeline.add(Box::new(RampReader::new("readers.a", log.clone())));
    let second = pipeline.add(Box::new(RampReader::new("readers.b", log.clone())));
    let merge = pipeline.add(Box::new(ShiftFilter {
        label: "filters.shift",
        events: log,
    }));
    pipeline.set_input(merge, first).unwrap();
    pipeline.set_input(merge, second).unwrap();
    pipeline
        .set_options(first, Options::new().with("spatialreference", "EPSG:4326"))
        .unwrap();
    pipeline
        .set_options(second, Options::new().with("spatialreference", "EPSG:26910"))
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(merge, &table).unwrap();
    pipeline.execute(merge, &table).unwrap();

    // Inputs complete in declaration order; the later sibling wins.
    assert_eq!(table.spatial_reference().wkt(), "EPSG:26910");
}

#[test]
fn test_srs_metadata_written_once() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));
    pipeline
        .set_options(reader, Options::new().with("spatialreference", "EPSG:4326"))
        .unwrap();

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();

    // A second programmatic set updates the field but not the metadata.
    pipeline
        .set_spatial_reference(reader, SpatialReference::new("EPSG:26910"))
        .unwrap();

    let metadata = pipeline.base(reader).unwrap().metadata().unwrap();
    let srs_nodes = metadata
        .children()
        .iter()
        .filter(|c| c.name() == "spatialreference")
        .count();
    assert_eq!(srs_nodes, 1);
    assert_eq!(
        metadata.child("spatialreference").unwrap().value(),
        "EPSG:4326"
    );
    assert_eq!(
        pipeline.base(reader).unwrap().spatial_reference().wkt(),
        "EPSG:26910"
    );
}

// ---- options plumbing ----

#[test]
fn test_add_conditional_options_does_not_override() {
    let log = events();
    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(Box::new(RampReader::new("readers.a", log)));
    pipeline
        .set_options(reader, Options::new().with("count", 2))
        .unwrap();
    pipeline
        .base_mut(reader)
        .unwrap()
        .add_conditional_options(&Options::new().with("count", 99).with("verbose", 0));

    let table = PointTable::new();
    pipeline.prepare(reader, &table).unwrap();
    let views = pipeline.execute(reader, &table).unwrap();
    assert_eq!(views.iter().next().unwrap().len(), 2);
}
