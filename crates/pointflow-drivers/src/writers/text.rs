//! Delimited text writer.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use pointflow_core::{
    DimId, Driver, Options, PipelineError, PointViewRef, PointViewSet, StageContext, StageKind,
};

/// `writers.text`: writes points as delimited text.
///
/// This is the reserved default writer driver. Options: `filename`
/// (required; the literal `STDOUT`, case-insensitive, targets standard
/// output), `delimiter` (default `,`), `precision` (default 3),
/// `write_header` (default true), `order` (comma-separated dimension
/// names; default every layout dimension in registration order).
///
/// The sink opens in `ready` and closes in `done`; concurrent runners
/// serialize on it, so rows from different views interleave at view
/// granularity only.
pub struct TextWriter {
    filename: String,
    delimiter: String,
    precision: usize,
    write_header: bool,
    order: Option<Vec<String>>,
    columns: Vec<(String, DimId)>,
    sink: Mutex<Option<Box<dyn Write + Send>>>,
    written: AtomicU64,
}

impl Default for TextWriter {
    fn default() -> Self {
        Self {
            filename: String::new(),
            delimiter: ",".to_string(),
            precision: 3,
            write_header: true,
            order: None,
            columns: Vec::new(),
            sink: Mutex::new(None),
            written: AtomicU64::new(0),
        }
    }
}

impl TextWriter {
    fn open_sink(&self) -> Result<Box<dyn Write + Send>, PipelineError> {
        if self.filename.eq_ignore_ascii_case("stdout") {
            return Ok(Box::new(io::stdout()));
        }
        let file = File::create(&self.filename).map_err(|e| {
            PipelineError::execution(
                "writers.text",
                format!("cannot create '{}': {e}", self.filename),
            )
        })?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

impl std::fmt::Debug for TextWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextWriter")
            .field("filename", &self.filename)
            .field("precision", &self.precision)
            .field("written", &self.written.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Driver for TextWriter {
    fn name(&self) -> &str {
        "writers.text"
    }

    fn kind(&self) -> StageKind {
        StageKind::Writer
    }

    fn process_options(&mut self, options: &Options) -> Result<(), PipelineError> {
        self.filename = options.get("filename")?;
        self.delimiter = options.get_or("delimiter", ",".to_string())?;
        self.precision = options.get_or("precision", 3)?;
        self.write_header = options.get_or("write_header", true)?;
        self.order = options.get_raw("order").map(|raw| {
            raw.split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        });
        Ok(())
    }

    fn ready(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let layout = ctx.table.layout();
        self.columns = match &self.order {
            Some(names) => {
                let mut columns = Vec::with_capacity(names.len());
                for name in names {
                    columns.push((name.clone(), layout.require_dim(name)?));
                }
                columns
            }
            None => layout
                .dims()
                .iter()
                .map(|d| (d.name.clone(), d.id))
                .collect(),
        };
        drop(layout);

        let mut sink = self.open_sink()?;
        if self.write_header {
            let header: Vec<&str> = self.columns.iter().map(|(name, _)| name.as_str()).collect();
            writeln!(sink, "{}", header.join(&self.delimiter)).map_err(|e| {
                PipelineError::execution("writers.text", format!("write failed: {e}"))
            })?;
        }
        *self.sink.lock() = Some(sink);
        self.written.store(0, Ordering::SeqCst);
        ctx.log.debug(&format!("writing to '{}'", self.filename));
        Ok(())
    }

    fn run(&self, view: PointViewRef) -> Result<PointViewSet, PipelineError> {
        let mut guard = self.sink.lock();
        let sink = guard
            .as_mut()
            .ok_or_else(|| PipelineError::execution("writers.text", "writer is not ready"))?;

        let mut line = String::new();
        for pos in 0..view.len() {
            line.clear();
            for (i, (_, dim)) in self.columns.iter().enumerate() {
                if i > 0 {
                    line.push_str(&self.delimiter);
                }
                let value = view.field(*dim, pos)?;
                line.push_str(&format!("{value:.prec$}", prec = self.precision));
            }
            writeln!(sink, "{line}").map_err(|e| {
                PipelineError::execution("writers.text", format!("write failed: {e}"))
            })?;
        }
        self.written.fetch_add(view.len() as u64, Ordering::SeqCst);
        Ok(PointViewSet::from_view(view))
    }

    fn done(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        if let Some(mut sink) = self.sink.lock().take() {
            sink.flush().map_err(|e| {
                PipelineError::execution("writers.text", format!("flush failed: {e}"))
            })?;
        }
        let written = self.written.load(Ordering::SeqCst);
        match ctx.metadata.child("count") {
            Some(node) => node.set_value(written),
            None => {
                ctx.metadata.add_value("count", written, "points written");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::FauxReader;
    use pointflow_core::{Pipeline, PointTable};

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut pipeline = Pipeline::new();
        let reader = pipeline.add(Box::new(FauxReader::default()));
        let writer = pipeline.add(Box::new(TextWriter::default()));
        pipeline.set_input(writer, reader).unwrap();
        pipeline
            .set_options(
                reader,
                Options::new().with("count", 3).with("log", "devnull"),
            )
            .unwrap();
        pipeline
            .set_options(
                writer,
                Options::new()
                    .with("filename", path.to_str().unwrap())
                    .with("precision", 1),
            )
            .unwrap();

        let table = PointTable::new();
        pipeline.prepare(writer, &table).unwrap();
        pipeline.execute(writer, &table).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "X,Y,Z");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "0.0,0.0,0.0");
        assert_eq!(lines[3], "1.0,1.0,1.0");
    }

    #[test]
    fn test_order_option_selects_and_orders_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");

        let mut pipeline = Pipeline::new();
        let reader = pipeline.add(Box::new(FauxReader::default()));
        let writer = pipeline.add(Box::new(TextWriter::default()));
        pipeline.set_input(writer, reader).unwrap();
        pipeline
            .set_options(
                reader,
                Options::new().with("count", 1).with("log", "devnull"),
            )
            .unwrap();
        pipeline
            .set_options(
                writer,
                Options::new()
                    .with("filename", path.to_str().unwrap())
                    .with("order", "Z,X"),
            )
            .unwrap();

        let table = PointTable::new();
        pipeline.prepare(writer, &table).unwrap();
        pipeline.execute(writer, &table).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("Z,X\n"));
    }

    #[test]
    fn test_records_written_count_in_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut pipeline = Pipeline::new();
        let reader = pipeline.add(Box::new(FauxReader::default()));
        let writer = pipeline.add(Box::new(TextWriter::default()));
        pipeline.set_input(writer, reader).unwrap();
        pipeline
            .set_options(
                reader,
                Options::new().with("count", 5).with("log", "devnull"),
            )
            .unwrap();
        pipeline
            .set_options(writer, Options::new().with("filename", path.to_str().unwrap()))
            .unwrap();

        let table = PointTable::new();
        pipeline.prepare(writer, &table).unwrap();
        pipeline.execute(writer, &table).unwrap();

        let metadata = pipeline.base(writer).unwrap().metadata().unwrap();
        assert_eq!(metadata.child("count").unwrap().value(), "5");
    }
}
