//! Minimal translate pipeline: synthesize points, thin them, write CSV.
//!
//! Run with: cargo run --example translate -- out.csv

use pointflow::{Options, Pipeline, PointTable, StageFactory};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output = std::env::args().nth(1).unwrap_or_else(|| "STDOUT".to_string());

    let factory = StageFactory::new();
    let writer_type = factory.infer_writer_driver(&output);

    let mut pipeline = Pipeline::new();
    let reader = pipeline.add(factory.create_reader("readers.faux")?);
    let thin = pipeline.add(factory.create_filter("filters.decimation")?);
    let writer = pipeline.add(factory.create_writer(&writer_type)?);
    pipeline.set_input(thin, reader)?;
    pipeline.set_input(writer, thin)?;

    pipeline.set_options(
        reader,
        Options::new()
            .with("count", 10_000)
            .with("minx", -100.0)
            .with("maxx", 100.0),
    )?;
    pipeline.set_options(thin, Options::new().with("step", 100))?;
    pipeline.set_options(writer, factory.infer_writer_options(&output))?;

    let table = PointTable::new();
    pipeline.prepare(writer, &table)?;
    let views = pipeline.execute(writer, &table)?;

    let total: usize = views.iter().map(|v| v.len()).sum();
    eprintln!("wrote {total} points to {output}");
    Ok(())
}
