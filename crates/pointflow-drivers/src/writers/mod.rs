//! Built-in writers.

mod text;

pub use text::TextWriter;
