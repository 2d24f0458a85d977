//! Built-in readers.

mod faux;

pub use faux::FauxReader;
