//! CSV ingestion and validation.
//!
//! Turns a CSV file, buffer or stream into an ordered list of rows keyed by
//! header column. Validation happens before any job exists, so a rejected
//! input never produces a partial manifest:
//! - Path inputs must exist, stay under the configured allow-list root, and
//!   carry an accepted extension
//! - All inputs are bounded by `max_file_size_bytes`
//! - The header is mandatory and column names must be unique
//! - Blank rows are skipped; rows with the wrong field count fail the parse

mod parser;
mod source;

pub use parser::{parse_csv, CsvParser, CsvTable};
pub use source::CsvSource;
