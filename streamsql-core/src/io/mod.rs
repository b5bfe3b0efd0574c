//! Parsing raw transport records into typed column values.

use crate::error::ColumnParseError;
use crate::lang::{Type, Value};

mod convert;
mod delimited;

pub use convert::*;
pub use delimited::*;

/// Turns one raw record at a time into typed column values, on demand.
///
/// An instance serves a single record context: [`reset`](Self::reset) binds
/// the next record and drops everything cached for the previous one.
pub trait EventParser: Send {
    /// Bind a new record body. Must be called before the first
    /// [`get_column`](Self::get_column) for that record.
    fn reset(&mut self, body: &[u8]);

    /// Return column `index` converted to `expected`, or [`Value::Null`] for
    /// an empty field.
    fn get_column(&mut self, index: usize, expected: &Type) -> Result<Value, ColumnParseError>;
}

#[cfg(test)]
#[path = "tests/parser_tests.rs"]
mod tests;
