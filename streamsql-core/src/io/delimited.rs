use std::fmt;
use std::ops::Range;
use std::str::Utf8Error;

use super::{EventParser, convert_field};
use crate::error::ColumnParseError;
use crate::lang::{Type, Value};

pub const DEFAULT_DELIMITER: char = ',';

/// Cached state of one column of the current record.
///
/// `Unparsed` and `Null` are distinct on purpose: a column that has not
/// been converted yet must never read back as a true null.
#[derive(Debug, Clone, Default, PartialEq)]
enum ColumnSlot {
    #[default]
    Unparsed,
    Value { ty: Type, value: Value },
    Null { ty: Type },
}

/// Cumulative work counters of a parser instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Records bound via `reset`.
    pub records: u64,
    /// Fields the split cursor walked across.
    pub fields_scanned: u64,
    /// Field texts converted into typed values.
    pub conversions: u64,
}

/// [`EventParser`] for single-line records whose fields are separated by
/// one delimiter character.
///
/// The delimiter may not appear inside a field: there is no quoting or
/// escaping. Fields are split lazily and strictly left to right; every
/// discovered field span and every converted value is memoized until the
/// next [`reset`](EventParser::reset).
pub struct DelimitedEventParser {
    delimiter: char,
    text: String,
    utf8_error: Option<Utf8Error>,
    /// Start of the next undiscovered field; `None` once the last field
    /// of the record has been crossed.
    cursor: Option<usize>,
    spans: Vec<Range<usize>>,
    slots: Vec<ColumnSlot>,
    stats: ParserStats,
}

impl DelimitedEventParser {
    pub fn new() -> Self {
        Self::with_delimiter(DEFAULT_DELIMITER)
    }

    pub fn with_delimiter(delimiter: char) -> Self {
        Self {
            delimiter,
            text: String::new(),
            utf8_error: None,
            cursor: None,
            spans: Vec::new(),
            slots: Vec::new(),
            stats: ParserStats::default(),
        }
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Number of fields of the current record discovered so far.
    pub fn discovered_fields(&self) -> usize {
        self.spans.len()
    }

    /// Walk the cursor forward until the span of `index` is known.
    fn discover_through(&mut self, index: usize) -> Result<(), ColumnParseError> {
        if let Some(err) = self.utf8_error {
            return Err(err.into());
        }

        while self.spans.len() <= index {
            let Some(start) = self.cursor else {
                return Err(ColumnParseError::NotEnoughFields {
                    column: index,
                    available: self.spans.len(),
                });
            };

            let end = match self.text[start..].find(self.delimiter) {
                Some(offset) => {
                    self.cursor = Some(start + offset + self.delimiter.len_utf8());
                    start + offset
                }
                None => {
                    self.cursor = None;
                    self.text.len()
                }
            };
            self.spans.push(start..end);
            self.stats.fields_scanned += 1;
        }
        Ok(())
    }

    fn cache(&mut self, index: usize, ty: &Type, value: &Value) {
        if self.slots.len() <= index {
            // Skipped columns stay explicitly unparsed.
            self.slots.resize(index + 1, ColumnSlot::Unparsed);
        }
        self.slots[index] = if value.is_null() {
            ColumnSlot::Null { ty: ty.clone() }
        } else {
            ColumnSlot::Value {
                ty: ty.clone(),
                value: value.clone(),
            }
        };
    }
}

impl Default for DelimitedEventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser for DelimitedEventParser {
    fn reset(&mut self, body: &[u8]) {
        self.text.clear();
        match std::str::from_utf8(body) {
            Ok(text) => {
                self.text.push_str(text);
                self.utf8_error = None;
            }
            Err(err) => self.utf8_error = Some(err),
        }
        // An empty body has no fields at all.
        self.cursor = if body.is_empty() { None } else { Some(0) };
        self.spans.clear();
        self.slots.clear();
        self.stats.records += 1;
    }

    fn get_column(&mut self, index: usize, expected: &Type) -> Result<Value, ColumnParseError> {
        match self.slots.get(index) {
            Some(ColumnSlot::Value { ty, value }) if ty == expected => return Ok(value.clone()),
            Some(ColumnSlot::Null { ty }) if ty == expected => return Ok(Value::Null),
            _ => {}
        }

        self.discover_through(index)?;
        let span = self.spans[index].clone();
        let value = convert_field(index, &self.text[span], expected)?;
        self.stats.conversions += 1;
        self.cache(index, expected, &value);
        Ok(value)
    }
}

impl fmt::Display for DelimitedEventParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelimitedEventParser(delimiter={:?})", self.delimiter)
    }
}
