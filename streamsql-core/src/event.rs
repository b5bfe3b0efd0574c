//! Typed events, their schemas, and raw transport records.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lang::{Type, Value};
use crate::types::EventTime;

/// A named, typed column of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedField {
    pub name: String,
    pub ty: Type,
}

impl TypedField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered field list describing the values of an [`Event`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<TypedField>,
}

impl Schema {
    pub fn new(fields: Vec<TypedField>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[TypedField] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&TypedField> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the field called `name`, compared case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Parse a column list such as `id:int, host:string?, ts:timestamp`.
    pub fn parse_columns(decl: &str) -> Option<Self> {
        let mut fields = Vec::new();
        for col in decl.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let (name, ty) = col.split_once(':')?;
            fields.push(TypedField::new(name.trim(), Type::from_sql(ty)?));
        }
        Some(Self::new(fields))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", field.name, field.ty)?;
        }
        f.write_str(")")
    }
}

/// An immutable typed record.
///
/// Cloning is cheap: schema and values are shared. Derived events are built
/// with [`Event::new`]; an existing event is never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    schema: Arc<Schema>,
    values: Arc<[Value]>,
    timestamp: EventTime,
}

impl Event {
    pub fn new(schema: Arc<Schema>, values: Vec<Value>, timestamp: EventTime) -> Self {
        debug_assert_eq!(
            schema.len(),
            values.len(),
            "event arity must match its schema"
        );
        Self {
            schema,
            values: values.into(),
            timestamp,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Look up a value by field name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.value(i))
    }

    pub fn timestamp(&self) -> EventTime {
        self.timestamp
    }

    /// Render the values as one delimited text line.
    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut out = String::new();
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            out.push_str(&v.to_string());
        }
        out
    }
}

/// A raw record handed over by the transport, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub body: Vec<u8>,
    /// Ingestion time in milliseconds since epoch.
    pub timestamp: EventTime,
}

impl RawEvent {
    pub fn new(body: impl Into<Vec<u8>>, timestamp: EventTime) -> Self {
        Self {
            body: body.into(),
            timestamp,
        }
    }
}
