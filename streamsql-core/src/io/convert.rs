use crate::error::ColumnParseError;
use crate::lang::{Type, TypeName, Value};

/// Converts the text of one non-empty field into a value of a fixed kind.
/// Returns `None` when the text is not a valid literal of that kind.
pub type Converter = fn(&str) -> Option<Value>;

/// The conversion table: exactly one converter per primitive kind.
pub fn converter_for(name: TypeName) -> Converter {
    match name {
        TypeName::Boolean => parse_bool,
        TypeName::Int => parse_int,
        TypeName::BigInt => parse_bigint,
        TypeName::Float => parse_float,
        TypeName::Double => parse_double,
        TypeName::String => parse_string,
        TypeName::Timestamp => parse_timestamp,
        TypeName::Timespan => parse_timespan,
    }
}

/// Convert the raw text of column `column` to `expected`.
///
/// Empty text is null for every kind except a non-nullable STRING, which
/// keeps the empty string. Text of non-string kinds is trimmed first.
pub fn convert_field(column: usize, text: &str, expected: &Type) -> Result<Value, ColumnParseError> {
    let Some(name) = expected.primitive_name() else {
        return Err(ColumnParseError::UnsupportedType {
            column,
            ty: expected.clone(),
        });
    };

    let text = if name == TypeName::String {
        text
    } else {
        text.trim()
    };
    if text.is_empty() && (expected.is_nullable() || name != TypeName::String) {
        return Ok(Value::Null);
    }

    converter_for(name)(text).ok_or_else(|| ColumnParseError::InvalidValue {
        column,
        type_name: name,
        text: text.to_string(),
    })
}

fn parse_bool(text: &str) -> Option<Value> {
    if text.eq_ignore_ascii_case("true") {
        Some(Value::Boolean(true))
    } else if text.eq_ignore_ascii_case("false") {
        Some(Value::Boolean(false))
    } else {
        None
    }
}

fn parse_int(text: &str) -> Option<Value> {
    text.parse().ok().map(Value::Int)
}

fn parse_bigint(text: &str) -> Option<Value> {
    text.parse().ok().map(Value::BigInt)
}

fn parse_float(text: &str) -> Option<Value> {
    text.parse().ok().map(Value::Float)
}

fn parse_double(text: &str) -> Option<Value> {
    text.parse().ok().map(Value::Double)
}

fn parse_string(text: &str) -> Option<Value> {
    Some(Value::String(text.to_string()))
}

fn parse_timestamp(text: &str) -> Option<Value> {
    text.parse().ok().map(Value::Timestamp)
}

fn parse_timespan(text: &str) -> Option<Value> {
    text.parse().ok().map(Value::Timespan)
}
