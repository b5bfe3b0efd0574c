use std::fmt;

use serde::{Deserialize, Serialize};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Unique identifier for flow graph nodes.
pub type NodeId = u32;

/// Identifier of a running flow within an execution environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(pub u64);

impl FlowId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow[{}]", self.0)
    }
}

/// Watermark indicates that no elements with timestamp <= this value will arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// The unit passed between flow elements: data records, watermarks and the
/// end-of-input marker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamElement<T> {
    /// User data record.
    Record(T),
    /// Event time progress.
    Watermark(Watermark),
    /// End of bounded input.
    End,
}

impl<T> StreamElement<T> {
    /// Create a watermark element.
    pub fn watermark(timestamp: EventTime) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    /// Borrow the record payload, if this is a record.
    pub fn as_record(&self) -> Option<&T> {
        match self {
            Self::Record(rec) => Some(rec),
            _ => None,
        }
    }

    /// Transform the record payload, leaving control elements untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StreamElement<U> {
        match self {
            Self::Record(rec) => StreamElement::Record(f(rec)),
            Self::Watermark(wm) => StreamElement::Watermark(wm),
            Self::End => StreamElement::End,
        }
    }
}
