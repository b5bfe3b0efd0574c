//! Flow execution: the element lifecycle contract, the contexts elements
//! deliver through, the transport-facing source adapter, and the local
//! environment that plans, opens and tears down flows.
//!
//! ```text
//! Transport node ──fan-out──▶ SourceRegistry ──▶ TransportSourceElement
//!                                                      │ context.emit
//!                                                      ▼
//!                                  Projection / Aggregation / Output
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::config::EngineConfig;
use crate::error::{ColumnParseError, FlowError, FlowResult, TypeError};
use crate::event::{Event, RawEvent, Schema, TypedField};
use crate::graph::{ElementKind, FlowGraph, downstream_map, topo_sort};
use crate::io::{DelimitedEventParser, EventParser};
use crate::lang::Value;
use crate::time::{BoundedOutOfOrderness, WatermarkGenerator};
use crate::types::{EventTime, FlowId, NodeId, StreamElement};
use crate::window::{BoundAggregate, WindowAggregator, WindowResult, WindowSpec};

mod aggregation;
mod builder;
mod context;
mod element;
mod environment;
mod flow;
mod output;
mod projection;
mod source;
mod transport;

pub use aggregation::*;
pub use builder::*;
pub use context::*;
pub use element::*;
pub use environment::*;
pub use flow::*;
pub use output::*;
pub use projection::*;
pub use source::*;
pub use transport::*;

#[cfg(test)]
#[path = "tests/exec_tests.rs"]
mod tests;
