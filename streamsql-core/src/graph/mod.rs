//! Logical flow topology: element nodes, the edges between them, and
//! the ordering helpers used to materialize a flow.

use std::collections::HashMap;
use std::fmt;

use crate::error::{FlowError, FlowResult};
use crate::types::NodeId;

mod flow_graph;

pub use flow_graph::*;

#[cfg(test)]
#[path = "tests/flow_graph_tests.rs"]
mod tests;
