//! Windowed aggregation: window assignment, accumulator buckets, the
//! aggregate function protocol, and the operator that ties them together.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{FlowResult, TypeError};
use crate::event::Schema;
use crate::lang::{Type, Value};
use crate::types::EventTime;

mod assigners;
mod bucket;
mod functions;
mod operator;
mod primitives;

pub use assigners::*;
pub use bucket::*;
pub use functions::*;
pub use operator::*;
pub use primitives::*;

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
