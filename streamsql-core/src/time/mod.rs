use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::{EventTime, Watermark};

mod watermark;

pub use watermark::*;

#[cfg(test)]
#[path = "tests/time_tests.rs"]
mod tests;
