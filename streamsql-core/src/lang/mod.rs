//! Type system and runtime values shared by the parser and aggregate functions.

mod types;
mod value;

pub use types::*;
pub use value::*;

#[cfg(test)]
#[path = "tests/lang_tests.rs"]
mod tests;
