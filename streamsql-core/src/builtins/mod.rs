//! Built-in aggregate functions, looked up by name.

use std::sync::Arc;

use crate::lang::{Constraint, Type, TypeClass, TypeName, UniversalType, Value};
use crate::window::{self, AggregateFunc, Bucket};

mod avg;
mod count;
mod extrema;
mod sum;

pub use avg::*;
pub use count::*;
pub use extrema::*;
pub use sum::*;

/// Names accepted by [`lookup`].
pub const BUILTIN_NAMES: [&str; 5] = ["count", "sum", "min", "max", "avg"];

/// Resolve a builtin aggregate by name, ignoring case.
pub fn lookup(name: &str) -> Option<Arc<dyn window::DynAggregateFunc>> {
    let func: Arc<dyn window::DynAggregateFunc> = match name.trim().to_ascii_lowercase().as_str() {
        "count" => Arc::new(Count),
        "sum" => Arc::new(Sum),
        "min" => Arc::new(Min),
        "max" => Arc::new(Max),
        "avg" => Arc::new(Avg),
        _ => return None,
    };
    Some(func)
}

/// `'a` constrained to `class`, null allowed.
fn type_var(class: TypeClass) -> Type {
    Type::Universal(UniversalType::new("'a").with_constraint(Constraint::new(class, true)))
}

/// Bound type of the first type variable, if the plan resolved one.
fn binding(bindings: &[(String, Type)]) -> Option<&Type> {
    bindings.first().map(|(_, ty)| ty)
}

#[cfg(test)]
#[path = "tests/builtins_tests.rs"]
mod tests;
