use std::cmp::Ordering;

use super::*;

/// Keep whichever of `current` and `candidate` sorts toward `keep`.
fn pick(current: &mut Value, candidate: &Value, keep: Ordering) {
    if candidate.compare(current) == Some(keep) {
        *current = candidate.clone();
    }
}

fn fold_extremum(arg: &Value, bucket: &mut Bucket<Value>, keep: Ordering) {
    if arg.is_null() {
        return;
    }
    let current = bucket.state_or_insert_with(|| arg.clone());
    pick(current, arg, keep);
}

fn combine_extremum<'a>(
    buckets: impl IntoIterator<Item = &'a Bucket<Value>>,
    keep: Ordering,
) -> Value {
    let mut best: Option<Value> = None;
    for state in buckets.into_iter().filter_map(|b| b.state()) {
        best = Some(match best.take() {
            Some(mut current) => {
                pick(&mut current, state, keep);
                current
            }
            None => state.clone(),
        });
    }
    best.unwrap_or(Value::Null)
}

/// `min(x)` over any comparable type; null on an empty window.
#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl AggregateFunc for Min {
    type State = Value;

    fn name(&self) -> &'static str {
        "min"
    }

    fn add_to_bucket(&self, arg: &Value, bucket: &mut Bucket<Value>, _arg_type: &Type) {
        fold_extremum(arg, bucket, Ordering::Less);
    }

    fn finish_window<'a, I>(&self, buckets: I, _out_type: &Type) -> Value
    where
        I: IntoIterator<Item = &'a Bucket<Value>>,
    {
        combine_extremum(buckets, Ordering::Less)
    }

    fn argument_types(&self) -> Vec<Type> {
        vec![type_var(TypeClass::Comparable)]
    }

    fn return_type(&self) -> Type {
        type_var(TypeClass::Comparable)
    }

    fn resolve_return_type(&self, bindings: &[(String, Type)]) -> Type {
        binding(bindings).map_or_else(|| self.return_type(), Type::as_nullable)
    }
}

/// `max(x)` over any comparable type; null on an empty window.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl AggregateFunc for Max {
    type State = Value;

    fn name(&self) -> &'static str {
        "max"
    }

    fn add_to_bucket(&self, arg: &Value, bucket: &mut Bucket<Value>, _arg_type: &Type) {
        fold_extremum(arg, bucket, Ordering::Greater);
    }

    fn finish_window<'a, I>(&self, buckets: I, _out_type: &Type) -> Value
    where
        I: IntoIterator<Item = &'a Bucket<Value>>,
    {
        combine_extremum(buckets, Ordering::Greater)
    }

    fn argument_types(&self) -> Vec<Type> {
        vec![type_var(TypeClass::Comparable)]
    }

    fn return_type(&self) -> Type {
        type_var(TypeClass::Comparable)
    }

    fn resolve_return_type(&self, bindings: &[(String, Type)]) -> Type {
        binding(bindings).map_or_else(|| self.return_type(), Type::as_nullable)
    }
}
