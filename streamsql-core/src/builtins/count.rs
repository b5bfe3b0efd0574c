use super::*;

/// `count(x)`: number of non-null arguments. Never null; 0 on an empty window.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl AggregateFunc for Count {
    type State = i64;

    fn name(&self) -> &'static str {
        "count"
    }

    fn add_to_bucket(&self, arg: &Value, bucket: &mut Bucket<i64>, _arg_type: &Type) {
        if !arg.is_null() {
            *bucket.state_or_insert_with(|| 0) += 1;
        }
    }

    fn finish_window<'a, I>(&self, buckets: I, _out_type: &Type) -> Value
    where
        I: IntoIterator<Item = &'a Bucket<i64>>,
    {
        let total: i64 = buckets.into_iter().filter_map(|b| b.state()).sum();
        Value::BigInt(total)
    }

    fn argument_types(&self) -> Vec<Type> {
        vec![type_var(TypeClass::Any)]
    }

    fn return_type(&self) -> Type {
        Type::primitive(TypeName::BigInt)
    }
}
