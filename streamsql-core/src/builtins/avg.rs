use super::*;

/// `avg(x)` over numeric arguments, as DOUBLE; null on an empty window.
#[derive(Debug, Clone, Copy, Default)]
pub struct Avg;

impl AggregateFunc for Avg {
    /// Running (sum, count).
    type State = (f64, u64);

    fn name(&self) -> &'static str {
        "avg"
    }

    fn add_to_bucket(&self, arg: &Value, bucket: &mut Bucket<(f64, u64)>, _arg_type: &Type) {
        if let Some(v) = arg.as_f64() {
            let (sum, count) = bucket.state_or_insert_with(|| (0.0, 0));
            *sum += v;
            *count += 1;
        }
    }

    fn finish_window<'a, I>(&self, buckets: I, _out_type: &Type) -> Value
    where
        I: IntoIterator<Item = &'a Bucket<(f64, u64)>>,
    {
        let (sum, count) = buckets
            .into_iter()
            .filter_map(|b| b.state())
            .fold((0.0, 0u64), |(s, c), (bs, bc)| (s + bs, c + bc));
        if count == 0 {
            Value::Null
        } else {
            Value::Double(sum / count as f64)
        }
    }

    fn argument_types(&self) -> Vec<Type> {
        vec![type_var(TypeClass::Numeric)]
    }

    fn return_type(&self) -> Type {
        Type::nullable(TypeName::Double)
    }
}
