use super::*;

/// Running total of one bucket, integral or floating depending on the
/// argument type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SumState {
    Integral(i64),
    Floating(f64),
}

/// `sum(x)` over numeric arguments. Integral input sums to BIGINT, floating
/// input to DOUBLE; an empty window sums to 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl AggregateFunc for Sum {
    type State = SumState;

    fn name(&self) -> &'static str {
        "sum"
    }

    fn add_to_bucket(&self, arg: &Value, bucket: &mut Bucket<SumState>, arg_type: &Type) {
        if arg.is_null() {
            return;
        }
        let integral = arg_type.primitive_name().is_some_and(TypeName::is_integral);
        match (integral, arg.as_i64(), arg.as_f64()) {
            (true, Some(v), _) => {
                if let SumState::Integral(total) =
                    bucket.state_or_insert_with(|| SumState::Integral(0))
                {
                    *total = total.wrapping_add(v);
                }
            }
            (false, _, Some(v)) => {
                if let SumState::Floating(total) =
                    bucket.state_or_insert_with(|| SumState::Floating(0.0))
                {
                    *total += v;
                }
            }
            _ => {}
        }
    }

    fn finish_window<'a, I>(&self, buckets: I, out_type: &Type) -> Value
    where
        I: IntoIterator<Item = &'a Bucket<SumState>>,
    {
        let states = buckets.into_iter().filter_map(|b| b.state());
        if out_type.primitive_name() == Some(TypeName::BigInt) {
            let total = states.fold(0i64, |acc, s| match s {
                SumState::Integral(v) => acc.wrapping_add(*v),
                SumState::Floating(v) => acc.wrapping_add(*v as i64),
            });
            Value::BigInt(total)
        } else {
            let total = states.fold(0.0f64, |acc, s| match s {
                SumState::Integral(v) => acc + *v as f64,
                SumState::Floating(v) => acc + v,
            });
            Value::Double(total)
        }
    }

    fn argument_types(&self) -> Vec<Type> {
        vec![type_var(TypeClass::Numeric)]
    }

    fn return_type(&self) -> Type {
        Type::primitive(TypeName::Double)
    }

    fn resolve_return_type(&self, bindings: &[(String, Type)]) -> Type {
        match binding(bindings).and_then(Type::primitive_name) {
            Some(name) if name.is_integral() => Type::primitive(TypeName::BigInt),
            _ => Type::primitive(TypeName::Double),
        }
    }
}
