use super::*;

// ── AggregateFunc ─────────────────────────────────────────────────────────────

/// A pluggable windowed aggregate.
///
/// The function object itself is stateless: all accumulator state lives in
/// the [`Bucket`]s it is handed. Folding happens per bucket, and a closed
/// window combines every bucket it owns, so `finish_window` must be
/// associative and commutative over buckets.
pub trait AggregateFunc: Send + Sync + 'static {
    /// Private accumulator state kept in each bucket.
    type State: Send + 'static;

    fn name(&self) -> &'static str;

    /// Fold one argument into `bucket`. Null arguments leave it unchanged.
    fn add_to_bucket(&self, arg: &Value, bucket: &mut Bucket<Self::State>, arg_type: &Type);

    /// Combine the buckets of one closed window into the result value.
    /// Buckets without state count as the identity element.
    fn finish_window<'a, I>(&self, buckets: I, out_type: &Type) -> Value
    where
        I: IntoIterator<Item = &'a Bucket<Self::State>>;

    /// Declared argument types; may contain universal type variables.
    fn argument_types(&self) -> Vec<Type>;

    /// Declared result type; may mention the argument type variables.
    fn return_type(&self) -> Type;

    /// Result type once every type variable is bound. Defaults to
    /// [`return_type`](Self::return_type) with the bindings substituted.
    fn resolve_return_type(&self, bindings: &[(String, Type)]) -> Type {
        bindings
            .iter()
            .fold(self.return_type(), |ty, (alias, bound)| {
                ty.substitute(alias, bound)
            })
    }
}

// ── Type-erased face ──────────────────────────────────────────────────────────

/// Object-safe view of an [`AggregateFunc`], so plans can hold a mix of
/// functions. Implemented for every `AggregateFunc`.
pub trait DynAggregateFunc: Send + Sync {
    fn name(&self) -> &'static str;
    fn new_bucket(&self) -> ErasedBucket;
    fn add_to_bucket(&self, arg: &Value, bucket: &mut ErasedBucket, arg_type: &Type);
    fn finish_window<'b>(
        &self,
        buckets: &mut dyn Iterator<Item = &'b ErasedBucket>,
        out_type: &Type,
    ) -> Value;
    fn argument_types(&self) -> Vec<Type>;
    fn return_type(&self) -> Type;
    fn resolve_return_type(&self, bindings: &[(String, Type)]) -> Type;
}

impl<F: AggregateFunc> DynAggregateFunc for F {
    fn name(&self) -> &'static str {
        AggregateFunc::name(self)
    }

    fn new_bucket(&self) -> ErasedBucket {
        ErasedBucket::new(Bucket::<F::State>::new())
    }

    fn add_to_bucket(&self, arg: &Value, bucket: &mut ErasedBucket, arg_type: &Type) {
        AggregateFunc::add_to_bucket(self, arg, bucket.downcast_mut::<F::State>(), arg_type);
    }

    fn finish_window<'b>(
        &self,
        buckets: &mut dyn Iterator<Item = &'b ErasedBucket>,
        out_type: &Type,
    ) -> Value {
        AggregateFunc::finish_window(
            self,
            buckets.map(|b| b.downcast_ref::<F::State>()),
            out_type,
        )
    }

    fn argument_types(&self) -> Vec<Type> {
        AggregateFunc::argument_types(self)
    }

    fn return_type(&self) -> Type {
        AggregateFunc::return_type(self)
    }

    fn resolve_return_type(&self, bindings: &[(String, Type)]) -> Type {
        AggregateFunc::resolve_return_type(self, bindings)
    }
}

/// Type-check a call of `func` with `actual` argument types and return the
/// resolved result type.
///
/// Universal argument types are unified with the actual types once, here;
/// nothing is re-checked per event.
pub fn resolve_signature(func: &dyn DynAggregateFunc, actual: &[Type]) -> Result<Type, TypeError> {
    let declared = func.argument_types();
    if declared.len() != actual.len() {
        return Err(TypeError::Arity {
            function: func.name().to_string(),
            expected: declared.len(),
            actual: actual.len(),
        });
    }

    let mut bindings: Vec<(String, Type)> = Vec::new();
    for (decl, act) in declared.iter().zip(actual) {
        match decl {
            Type::Universal(var) => {
                let bound = var.unify(act)?;
                match bindings.iter().find(|(alias, _)| alias == var.alias()) {
                    Some((_, prev)) if *prev != bound => {
                        return Err(TypeError::Mismatch {
                            expected: prev.clone(),
                            actual: bound,
                        });
                    }
                    Some(_) => {}
                    None => bindings.push((var.alias().to_string(), bound)),
                }
            }
            concrete if !concrete.accepts(act) => {
                return Err(TypeError::Mismatch {
                    expected: concrete.clone(),
                    actual: act.clone(),
                });
            }
            _ => {}
        }
    }
    Ok(func.resolve_return_type(&bindings))
}

// ── BoundAggregate ────────────────────────────────────────────────────────────

/// An aggregate call resolved against an input schema at plan time.
#[derive(Clone)]
pub struct BoundAggregate {
    pub func: Arc<dyn DynAggregateFunc>,
    /// Input column the argument is read from.
    pub column: usize,
    pub arg_type: Type,
    pub return_type: Type,
    /// Output field name.
    pub alias: String,
}

impl BoundAggregate {
    /// Resolve `func(column)` against `input`.
    pub fn bind(
        func: Arc<dyn DynAggregateFunc>,
        input: &Schema,
        column: &str,
        alias: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let index = input
            .index_of(column)
            .ok_or_else(|| TypeError::UnknownColumn(column.to_string()))?;
        let arg_type = input.fields()[index].ty.clone();
        let return_type = resolve_signature(func.as_ref(), std::slice::from_ref(&arg_type))?;
        Ok(Self {
            func,
            column: index,
            arg_type,
            return_type,
            alias: alias.into(),
        })
    }
}

impl fmt::Debug for BoundAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAggregate")
            .field("func", &self.func.name())
            .field("column", &self.column)
            .field("arg_type", &self.arg_type)
            .field("return_type", &self.return_type)
            .field("alias", &self.alias)
            .finish()
    }
}
