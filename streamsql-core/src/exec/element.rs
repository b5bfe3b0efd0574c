use super::*;

/// A node of a running flow.
///
/// # Lifecycle
///
/// constructed → [`open`](Self::open) → zero or more
/// [`take_event`](Self::take_event) → [`close`](Self::close) → dropped.
///
/// `open` is idempotent once it has succeeded. `close` is idempotent and
/// safe after a partially failed `open`. A closed element rejects further
/// events with [`FlowError::Closed`].
pub trait FlowElement: Send {
    fn name(&self) -> &str;

    fn open(&mut self) -> FlowResult<()>;

    /// Accept one element from upstream, emitting zero or more elements to
    /// this element's context before returning.
    fn take_event(&mut self, element: StreamElement<Event>) -> FlowResult<()>;

    fn close(&mut self) -> FlowResult<()>;

    /// Sources are fed by the transport, never by `take_event`.
    fn is_source(&self) -> bool {
        false
    }
}

/// An element shared between the flow that owns it and the contexts that
/// deliver to it. Delivery happens under the element's lock.
pub type SharedElement = Arc<Mutex<Box<dyn FlowElement>>>;

pub fn shared(element: Box<dyn FlowElement>) -> SharedElement {
    Arc::new(Mutex::new(element))
}

/// Lifecycle state tracked by every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementState {
    #[default]
    Created,
    Open,
    Closed,
}

impl ElementState {
    /// Fail with [`FlowError::Closed`] once the element has been closed.
    pub fn ensure_accepting(self, name: &str) -> FlowResult<()> {
        match self {
            ElementState::Closed => Err(FlowError::Closed(name.to_string())),
            ElementState::Created | ElementState::Open => Ok(()),
        }
    }
}

/// Output schema of a projection or aggregation: `columns` taken from
/// `input`, followed by `extra` fields.
pub fn derive_schema(input: &Schema, columns: &[usize], extra: Vec<TypedField>) -> Arc<Schema> {
    let mut fields: Vec<TypedField> = columns
        .iter()
        .filter_map(|&i| input.field(i).cloned())
        .collect();
    fields.extend(extra);
    Arc::new(Schema::new(fields))
}

/// Resolve column names against `input`.
pub fn resolve_columns(input: &Schema, names: &[&str]) -> FlowResult<Vec<usize>> {
    names
        .iter()
        .map(|name| {
            input
                .index_of(name)
                .ok_or_else(|| TypeError::UnknownColumn(name.to_string()).into())
        })
        .collect()
}
