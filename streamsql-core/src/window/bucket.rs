use super::*;

/// Accumulator state of one aggregate for one (window, pane) pair.
///
/// The state is absent until the first contributing value arrives; from
/// then on only the owning aggregate function updates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<S> {
    state: Option<S>,
}

impl<S> Bucket<S> {
    pub fn new() -> Self {
        Self { state: None }
    }

    /// A bucket that already holds `state`.
    pub fn with_state(state: S) -> Self {
        Self { state: Some(state) }
    }

    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: S) {
        self.state = Some(state);
    }

    /// Mutable state, initialized with `init` on first touch.
    pub fn state_or_insert_with(&mut self, init: impl FnOnce() -> S) -> &mut S {
        self.state.get_or_insert_with(init)
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }
}

impl<S> Default for Bucket<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Bucket`] whose state type is known only to the aggregate function
/// that created it.
pub struct ErasedBucket(Box<dyn Any + Send>);

impl ErasedBucket {
    pub fn new<S: Send + 'static>(bucket: Bucket<S>) -> Self {
        Self(Box::new(bucket))
    }

    /// Borrow the typed bucket. Panics if `S` is not the state type it was
    /// created with.
    pub fn downcast_ref<S: 'static>(&self) -> &Bucket<S> {
        self.0
            .downcast_ref()
            .expect("ErasedBucket::downcast_ref state type mismatch")
    }

    /// Mutably borrow the typed bucket. Panics on state type mismatch.
    pub fn downcast_mut<S: 'static>(&mut self) -> &mut Bucket<S> {
        self.0
            .downcast_mut()
            .expect("ErasedBucket::downcast_mut state type mismatch")
    }
}

impl fmt::Debug for ErasedBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErasedBucket(<opaque>)")
    }
}
