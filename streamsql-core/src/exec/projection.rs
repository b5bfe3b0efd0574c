use super::*;

/// Narrows each record to a subset of its columns. Watermarks and `End`
/// pass through unchanged.
pub struct ProjectionElement {
    name: String,
    columns: Vec<usize>,
    output: Arc<Schema>,
    context: Arc<dyn FlowElementContext>,
    state: ElementState,
}

impl ProjectionElement {
    pub fn new(
        name: impl Into<String>,
        input: &Schema,
        columns: &[&str],
        context: Arc<dyn FlowElementContext>,
    ) -> FlowResult<Self> {
        let columns = resolve_columns(input, columns)?;
        Ok(Self {
            name: name.into(),
            output: derive_schema(input, &columns, Vec::new()),
            columns,
            context,
            state: ElementState::Created,
        })
    }

    pub fn output_schema(&self) -> &Arc<Schema> {
        &self.output
    }
}

impl FlowElement for ProjectionElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> FlowResult<()> {
        self.state.ensure_accepting(&self.name)?;
        self.state = ElementState::Open;
        Ok(())
    }

    fn take_event(&mut self, element: StreamElement<Event>) -> FlowResult<()> {
        self.state.ensure_accepting(&self.name)?;
        let projected = element.map(|event| {
            let values = self
                .columns
                .iter()
                .map(|&i| event.value(i).cloned().unwrap_or(Value::Null))
                .collect();
            Event::new(Arc::clone(&self.output), values, event.timestamp())
        });
        self.context.emit(projected)
    }

    fn close(&mut self) -> FlowResult<()> {
        self.state = ElementState::Closed;
        Ok(())
    }
}
