use super::*;

/// Keyed windowed aggregation as a flow element.
///
/// Output rows carry the group columns followed by one column per
/// aggregate, stamped with the window's max timestamp. Watermarks fire the
/// windows they close and are then forwarded; `End` fires everything still
/// pending and is forwarded last. The element assumes a single upstream
/// watermark producer.
pub struct AggregationElement {
    name: String,
    group_columns: Vec<usize>,
    output: Arc<Schema>,
    aggregator: WindowAggregator,
    context: Arc<dyn FlowElementContext>,
    state: ElementState,
}

impl AggregationElement {
    pub fn new(
        name: impl Into<String>,
        input: &Schema,
        group_by: &[&str],
        aggregates: Vec<BoundAggregate>,
        window: WindowSpec,
        context: Arc<dyn FlowElementContext>,
    ) -> FlowResult<Self> {
        let group_columns = resolve_columns(input, group_by)?;
        let extra = aggregates
            .iter()
            .map(|a| TypedField::new(a.alias.clone(), a.return_type.clone()))
            .collect();
        let output = derive_schema(input, &group_columns, extra);
        let aggregator = WindowAggregator::new(window, aggregates).map_err(FlowError::Graph)?;
        Ok(Self {
            name: name.into(),
            group_columns,
            output,
            aggregator,
            context,
            state: ElementState::Created,
        })
    }

    pub fn output_schema(&self) -> &Arc<Schema> {
        &self.output
    }

    /// Records dropped because every window they belonged to had fired.
    pub fn late_records(&self) -> u64 {
        self.aggregator.late_records()
    }

    fn emit_results(&self, results: Vec<WindowResult>) -> FlowResult<()> {
        for result in results {
            let timestamp = result.timestamp();
            let mut values = result.key;
            values.extend(result.values);
            let event = Event::new(Arc::clone(&self.output), values, timestamp);
            self.context.emit(StreamElement::Record(event))?;
        }
        Ok(())
    }
}

impl FlowElement for AggregationElement {
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
        match element {
            StreamElement::Record(event) => {
                let key: Vec<Value> = self
                    .group_columns
                    .iter()
                    .map(|&i| event.value(i).cloned().unwrap_or(Value::Null))
                    .collect();
                let args: Vec<Value> = self
                    .aggregator
                    .aggregates()
                    .iter()
                    .map(|a| event.value(a.column).cloned().unwrap_or(Value::Null))
                    .collect();
                let results = self.aggregator.process(key, &args, event.timestamp())?;
                self.emit_results(results)
            }
            StreamElement::Watermark(wm) => {
                let results = self.aggregator.advance_watermark(wm.timestamp);
                self.emit_results(results)?;
                self.context.emit(StreamElement::Watermark(wm))
            }
            StreamElement::End => {
                let results = self.aggregator.flush();
                self.emit_results(results)?;
                self.context.emit(StreamElement::End)
            }
        }
    }

    fn close(&mut self) -> FlowResult<()> {
        if self.state != ElementState::Closed && self.aggregator.late_records() > 0 {
            tracing::debug!(
                "{} dropped {} late record(s)",
                self.name,
                self.aggregator.late_records()
            );
        }
        self.state = ElementState::Closed;
        Ok(())
    }
}
