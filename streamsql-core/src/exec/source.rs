use super::*;

/// How a flow source turns raw records into events.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    pub delimiter: char,
    /// Watermarks trail the newest event time by this much.
    pub max_out_of_orderness: Duration,
    /// Column holding the event time; ingestion time when `None`.
    pub timestamp_column: Option<String>,
}

impl SourceOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            delimiter: config.parser.delimiter,
            max_out_of_orderness: Duration::from_millis(config.source.max_out_of_orderness_ms),
            timestamp_column: None,
        }
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = Some(column.into());
        self
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Adapter between an external transport node and a flow.
///
/// `open` registers a [`SourceBinding`] under this element's flow-source
/// id, then asks the transport to fan the upstream node out to it. Events
/// reach the flow through the registry, never through `take_event`.
pub struct TransportSourceElement {
    name: String,
    upstream: String,
    flow_source_id: String,
    schema: Arc<Schema>,
    options: SourceOptions,
    transport: Arc<dyn Transport>,
    registry: Arc<SourceRegistry>,
    context: Arc<dyn FlowElementContext>,
    state: ElementState,
    bound: bool,
    attached: bool,
}

impl TransportSourceElement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        upstream: impl Into<String>,
        flow_source_id: impl Into<String>,
        schema: Arc<Schema>,
        options: SourceOptions,
        transport: Arc<dyn Transport>,
        registry: Arc<SourceRegistry>,
        context: Arc<dyn FlowElementContext>,
    ) -> Self {
        Self {
            name: name.into(),
            upstream: upstream.into(),
            flow_source_id: flow_source_id.into(),
            schema,
            options,
            transport,
            registry,
            context,
            state: ElementState::Created,
            bound: false,
            attached: false,
        }
    }

    pub fn flow_source_id(&self) -> &str {
        &self.flow_source_id
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn binding(&self) -> FlowResult<SourceBinding> {
        let parser = DelimitedEventParser::with_delimiter(self.options.delimiter);
        let mut binding = SourceBinding::new(
            Arc::clone(&self.schema),
            Box::new(parser),
            Arc::clone(&self.context),
        )
        .with_watermarks(Box::new(BoundedOutOfOrderness::new(
            self.options.max_out_of_orderness,
        )));
        if let Some(column) = &self.options.timestamp_column {
            let index = self
                .schema
                .index_of(column)
                .ok_or_else(|| TypeError::UnknownColumn(column.clone()))?;
            binding = binding.with_timestamp_column(index);
        }
        Ok(binding)
    }
}

impl FlowElement for TransportSourceElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> FlowResult<()> {
        match self.state {
            ElementState::Open => return Ok(()),
            ElementState::Closed => return Err(FlowError::Closed(self.name.clone())),
            ElementState::Created => {}
        }

        if !self.bound {
            self.registry.bind(&self.flow_source_id, self.binding()?)?;
            self.bound = true;
        }
        if let Err(err) = self
            .transport
            .attach_fan_out(&self.upstream, &self.flow_source_id)
        {
            if let Err(unbind_err) = self.registry.unbind(&self.flow_source_id) {
                tracing::warn!("{}: unbind after failed attach: {unbind_err}", self.name);
            }
            self.bound = false;
            return Err(err);
        }
        self.attached = true;
        self.state = ElementState::Open;
        tracing::debug!(
            "{} opened: {} -> {}",
            self.name,
            self.upstream,
            self.flow_source_id
        );
        Ok(())
    }

    fn take_event(&mut self, _element: StreamElement<Event>) -> FlowResult<()> {
        panic!(
            "{} is a transport source and cannot accept events from upstream",
            self.name
        );
    }

    fn close(&mut self) -> FlowResult<()> {
        if self.state == ElementState::Closed {
            return Ok(());
        }
        self.state = ElementState::Closed;

        let mut first_err = None;
        if self.attached {
            self.attached = false;
            if let Err(err) = self
                .transport
                .detach_fan_out(&self.upstream, &self.flow_source_id)
            {
                first_err = Some(err);
            }
        }
        if self.bound {
            self.bound = false;
            if let Err(err) = self.registry.unbind(&self.flow_source_id) {
                first_err.get_or_insert(err);
            }
        }
        tracing::debug!("{} closed", self.name);
        first_err.map_or(Ok(()), Err)
    }

    fn is_source(&self) -> bool {
        true
    }
}
