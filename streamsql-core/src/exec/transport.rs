use super::*;

/// The external event transport a flow attaches to.
///
/// Attaching asks the transport to deliver, in addition to a node's
/// original destination, every record of `upstream` to the flow source
/// bound as `flow_source_id` in the [`SourceRegistry`].
pub trait Transport: Send + Sync {
    fn attach_fan_out(&self, upstream: &str, flow_source_id: &str) -> FlowResult<()>;

    fn detach_fan_out(&self, upstream: &str, flow_source_id: &str) -> FlowResult<()>;
}

// ── SourceBinding ─────────────────────────────────────────────────────────────

/// Everything needed to turn raw records of one flow source into events:
/// a private parser, the schema, watermark generation and the context the
/// events go to.
pub struct SourceBinding {
    schema: Arc<Schema>,
    parser: Box<dyn EventParser>,
    context: Arc<dyn FlowElementContext>,
    watermarks: Box<dyn WatermarkGenerator>,
    timestamp_column: Option<usize>,
    last_watermark: Option<EventTime>,
    records: u64,
}

impl SourceBinding {
    pub fn new(
        schema: Arc<Schema>,
        parser: Box<dyn EventParser>,
        context: Arc<dyn FlowElementContext>,
    ) -> Self {
        Self {
            schema,
            parser,
            context,
            watermarks: Box::new(BoundedOutOfOrderness::ascending()),
            timestamp_column: None,
            last_watermark: None,
            records: 0,
        }
    }

    pub fn with_watermarks(mut self, watermarks: Box<dyn WatermarkGenerator>) -> Self {
        self.watermarks = watermarks;
        self
    }

    /// Take event time from column `index` instead of the ingestion time.
    /// Records whose column is null are rejected.
    pub fn with_timestamp_column(mut self, index: usize) -> Self {
        self.timestamp_column = Some(index);
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Records converted so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Parse `raw`, emit the event, then a watermark if it advanced.
    fn deliver(&mut self, source_id: &str, raw: &RawEvent) -> FlowResult<()> {
        self.parser.reset(&raw.body);
        let mut values = Vec::with_capacity(self.schema.len());
        for (index, field) in self.schema.fields().iter().enumerate() {
            let value = self
                .parser
                .get_column(index, &field.ty)
                .map_err(|error| FlowError::Record {
                    source_id: source_id.to_string(),
                    error,
                })?;
            values.push(value);
        }

        let timestamp = match self.timestamp_column {
            Some(column) => values
                .get(column)
                .and_then(Value::as_i64)
                .ok_or_else(|| FlowError::Record {
                    source_id: source_id.to_string(),
                    error: ColumnParseError::MissingTimestamp { column },
                })?,
            None => raw.timestamp,
        };
        let event = Event::new(Arc::clone(&self.schema), values, timestamp);
        self.context.emit(StreamElement::Record(event))?;
        self.records += 1;

        self.watermarks.on_event(timestamp);
        if let Some(wm) = self.watermarks.current_watermark() {
            if self.last_watermark < Some(wm.timestamp) {
                self.last_watermark = Some(wm.timestamp);
                self.context.emit(StreamElement::Watermark(wm))?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> FlowResult<()> {
        self.context.emit(StreamElement::End)
    }
}

impl fmt::Debug for SourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBinding")
            .field("schema", &self.schema)
            .field("timestamp_column", &self.timestamp_column)
            .field("last_watermark", &self.last_watermark)
            .field("records", &self.records)
            .finish()
    }
}

// ── SourceRegistry ────────────────────────────────────────────────────────────

/// Process-wide map from flow-source id to its binding.
///
/// `bind` and `unbind` are the only mutations. Each binding carries its own
/// lock, so parsing a record never holds the registry lock.
#[derive(Default)]
pub struct SourceRegistry {
    bindings: Mutex<AHashMap<String, Arc<Mutex<SourceBinding>>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `binding` under `id`. Fails if `id` is already bound.
    pub fn bind(&self, id: &str, binding: SourceBinding) -> FlowResult<()> {
        let mut bindings = self.bindings.lock()?;
        if bindings.contains_key(id) {
            return Err(FlowError::DuplicateSource(id.to_string()));
        }
        bindings.insert(id.to_string(), Arc::new(Mutex::new(binding)));
        tracing::info!("bound flow source {id}");
        Ok(())
    }

    /// Remove the binding for `id`. Returns whether one existed.
    pub fn unbind(&self, id: &str) -> FlowResult<bool> {
        let removed = self.bindings.lock()?.remove(id).is_some();
        if removed {
            tracing::info!("unbound flow source {id}");
        }
        Ok(removed)
    }

    pub fn is_bound(&self, id: &str) -> bool {
        self.bindings
            .lock()
            .map(|b| b.contains_key(id))
            .unwrap_or(false)
    }

    /// Bound ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .bindings
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn binding(&self, id: &str) -> FlowResult<Arc<Mutex<SourceBinding>>> {
        self.bindings
            .lock()?
            .get(id)
            .cloned()
            .ok_or_else(|| FlowError::UnknownSource(id.to_string()))
    }

    /// Convert `raw` with the binding for `id` and emit it into the flow.
    pub fn deliver(&self, id: &str, raw: &RawEvent) -> FlowResult<()> {
        let binding = self.binding(id)?;
        let mut binding = binding.lock()?;
        binding.deliver(id, raw)
    }

    /// Signal that the source bound as `id` will deliver nothing more.
    pub fn end_of_stream(&self, id: &str) -> FlowResult<()> {
        let binding = self.binding(id)?;
        let mut binding = binding.lock()?;
        binding.finish()
    }
}

// ── LocalTransport ────────────────────────────────────────────────────────────

#[derive(Default)]
struct TransportNode {
    /// The node's original destination; every record lands here first.
    log: Vec<RawEvent>,
    fan_out: BTreeSet<String>,
}

/// In-memory transport of named nodes, each fanning out to any number of
/// attached flow sources.
pub struct LocalTransport {
    registry: Arc<SourceRegistry>,
    nodes: Mutex<HashMap<String, TransportNode>>,
}

impl LocalTransport {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Create node `name` if it does not exist yet.
    pub fn create_node(&self, name: &str) -> FlowResult<()> {
        self.nodes.lock()?.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Flow sources currently attached to `node`, sorted.
    pub fn fan_out_of(&self, node: &str) -> Vec<String> {
        self.nodes
            .lock()
            .ok()
            .and_then(|nodes| nodes.get(node).map(|n| n.fan_out.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// Records ever sent to `node`.
    pub fn delivered(&self, node: &str) -> Vec<RawEvent> {
        self.nodes
            .lock()
            .ok()
            .and_then(|nodes| nodes.get(node).map(|n| n.log.clone()))
            .unwrap_or_default()
    }

    fn attached(&self, node: &str) -> FlowResult<Vec<String>> {
        let nodes = self.nodes.lock()?;
        let node = nodes
            .get(node)
            .ok_or_else(|| FlowError::io(format!("no transport node {node}")))?;
        Ok(node.fan_out.iter().cloned().collect())
    }

    /// Append `raw` to `node` and deliver it to every attached flow.
    ///
    /// Records that fail to parse for a flow are logged and skipped for
    /// that flow. A flow that fails outright does not stop delivery to the
    /// others; the first such error is returned once every flow was tried.
    /// Returns the number of flows that accepted the record.
    pub fn send(&self, node: &str, raw: RawEvent) -> FlowResult<usize> {
        let targets = {
            let mut nodes = self.nodes.lock()?;
            let entry = nodes
                .get_mut(node)
                .ok_or_else(|| FlowError::io(format!("no transport node {node}")))?;
            entry.log.push(raw.clone());
            entry.fan_out.iter().cloned().collect::<Vec<_>>()
        };

        let mut accepted = 0;
        let mut first_error = None;
        for id in targets {
            match self.registry.deliver(&id, &raw) {
                Ok(()) => accepted += 1,
                Err(err @ FlowError::Record { .. }) => {
                    tracing::warn!("skipping record on {node}: {err}");
                }
                Err(FlowError::UnknownSource(id)) => {
                    tracing::debug!("flow source {id} went away during delivery");
                }
                Err(err) => {
                    tracing::error!("delivery from {node} to {id} failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(accepted),
        }
    }

    /// Send `End` to every flow attached to `node`, returning the first
    /// failure after every flow was tried.
    pub fn finish(&self, node: &str) -> FlowResult<()> {
        let mut first_error = None;
        for id in self.attached(node)? {
            match self.registry.end_of_stream(&id) {
                Ok(()) | Err(FlowError::UnknownSource(_)) => {}
                Err(err) => {
                    tracing::error!("ending {id} on {node} failed: {err}");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Transport for LocalTransport {
    fn attach_fan_out(&self, upstream: &str, flow_source_id: &str) -> FlowResult<()> {
        let mut nodes = self.nodes.lock()?;
        let node = nodes
            .get_mut(upstream)
            .ok_or_else(|| FlowError::io(format!("no transport node {upstream}")))?;
        node.fan_out.insert(flow_source_id.to_string());
        tracing::debug!("attached {flow_source_id} to {upstream}");
        Ok(())
    }

    fn detach_fan_out(&self, upstream: &str, flow_source_id: &str) -> FlowResult<()> {
        let mut nodes = self.nodes.lock()?;
        let node = nodes
            .get_mut(upstream)
            .ok_or_else(|| FlowError::io(format!("no transport node {upstream}")))?;
        node.fan_out.remove(flow_source_id);
        tracing::debug!("detached {flow_source_id} from {upstream}");
        Ok(())
    }
}
