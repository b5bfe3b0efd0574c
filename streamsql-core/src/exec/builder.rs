use super::*;

/// What an element factory receives when its flow is materialized.
pub struct ElementSetup {
    pub flow_id: FlowId,
    pub node_id: NodeId,
    /// Delivers to every downstream element of this node.
    pub context: Arc<dyn FlowElementContext>,
}

/// Deferred construction of one element.
pub type ElementFactory =
    Box<dyn FnOnce(ElementSetup) -> FlowResult<Box<dyn FlowElement>> + Send>;

/// One aggregate call of a plan: `function(column) AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCall {
    pub function: String,
    pub column: String,
    pub alias: String,
}

impl AggregateCall {
    pub fn new(
        function: impl Into<String>,
        column: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            function: function.into(),
            column: column.into(),
            alias: alias.into(),
        }
    }

    /// Parse `sum(bytes)` or `sum(bytes) as total`. Without an alias the
    /// output column is named `sum_bytes`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        let (call, alias) = match text.to_ascii_lowercase().find(" as ") {
            Some(pos) => (&text[..pos], Some(text[pos + 4..].trim())),
            None => (text, None),
        };
        let (function, rest) = call
            .split_once('(')
            .ok_or_else(|| format!("aggregate {text:?} is missing '('"))?;
        let column = rest
            .trim()
            .strip_suffix(')')
            .ok_or_else(|| format!("aggregate {text:?} is missing ')'"))?
            .trim();
        let function = function.trim().to_ascii_lowercase();
        if function.is_empty() || column.is_empty() {
            return Err(format!("aggregate {text:?} needs a function and a column"));
        }
        let alias = match alias {
            Some(a) if !a.is_empty() => a.to_string(),
            Some(_) => return Err(format!("aggregate {text:?} has an empty alias")),
            None => format!("{function}_{column}"),
        };
        Ok(Self::new(function, column, alias))
    }
}

impl fmt::Display for AggregateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) AS {}", self.function, self.column, self.alias)
    }
}

/// Assembles a [`FlowGraph`] together with the factories of its elements
/// and materializes it as a [`LocalFlow`].
///
/// Plan-time work happens in the builder: column names are resolved and
/// aggregate signatures type-checked when a node is added, so a built flow
/// never fails on schema errors.
pub struct FlowBuilder {
    description: String,
    graph: FlowGraph,
    factories: HashMap<NodeId, ElementFactory>,
    schemas: HashMap<NodeId, Arc<Schema>>,
    source_channel_capacity: Option<usize>,
}

impl FlowBuilder {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            graph: FlowGraph::new(),
            factories: HashMap::new(),
            schemas: HashMap::new(),
            source_channel_capacity: None,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// Decouple each source from its consumers with a bounded queue of
    /// `capacity`, drained by a dedicated pump thread.
    pub fn with_source_channels(mut self, capacity: usize) -> Self {
        self.source_channel_capacity = Some(capacity.max(1));
        self
    }

    /// Schema of the events node `id` emits, if it emits any.
    pub fn output_schema(&self, id: NodeId) -> Option<&Arc<Schema>> {
        self.schemas.get(&id)
    }

    /// Register a node and the factory that builds its element.
    pub fn add_element<F>(
        &mut self,
        kind: ElementKind,
        name: impl Into<String>,
        output: Option<Arc<Schema>>,
        factory: F,
    ) -> NodeId
    where
        F: FnOnce(ElementSetup) -> FlowResult<Box<dyn FlowElement>> + Send + 'static,
    {
        let id = self.graph.add_node(kind, name);
        self.factories.insert(id, Box::new(factory));
        if let Some(schema) = output {
            self.schemas.insert(id, schema);
        }
        id
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        self.graph.add_edge(from, to);
    }

    fn input_schema(&self, input: NodeId) -> FlowResult<Arc<Schema>> {
        self.schemas
            .get(&input)
            .cloned()
            .ok_or_else(|| FlowError::Graph(format!("node {input} has no output schema")))
    }

    /// A source fed by transport node `upstream`.
    pub fn source(
        &mut self,
        transport: Arc<dyn Transport>,
        registry: Arc<SourceRegistry>,
        upstream: &str,
        schema: Schema,
        options: SourceOptions,
    ) -> NodeId {
        let schema = Arc::new(schema);
        let upstream = upstream.to_string();
        let name = format!("source({upstream})");
        let output = Arc::clone(&schema);
        self.add_element(ElementKind::Source, name.clone(), Some(output), move |setup| {
            let flow_source_id = format!("{}:{}:{}", setup.flow_id, upstream, setup.node_id);
            let element: Box<dyn FlowElement> = Box::new(TransportSourceElement::new(
                name,
                upstream,
                flow_source_id,
                schema,
                options,
                transport,
                registry,
                setup.context,
            ));
            Ok(element)
        })
    }

    /// Keep only `columns` of `input`'s events.
    pub fn project(&mut self, input: NodeId, columns: &[&str]) -> FlowResult<NodeId> {
        let in_schema = self.input_schema(input)?;
        let indexes = resolve_columns(&in_schema, columns)?;
        let output = derive_schema(&in_schema, &indexes, Vec::new());
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let name = format!("project({})", columns.join(", "));

        let element_name = name.clone();
        let id = self.add_element(ElementKind::Projection, name, Some(output), move |setup| {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let element =
                ProjectionElement::new(element_name, &in_schema, &columns, setup.context)?;
            Ok(Box::new(element) as Box<dyn FlowElement>)
        });
        self.connect(input, id);
        Ok(id)
    }

    /// Windowed aggregation of `input`, grouped by `group_by`.
    ///
    /// Every call is resolved against the builtin functions and
    /// type-checked here.
    pub fn aggregate(
        &mut self,
        input: NodeId,
        group_by: &[&str],
        calls: &[AggregateCall],
        window: WindowSpec,
    ) -> FlowResult<NodeId> {
        window.validate().map_err(FlowError::Graph)?;
        let in_schema = self.input_schema(input)?;
        let group_indexes = resolve_columns(&in_schema, group_by)?;

        let mut aggregates = Vec::with_capacity(calls.len());
        for call in calls {
            let func = crate::builtins::lookup(&call.function)
                .ok_or_else(|| TypeError::UnknownFunction(call.function.clone()))?;
            aggregates.push(BoundAggregate::bind(
                func,
                &in_schema,
                &call.column,
                call.alias.clone(),
            )?);
        }

        let extra = aggregates
            .iter()
            .map(|a| TypedField::new(a.alias.clone(), a.return_type.clone()))
            .collect();
        let output = derive_schema(&in_schema, &group_indexes, extra);
        let calls_text: Vec<String> = calls.iter().map(ToString::to_string).collect();
        let name = format!("aggregate[{window}]({})", calls_text.join(", "));

        let group_by: Vec<String> = group_by.iter().map(|c| c.to_string()).collect();
        let element_name = name.clone();
        let id = self.add_element(ElementKind::Aggregation, name, Some(output), move |setup| {
            let group_by: Vec<&str> = group_by.iter().map(String::as_str).collect();
            let element = AggregationElement::new(
                element_name,
                &in_schema,
                &group_by,
                aggregates,
                window,
                setup.context,
            )?;
            Ok(Box::new(element) as Box<dyn FlowElement>)
        });
        self.connect(input, id);
        Ok(id)
    }

    /// Write `input`'s records to `writer`, one delimited line each.
    pub fn output(
        &mut self,
        input: NodeId,
        writer: Box<dyn Write + Send>,
        delimiter: char,
    ) -> NodeId {
        let id = self.add_element(ElementKind::Output, "output", None, move |_setup| {
            let element: Box<dyn FlowElement> =
                Box::new(OutputElement::new("output", writer, delimiter));
            Ok(element)
        });
        self.connect(input, id);
        id
    }

    /// Materialize the flow; events leaving the graph are discarded.
    pub fn build(self, flow_id: FlowId) -> FlowResult<LocalFlow> {
        self.build_into(flow_id, Arc::new(DiscardContext))
    }

    /// Materialize the flow, delivering whatever leaf elements emit to
    /// `terminal`.
    ///
    /// Elements are created downstream-first so each one is handed a
    /// context over elements that already exist.
    pub fn build_into(
        mut self,
        flow_id: FlowId,
        terminal: Arc<dyn FlowElementContext>,
    ) -> FlowResult<LocalFlow> {
        self.graph.validate()?;
        let order = topo_sort(&self.graph);
        let adj = downstream_map(&self.graph);

        let mut built: HashMap<NodeId, SharedElement> = HashMap::new();
        let mut channels = Vec::new();
        let mut pumps = Vec::new();

        for &node_id in order.iter().rev() {
            let mut targets: Vec<Arc<dyn FlowElementContext>> = adj
                .get(&node_id)
                .into_iter()
                .flatten()
                .filter_map(|id| built.get(id))
                .map(|el| Arc::new(DirectContext::new(Arc::clone(el))) as Arc<dyn FlowElementContext>)
                .collect();
            let mut context: Arc<dyn FlowElementContext> = if targets.len() > 1 {
                Arc::new(FanOutContext::new(targets))
            } else {
                targets.pop().unwrap_or_else(|| Arc::clone(&terminal))
            };

            let kind = self
                .graph
                .node(node_id)
                .map(|n| n.kind)
                .ok_or_else(|| FlowError::Graph(format!("unknown node {node_id}")))?;
            if let (ElementKind::Source, Some(capacity)) = (kind, self.source_channel_capacity) {
                let (channel, pump) = channel_context(capacity, context);
                let channel = Arc::new(channel);
                channels.push(Arc::clone(&channel));
                pumps.push(pump);
                context = channel as Arc<dyn FlowElementContext>;
            }

            let factory = self
                .factories
                .remove(&node_id)
                .ok_or_else(|| FlowError::Graph(format!("node {node_id} has no element")))?;
            let element = factory(ElementSetup {
                flow_id,
                node_id,
                context,
            })?;
            built.insert(node_id, shared(element));
        }

        let mut elements = Vec::with_capacity(order.len());
        for node_id in order {
            let (Some(element), Some(node)) = (built.remove(&node_id), self.graph.node(node_id))
            else {
                continue;
            };
            elements.push(FlowEntry {
                node_id,
                kind: node.kind,
                element,
            });
        }
        tracing::debug!("{flow_id} built with {} element(s)", elements.len());
        Ok(LocalFlow::new(
            flow_id,
            self.description,
            elements,
            channels,
            pumps,
        ))
    }
}
