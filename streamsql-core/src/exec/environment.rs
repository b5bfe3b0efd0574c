use super::*;

/// Reply to a submitted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySubmitResponse {
    /// Informational text for the client, if any.
    pub message: Option<String>,
    /// Set when the query started a flow.
    pub flow_id: Option<FlowId>,
}

impl QuerySubmitResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            flow_id: None,
        }
    }

    /// A bare acknowledgement that `flow_id` is running.
    pub fn started(flow_id: FlowId) -> Self {
        Self {
            message: None,
            flow_id: Some(flow_id),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Where queries are submitted.
pub trait ExecEnvironment {
    fn connect(&mut self) -> FlowResult<()>;

    fn submit_query(&mut self, text: &str) -> FlowResult<QuerySubmitResponse>;

    /// Stop every flow started through this environment.
    fn disconnect(&mut self) -> FlowResult<()>;
}

/// Outcome of planning one statement.
pub enum PlannedQuery {
    /// The statement was handled without starting a flow.
    Message(String),
    Flow(FlowBuilder),
}

/// Turns statement text into a plan. The SQL front end lives behind this
/// trait.
pub trait Planner: Send {
    fn plan(&mut self, text: &str) -> FlowResult<PlannedQuery>;
}

/// Runs flows in this process.
///
/// `SHOW FLOWS` and `DROP FLOW <id>` are answered directly; every other
/// statement goes to the [`Planner`].
pub struct LocalEnvironment<P: Planner> {
    planner: P,
    flows: BTreeMap<FlowId, LocalFlow>,
    next_flow_id: u64,
    connected: bool,
}

impl<P: Planner> LocalEnvironment<P> {
    pub fn new(planner: P) -> Self {
        Self {
            planner,
            flows: BTreeMap::new(),
            next_flow_id: 1,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn flow(&self, id: FlowId) -> Option<&LocalFlow> {
        self.flows.get(&id)
    }

    /// Ids of running flows, ascending.
    pub fn flow_ids(&self) -> Vec<FlowId> {
        self.flows.keys().copied().collect()
    }

    fn show_flows(&self) -> QuerySubmitResponse {
        if self.flows.is_empty() {
            return QuerySubmitResponse::message("no running flows");
        }
        let lines: Vec<String> = self
            .flows
            .values()
            .map(|f| format!("{}: {}", f.id(), f.description()))
            .collect();
        QuerySubmitResponse::message(lines.join("\n"))
    }

    fn drop_flow(&mut self, arg: &str) -> FlowResult<QuerySubmitResponse> {
        let id = arg
            .trim()
            .parse::<u64>()
            .map(FlowId::new)
            .map_err(|_| FlowError::Graph(format!("bad flow id {arg:?}")))?;
        let mut flow = self.flows.remove(&id).ok_or(FlowError::UnknownFlow(id))?;
        flow.close()?;
        Ok(QuerySubmitResponse::message(format!("dropped {id}")))
    }

    fn start(&mut self, builder: FlowBuilder) -> FlowResult<QuerySubmitResponse> {
        let id = FlowId::new(self.next_flow_id);
        self.next_flow_id += 1;
        let mut flow = builder.build(id)?;
        flow.open()?;
        let message = format!("started {id}: {}", flow.description());
        self.flows.insert(id, flow);
        Ok(QuerySubmitResponse::started(id).with_message(message))
    }
}

impl<P: Planner> ExecEnvironment for LocalEnvironment<P> {
    fn connect(&mut self) -> FlowResult<()> {
        self.connected = true;
        Ok(())
    }

    fn submit_query(&mut self, text: &str) -> FlowResult<QuerySubmitResponse> {
        if !self.connected {
            return Err(FlowError::Disconnected);
        }
        let statement = text.trim().trim_end_matches(';').trim();
        let words: Vec<&str> = statement.split_whitespace().collect();
        match words.as_slice() {
            [show, flows] if show.eq_ignore_ascii_case("show") && flows.eq_ignore_ascii_case("flows") => {
                Ok(self.show_flows())
            }
            [drop, flow, id]
                if drop.eq_ignore_ascii_case("drop") && flow.eq_ignore_ascii_case("flow") =>
            {
                self.drop_flow(id)
            }
            _ => match self.planner.plan(statement)? {
                PlannedQuery::Message(message) => Ok(QuerySubmitResponse::message(message)),
                PlannedQuery::Flow(builder) => self.start(builder),
            },
        }
    }

    fn disconnect(&mut self) -> FlowResult<()> {
        self.connected = false;
        let mut first_err = None;
        for (id, mut flow) in std::mem::take(&mut self.flows) {
            if let Err(err) = flow.close() {
                tracing::warn!("{id} failed to close on disconnect: {err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
