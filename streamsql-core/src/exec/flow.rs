use super::*;

/// One materialized element of a flow.
pub struct FlowEntry {
    pub node_id: NodeId,
    pub kind: ElementKind,
    pub element: SharedElement,
}

/// A materialized flow running in this process.
///
/// `open` opens elements downstream-first, so no element receives events
/// before its consumers are ready. `close` closes sources first to stop
/// input, drains any source queues, then closes the rest upstream-first.
pub struct LocalFlow {
    id: FlowId,
    description: String,
    /// Upstream first.
    elements: Vec<FlowEntry>,
    channels: Vec<Arc<ChannelContext>>,
    pumps: Vec<EventPump>,
    handles: Vec<JoinHandle<FlowResult<u64>>>,
    state: ElementState,
}

impl LocalFlow {
    pub(crate) fn new(
        id: FlowId,
        description: String,
        elements: Vec<FlowEntry>,
        channels: Vec<Arc<ChannelContext>>,
        pumps: Vec<EventPump>,
    ) -> Self {
        Self {
            id,
            description,
            elements,
            channels,
            pumps,
            handles: Vec::new(),
            state: ElementState::Created,
        }
    }

    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_open(&self) -> bool {
        self.state == ElementState::Open
    }

    pub fn elements(&self) -> &[FlowEntry] {
        &self.elements
    }

    /// Element names, upstream first.
    pub fn element_names(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter_map(|e| e.element.lock().ok().map(|el| el.name().to_string()))
            .collect()
    }

    pub fn open(&mut self) -> FlowResult<()> {
        match self.state {
            ElementState::Open => return Ok(()),
            ElementState::Closed => return Err(FlowError::Closed(self.id.to_string())),
            ElementState::Created => {}
        }

        for (i, pump) in std::mem::take(&mut self.pumps).into_iter().enumerate() {
            let handle = pump.spawn(&format!("{}-{i}", self.id.0))?;
            self.handles.push(handle);
        }

        let mut failure = None;
        for (opened, entry) in self.elements.iter().rev().enumerate() {
            let result = entry
                .element
                .lock()
                .map_err(FlowError::from)
                .and_then(|mut el| el.open());
            if let Err(err) = result {
                tracing::warn!("{} failed to open node {}: {err}", self.id, entry.node_id);
                failure = Some((opened, err));
                break;
            }
        }
        if let Some((opened, err)) = failure {
            // Roll back the elements already opened plus the failed one.
            let start = self.elements.len() - (opened + 1);
            let rollback: Vec<usize> = (start..self.elements.len()).collect();
            self.state = ElementState::Closed;
            if let Err(close_err) = self.close_entries(&rollback) {
                tracing::warn!("{} rollback after failed open: {close_err}", self.id);
            }
            if let Err(pump_err) = self.shutdown_pumps() {
                tracing::warn!("{} rollback after failed open: {pump_err}", self.id);
            }
            return Err(err);
        }

        self.state = ElementState::Open;
        tracing::info!("{} opened: {}", self.id, self.description);
        Ok(())
    }

    /// Close every element. Never stops at the first failure; interrupts
    /// are logged, and the first other failure is returned.
    pub fn close(&mut self) -> FlowResult<()> {
        if self.state == ElementState::Closed {
            return Ok(());
        }
        self.state = ElementState::Closed;

        let (sources, rest): (Vec<usize>, Vec<usize>) =
            (0..self.elements.len()).partition(|&i| self.elements[i].kind == ElementKind::Source);

        let mut first_err = self.close_entries(&sources).err();
        if let Err(err) = self.shutdown_pumps() {
            first_err.get_or_insert(err);
        }
        if let Err(err) = self.close_entries(&rest) {
            first_err.get_or_insert(err);
        }
        tracing::info!("{} closed", self.id);
        first_err.map_or(Ok(()), Err)
    }

    fn close_entries(&self, indexes: &[usize]) -> FlowResult<()> {
        let mut first_err = None;
        for &i in indexes {
            let entry = &self.elements[i];
            let result = entry
                .element
                .lock()
                .map_err(FlowError::from)
                .and_then(|mut el| el.close());
            match result {
                Ok(()) => {}
                Err(err) if err.is_interrupted() => {
                    tracing::warn!("{} node {} close interrupted: {err}", self.id, entry.node_id);
                }
                Err(err) => {
                    tracing::warn!("{} node {} failed to close: {err}", self.id, entry.node_id);
                    first_err.get_or_insert(err);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Disconnect source queues and wait for their pumps to drain.
    fn shutdown_pumps(&mut self) -> FlowResult<()> {
        for channel in &self.channels {
            channel.disconnect();
        }
        let mut first_err = None;
        for handle in self.handles.drain(..) {
            match handle.join() {
                Ok(Ok(forwarded)) => {
                    tracing::debug!("{} pump finished after {forwarded} element(s)", self.id);
                }
                Ok(Err(err)) => {
                    tracing::warn!("{} pump failed: {err}", self.id);
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    tracing::warn!("{} event pump panicked", self.id);
                    first_err.get_or_insert(FlowError::Interrupted(format!(
                        "{} event pump panicked",
                        self.id
                    )));
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for LocalFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFlow")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("elements", &self.elements.len())
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for LocalFlow {
    fn drop(&mut self) {
        if self.state == ElementState::Open {
            if let Err(err) = self.close() {
                tracing::warn!("{} close on drop failed: {err}", self.id);
            }
        }
    }
}
