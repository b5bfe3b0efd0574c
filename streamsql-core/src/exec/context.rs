use super::*;

/// Default capacity of a [`ChannelContext`] queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The sole path by which an element hands elements to its downstream
/// consumer(s). Every context preserves emission order per consumer.
pub trait FlowElementContext: Send + Sync {
    fn emit(&self, element: StreamElement<Event>) -> FlowResult<()>;
}

// ── DirectContext ─────────────────────────────────────────────────────────────

/// Synchronous hand-off to a single downstream element, under its lock.
pub struct DirectContext {
    target: SharedElement,
}

impl DirectContext {
    pub fn new(target: SharedElement) -> Self {
        Self { target }
    }
}

impl FlowElementContext for DirectContext {
    fn emit(&self, element: StreamElement<Event>) -> FlowResult<()> {
        self.target.lock()?.take_event(element)
    }
}

// ── FanOutContext ─────────────────────────────────────────────────────────────

/// Delivers every element to each of several contexts, in order.
/// Events are shared, so the copies are cheap.
pub struct FanOutContext {
    targets: Vec<Arc<dyn FlowElementContext>>,
}

impl FanOutContext {
    pub fn new(targets: Vec<Arc<dyn FlowElementContext>>) -> Self {
        Self { targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl FlowElementContext for FanOutContext {
    fn emit(&self, element: StreamElement<Event>) -> FlowResult<()> {
        let Some((last, rest)) = self.targets.split_last() else {
            return Ok(());
        };
        for target in rest {
            target.emit(element.clone())?;
        }
        last.emit(element)
    }
}

// ── ChannelContext / EventPump ────────────────────────────────────────────────

/// Producer side of a bounded queue between two threads.
///
/// `emit` blocks while the queue is full, so a slow consumer throttles the
/// producer.
pub struct ChannelContext {
    sender: Mutex<Option<Sender<StreamElement<Event>>>>,
}

impl ChannelContext {
    /// Drop the sending side. The pump drains what is queued and stops.
    pub fn disconnect(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}

impl FlowElementContext for ChannelContext {
    fn emit(&self, element: StreamElement<Event>) -> FlowResult<()> {
        let sender = self.sender.lock()?.clone().ok_or(FlowError::Disconnected)?;
        sender.send(element).map_err(|_| FlowError::Disconnected)
    }
}

/// Consumer side of a [`ChannelContext`]: forwards queued elements to the
/// downstream context on whichever thread runs it.
pub struct EventPump {
    receiver: Receiver<StreamElement<Event>>,
    target: Arc<dyn FlowElementContext>,
}

impl EventPump {
    /// Forward elements until `End` has been delivered or the producer
    /// disconnects. Returns the number of elements forwarded.
    pub fn run(self) -> FlowResult<u64> {
        let mut forwarded = 0;
        while let Ok(element) = self.receiver.recv() {
            let end = matches!(element, StreamElement::End);
            self.target.emit(element)?;
            forwarded += 1;
            if end {
                break;
            }
        }
        Ok(forwarded)
    }

    /// Run the pump on a new thread named `name`.
    pub fn spawn(self, name: &str) -> FlowResult<JoinHandle<FlowResult<u64>>> {
        std::thread::Builder::new()
            .name(format!("pump-{name}"))
            .spawn(move || self.run())
            .map_err(FlowError::from)
    }
}

/// Create a bounded channel whose consumer feeds `target`.
pub fn channel_context(
    capacity: usize,
    target: Arc<dyn FlowElementContext>,
) -> (ChannelContext, EventPump) {
    let (sender, receiver) = bounded(capacity);
    (
        ChannelContext {
            sender: Mutex::new(Some(sender)),
        },
        EventPump { receiver, target },
    )
}

// ── Terminal contexts ─────────────────────────────────────────────────────────

/// Records everything emitted to it.
#[derive(Default)]
pub struct CollectingContext {
    elements: Mutex<Vec<StreamElement<Event>>>,
}

impl CollectingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far, in order.
    pub fn elements(&self) -> Vec<StreamElement<Event>> {
        self.elements
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Only the records emitted so far.
    pub fn records(&self) -> Vec<Event> {
        self.elements()
            .into_iter()
            .filter_map(|e| match e {
                StreamElement::Record(ev) => Some(ev),
                _ => None,
            })
            .collect()
    }

    /// Whether an `End` marker has arrived.
    pub fn is_finished(&self) -> bool {
        self.elements()
            .iter()
            .any(|e| matches!(e, StreamElement::End))
    }
}

impl FlowElementContext for CollectingContext {
    fn emit(&self, element: StreamElement<Event>) -> FlowResult<()> {
        self.elements.lock()?.push(element);
        Ok(())
    }
}

/// Context for elements without a consumer; drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardContext;

impl FlowElementContext for DiscardContext {
    fn emit(&self, _element: StreamElement<Event>) -> FlowResult<()> {
        Ok(())
    }
}
