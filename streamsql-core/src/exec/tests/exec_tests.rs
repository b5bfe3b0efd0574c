use super::*;
use crate::types::Watermark;

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn schema(decl: &str) -> Arc<Schema> {
    Arc::new(Schema::parse_columns(decl).unwrap())
}

fn record(schema: &Arc<Schema>, values: Vec<Value>, ts: EventTime) -> StreamElement<Event> {
    StreamElement::Record(Event::new(Arc::clone(schema), values, ts))
}

fn collector() -> Arc<CollectingContext> {
    Arc::new(CollectingContext::new())
}

/// Element that records its lifecycle calls into a shared log.
struct Probe {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    fail_open: bool,
    close_error: Option<FlowError>,
}

impl Probe {
    fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            fail_open: false,
            close_error: None,
        }
    }

    fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    fn failing_close(mut self, err: FlowError) -> Self {
        self.close_error = Some(err);
        self
    }
}

impl FlowElement for Probe {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> FlowResult<()> {
        self.log.lock().unwrap().push(format!("open:{}", self.name));
        if self.fail_open {
            return Err(FlowError::io("refused"));
        }
        Ok(())
    }

    fn take_event(&mut self, _element: StreamElement<Event>) -> FlowResult<()> {
        self.log.lock().unwrap().push(format!("event:{}", self.name));
        Ok(())
    }

    fn close(&mut self) -> FlowResult<()> {
        self.log.lock().unwrap().push(format!("close:{}", self.name));
        self.close_error.take().map_or(Ok(()), Err)
    }
}

/// Transport that only records fan-out changes.
#[derive(Default)]
struct FakeTransport {
    attached: Mutex<Vec<String>>,
    detached: Mutex<Vec<String>>,
    fail_attach: bool,
}

impl Transport for FakeTransport {
    fn attach_fan_out(&self, upstream: &str, flow_source_id: &str) -> FlowResult<()> {
        if self.fail_attach {
            return Err(FlowError::io("attach refused"));
        }
        self.attached
            .lock()
            .unwrap()
            .push(format!("{upstream}->{flow_source_id}"));
        Ok(())
    }

    fn detach_fan_out(&self, upstream: &str, flow_source_id: &str) -> FlowResult<()> {
        self.detached
            .lock()
            .unwrap()
            .push(format!("{upstream}->{flow_source_id}"));
        Ok(())
    }
}

/// Cloneable in-memory writer.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `f` with log output captured into the returned buffer.
fn with_captured_logs<T>(f: impl FnOnce() -> T) -> (T, SharedBuf) {
    let logs = SharedBuf::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, logs)
}

/// Terminal context that blows up on the first element.
struct PanickingContext;

impl FlowElementContext for PanickingContext {
    fn emit(&self, _element: StreamElement<Event>) -> FlowResult<()> {
        panic!("terminal rejected element");
    }
}

fn source_element(
    transport: Arc<FakeTransport>,
    registry: &Arc<SourceRegistry>,
) -> TransportSourceElement {
    TransportSourceElement::new(
        "source(metrics)",
        "metrics",
        "flow[1]:metrics:0",
        schema("host:string, v:int"),
        SourceOptions::default(),
        transport,
        Arc::clone(registry),
        collector(),
    )
}

// ── Contexts ──────────────────────────────────────────────────────────────────

#[test]
fn test_direct_context_hands_event_to_target() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let target = shared(Box::new(Probe::new("p", &log)));
    let ctx = DirectContext::new(Arc::clone(&target));

    ctx.emit(StreamElement::End).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["event:p".to_string()]);
}

#[test]
fn test_fan_out_delivers_to_every_target_in_order() {
    let s = schema("v:int");
    let a = collector();
    let b = collector();
    let fan_out = FanOutContext::new(vec![
        Arc::clone(&a) as Arc<dyn FlowElementContext>,
        Arc::clone(&b) as Arc<dyn FlowElementContext>,
    ]);
    assert_eq!(fan_out.len(), 2);

    fan_out.emit(record(&s, vec![Value::Int(1)], 1)).unwrap();
    fan_out.emit(StreamElement::End).unwrap();

    for ctx in [&a, &b] {
        let elements = ctx.elements();
        assert_eq!(elements.len(), 2);
        assert_eq!(ctx.records()[0].values(), &[Value::Int(1)]);
        assert!(ctx.is_finished());
    }
}

#[test]
fn test_empty_fan_out_is_a_no_op() {
    let fan_out = FanOutContext::new(Vec::new());
    assert!(fan_out.is_empty());
    fan_out.emit(StreamElement::End).unwrap();
}

#[test]
fn test_channel_pump_forwards_until_end() {
    let s = schema("v:int");
    let sink = collector();
    let (ctx, pump) = channel_context(2, Arc::clone(&sink) as Arc<dyn FlowElementContext>);
    let handle = pump.spawn("test").unwrap();

    for i in 0..5 {
        ctx.emit(record(&s, vec![Value::Int(i)], i64::from(i))).unwrap();
    }
    ctx.emit(StreamElement::End).unwrap();

    assert_eq!(handle.join().unwrap().unwrap(), 6);
    let values: Vec<Value> = sink
        .records()
        .iter()
        .map(|e| e.values()[0].clone())
        .collect();
    assert_eq!(values, (0..5).map(Value::Int).collect::<Vec<_>>());
    assert!(sink.is_finished());
}

#[test]
fn test_channel_disconnect_stops_pump_and_rejects_emits() {
    let sink = collector();
    let (ctx, pump) = channel_context(4, Arc::clone(&sink) as Arc<dyn FlowElementContext>);
    ctx.disconnect();

    assert!(matches!(
        ctx.emit(StreamElement::End),
        Err(FlowError::Disconnected)
    ));
    assert_eq!(pump.run().unwrap(), 0);
    assert!(sink.elements().is_empty());
}

// ── Registry and transport ────────────────────────────────────────────────────

#[test]
fn test_transport_delivers_parses_and_emits_watermarks() {
    let registry = Arc::new(SourceRegistry::new());
    let transport = LocalTransport::new(Arc::clone(&registry));
    transport.create_node("metrics").unwrap();

    let sink = collector();
    let binding = SourceBinding::new(
        schema("host:string, v:int"),
        Box::new(DelimitedEventParser::new()),
        Arc::clone(&sink) as Arc<dyn FlowElementContext>,
    );
    registry.bind("f:metrics:0", binding).unwrap();
    transport.attach_fan_out("metrics", "f:metrics:0").unwrap();
    assert_eq!(transport.fan_out_of("metrics"), vec!["f:metrics:0"]);

    assert_eq!(transport.send("metrics", RawEvent::new("web,5", 1000)).unwrap(), 1);
    // Older timestamp: no new watermark.
    assert_eq!(transport.send("metrics", RawEvent::new("web,7", 500)).unwrap(), 1);
    // Unparseable for this flow: skipped, but still in the node's log.
    assert_eq!(transport.send("metrics", RawEvent::new("web,oops", 2000)).unwrap(), 0);
    transport.finish("metrics").unwrap();

    let elements = sink.elements();
    assert_eq!(elements.len(), 4);
    assert_eq!(
        elements[0].as_record().unwrap().values(),
        &[Value::String("web".into()), Value::Int(5)]
    );
    assert_eq!(elements[1], StreamElement::Watermark(Watermark::new(1000)));
    assert_eq!(elements[2].as_record().unwrap().timestamp(), 500);
    assert_eq!(elements[3], StreamElement::End);
    assert_eq!(transport.delivered("metrics").len(), 3);
}

#[test]
fn test_binding_reads_event_time_from_column() {
    let registry = SourceRegistry::new();
    let sink = collector();
    let binding = SourceBinding::new(
        schema("host:string, ts:timestamp"),
        Box::new(DelimitedEventParser::new()),
        Arc::clone(&sink) as Arc<dyn FlowElementContext>,
    )
    .with_timestamp_column(1);
    registry.bind("src", binding).unwrap();

    registry.deliver("src", &RawEvent::new("a,5000", 1)).unwrap();
    assert_eq!(sink.records()[0].timestamp(), 5000);
}

#[test]
fn test_null_event_time_skips_the_record() {
    let registry = Arc::new(SourceRegistry::new());
    let transport = LocalTransport::new(Arc::clone(&registry));
    transport.create_node("clicks").unwrap();

    let sink = collector();
    let binding = SourceBinding::new(
        schema("host:string, ts:timestamp?"),
        Box::new(DelimitedEventParser::new()),
        Arc::clone(&sink) as Arc<dyn FlowElementContext>,
    )
    .with_timestamp_column(1);
    registry.bind("src", binding).unwrap();
    transport.attach_fan_out("clicks", "src").unwrap();

    assert_eq!(transport.send("clicks", RawEvent::new("a,5000", 1)).unwrap(), 1);
    // An empty event time must not fall back to the ingestion time.
    assert_eq!(
        transport.send("clicks", RawEvent::new("b,", 1_700_000_000_000)).unwrap(),
        0
    );
    assert!(matches!(
        registry.deliver("src", &RawEvent::new("c,", 2)),
        Err(FlowError::Record {
            error: ColumnParseError::MissingTimestamp { column: 1 },
            ..
        })
    ));
    assert_eq!(transport.send("clicks", RawEvent::new("d,6000", 3)).unwrap(), 1);

    let elements = sink.elements();
    let timestamps: Vec<EventTime> = elements
        .iter()
        .filter_map(|e| e.as_record().map(Event::timestamp))
        .collect();
    let watermarks: Vec<EventTime> = elements
        .iter()
        .filter_map(|e| match e {
            StreamElement::Watermark(wm) => Some(wm.timestamp),
            _ => None,
        })
        .collect();
    assert_eq!(timestamps, vec![5000, 6000]);
    assert_eq!(watermarks, vec![5000, 6000]);
}

#[test]
fn test_failing_flow_does_not_starve_other_flows() {
    let registry = Arc::new(SourceRegistry::new());
    let transport = LocalTransport::new(Arc::clone(&registry));
    transport.create_node("n").unwrap();

    // "a:n:0" sorts first in the fan-out set and can no longer emit.
    let healthy = collector();
    let (broken, _pump) =
        channel_context(4, Arc::clone(&healthy) as Arc<dyn FlowElementContext>);
    broken.disconnect();
    for (id, context) in [
        ("a:n:0", Arc::new(broken) as Arc<dyn FlowElementContext>),
        ("b:n:0", Arc::clone(&healthy) as Arc<dyn FlowElementContext>),
    ] {
        let binding = SourceBinding::new(
            schema("v:int"),
            Box::new(DelimitedEventParser::new()),
            context,
        );
        registry.bind(id, binding).unwrap();
        transport.attach_fan_out("n", id).unwrap();
    }

    assert!(matches!(
        transport.send("n", RawEvent::new("7", 1)),
        Err(FlowError::Disconnected)
    ));
    assert!(matches!(transport.finish("n"), Err(FlowError::Disconnected)));

    assert_eq!(healthy.records().len(), 1);
    assert_eq!(healthy.records()[0].values(), &[Value::Int(7)]);
    assert!(healthy.is_finished());
    assert_eq!(transport.delivered("n").len(), 1);
}

#[test]
fn test_registry_bind_and_unbind() {
    let registry = SourceRegistry::new();
    let make = || {
        SourceBinding::new(
            schema("v:int"),
            Box::new(DelimitedEventParser::new()),
            Arc::new(DiscardContext),
        )
    };
    registry.bind("b", make()).unwrap();
    registry.bind("a", make()).unwrap();
    assert!(matches!(
        registry.bind("a", make()),
        Err(FlowError::DuplicateSource(id)) if id == "a"
    ));
    assert_eq!(registry.ids(), vec!["a", "b"]);

    assert!(registry.unbind("a").unwrap());
    assert!(!registry.unbind("a").unwrap());
    assert!(!registry.is_bound("a"));
    assert!(matches!(
        registry.deliver("a", &RawEvent::new("1", 0)),
        Err(FlowError::UnknownSource(_))
    ));
}

#[test]
fn test_unknown_transport_node() {
    let transport = LocalTransport::new(Arc::new(SourceRegistry::new()));
    assert!(matches!(
        transport.send("nowhere", RawEvent::new("1", 0)),
        Err(FlowError::Io(_))
    ));
    assert!(transport.attach_fan_out("nowhere", "x").is_err());
}

// ── Source element ────────────────────────────────────────────────────────────

#[test]
fn test_source_lifecycle_is_idempotent() {
    let registry = Arc::new(SourceRegistry::new());
    let transport = Arc::new(FakeTransport::default());
    let mut source = source_element(Arc::clone(&transport), &registry);
    assert!(source.is_source());

    source.open().unwrap();
    source.open().unwrap();
    assert!(registry.is_bound("flow[1]:metrics:0"));
    assert_eq!(transport.attached.lock().unwrap().len(), 1);

    source.close().unwrap();
    source.close().unwrap();
    assert!(!registry.is_bound("flow[1]:metrics:0"));
    assert_eq!(
        *transport.detached.lock().unwrap(),
        vec!["metrics->flow[1]:metrics:0".to_string()]
    );

    assert!(matches!(source.open(), Err(FlowError::Closed(_))));
}

#[test]
fn test_failed_attach_unbinds() {
    let registry = Arc::new(SourceRegistry::new());
    let transport = Arc::new(FakeTransport {
        fail_attach: true,
        ..FakeTransport::default()
    });
    let mut source = source_element(Arc::clone(&transport), &registry);

    assert!(matches!(source.open(), Err(FlowError::Io(_))));
    assert!(registry.ids().is_empty());

    source.close().unwrap();
    assert!(transport.detached.lock().unwrap().is_empty());
}

#[test]
fn test_source_with_unknown_timestamp_column_fails_to_open() {
    let registry = Arc::new(SourceRegistry::new());
    let transport = Arc::new(FakeTransport::default());
    let mut source = TransportSourceElement::new(
        "source(metrics)",
        "metrics",
        "flow[1]:metrics:0",
        schema("v:int"),
        SourceOptions::default().with_timestamp_column("ts"),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&registry),
        collector(),
    );
    assert!(matches!(
        source.open(),
        Err(FlowError::Type(TypeError::UnknownColumn(c))) if c == "ts"
    ));
    assert!(transport.attached.lock().unwrap().is_empty());
}

#[test]
#[should_panic(expected = "transport source")]
fn test_source_rejects_upstream_events() {
    let registry = Arc::new(SourceRegistry::new());
    let mut source = source_element(Arc::new(FakeTransport::default()), &registry);
    let _ = source.take_event(StreamElement::End);
}

#[test]
fn test_source_options_from_config() {
    let mut config = EngineConfig::default();
    config.parser.delimiter = '|';
    config.source.max_out_of_orderness_ms = 250;

    let options = SourceOptions::from_config(&config);
    assert_eq!(options.delimiter, '|');
    assert_eq!(options.max_out_of_orderness, Duration::from_millis(250));
    assert_eq!(options.timestamp_column, None);
}

// ── Projection / aggregation / output ─────────────────────────────────────────

#[test]
fn test_projection_reorders_columns_and_passes_control() {
    let input = schema("host:string, v:int, up:bool");
    let sink = collector();
    let mut projection =
        ProjectionElement::new("project", &input, &["v", "host"], sink.clone()).unwrap();
    assert_eq!(projection.output_schema().fields()[0].name, "v");

    projection.open().unwrap();
    projection
        .take_event(record(
            &input,
            vec![Value::String("web".into()), Value::Int(5), Value::Boolean(true)],
            42,
        ))
        .unwrap();
    projection.take_event(StreamElement::watermark(42)).unwrap();

    let out = sink.records();
    assert_eq!(out[0].values(), &[Value::Int(5), Value::String("web".into())]);
    assert_eq!(out[0].timestamp(), 42);
    assert_eq!(sink.elements()[1], StreamElement::watermark(42));
}

#[test]
fn test_projection_unknown_column() {
    let input = schema("v:int");
    let err = ProjectionElement::new("p", &input, &["nope"], collector()).err();
    assert!(matches!(
        err,
        Some(FlowError::Type(TypeError::UnknownColumn(c))) if c == "nope"
    ));
}

#[test]
fn test_closed_element_rejects_events() {
    let input = schema("v:int");
    let mut projection = ProjectionElement::new("p", &input, &["v"], collector()).unwrap();
    projection.open().unwrap();
    projection.close().unwrap();
    assert!(matches!(
        projection.take_event(StreamElement::End),
        Err(FlowError::Closed(name)) if name == "p"
    ));
}

fn sum_per_host(input: &Schema, sink: Arc<CollectingContext>) -> AggregationElement {
    let sum = crate::builtins::lookup("sum").unwrap();
    let aggregates = vec![BoundAggregate::bind(sum, input, "v", "total").unwrap()];
    AggregationElement::new(
        "aggregate",
        input,
        &["host"],
        aggregates,
        WindowSpec::Tumbling { size_ms: 10 },
        sink,
    )
    .unwrap()
}

#[test]
fn test_aggregation_fires_on_watermark() {
    let input = schema("host:string, v:int?");
    let sink = collector();
    let mut agg = sum_per_host(&input, sink.clone());
    let names: Vec<&str> = agg
        .output_schema()
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["host", "total"]);

    agg.open().unwrap();
    let row = |host: &str, v: i32, ts| record(&input, vec![Value::from(host), Value::Int(v)], ts);
    agg.take_event(row("web", 1, 1)).unwrap();
    agg.take_event(row("db", 2, 3)).unwrap();
    agg.take_event(row("web", 4, 8)).unwrap();
    assert!(sink.elements().is_empty());

    agg.take_event(StreamElement::watermark(9)).unwrap();
    let elements = sink.elements();
    assert_eq!(elements.len(), 3);
    let rows: Vec<&[Value]> = elements
        .iter()
        .filter_map(|e| e.as_record().map(|r| r.values()))
        .collect();
    assert_eq!(
        rows,
        vec![
            &[Value::from("db"), Value::BigInt(2)][..],
            &[Value::from("web"), Value::BigInt(5)][..],
        ]
    );
    assert_eq!(elements[0].as_record().unwrap().timestamp(), 9);
    assert_eq!(elements[2], StreamElement::watermark(9));

    // Behind the watermark: dropped.
    agg.take_event(row("web", 9, 2)).unwrap();
    assert_eq!(agg.late_records(), 1);
}

#[test]
fn test_aggregation_flushes_on_end() {
    let input = schema("host:string, v:int?");
    let sink = collector();
    let mut agg = sum_per_host(&input, sink.clone());
    agg.open().unwrap();
    agg.take_event(record(&input, vec![Value::from("web"), Value::Null], 15))
        .unwrap();
    agg.take_event(StreamElement::End).unwrap();

    let elements = sink.elements();
    assert_eq!(elements.len(), 2);
    let row = elements[0].as_record().unwrap();
    assert_eq!(row.values(), &[Value::from("web"), Value::BigInt(0)]);
    assert_eq!(row.timestamp(), 19);
    assert_eq!(elements[1], StreamElement::End);
}

#[test]
fn test_output_writes_delimited_lines() {
    let input = schema("host:string, v:int?");
    let buf = SharedBuf::default();
    let mut output = OutputElement::new("out", Box::new(buf.clone()), '|');
    output.open().unwrap();
    output
        .take_event(record(&input, vec![Value::from("web"), Value::Int(3)], 0))
        .unwrap();
    output
        .take_event(record(&input, vec![Value::from("db"), Value::Null], 0))
        .unwrap();
    output.take_event(StreamElement::watermark(1)).unwrap();
    output.take_event(StreamElement::End).unwrap();
    output.close().unwrap();

    assert_eq!(output.written(), 2);
    assert_eq!(buf.contents(), "web|3\ndb|\n");
}

// ── Builder and flows ─────────────────────────────────────────────────────────

#[test]
fn test_aggregate_call_parse() {
    assert_eq!(
        AggregateCall::parse("SUM(bytes)").unwrap(),
        AggregateCall::new("sum", "bytes", "sum_bytes")
    );
    assert_eq!(
        AggregateCall::parse(" max( latency ) AS worst ").unwrap(),
        AggregateCall::new("max", "latency", "worst")
    );
    assert_eq!(
        AggregateCall::parse("count(v) as n").unwrap().to_string(),
        "count(v) AS n"
    );
    assert!(AggregateCall::parse("sum bytes").is_err());
    assert!(AggregateCall::parse("sum(bytes").is_err());
    assert!(AggregateCall::parse("(bytes)").is_err());
    assert!(AggregateCall::parse("sum(bytes) as ").is_err());
}

fn metrics_transport() -> (Arc<SourceRegistry>, Arc<LocalTransport>) {
    let registry = Arc::new(SourceRegistry::new());
    let transport = Arc::new(LocalTransport::new(Arc::clone(&registry)));
    transport.create_node("metrics").unwrap();
    (registry, transport)
}

fn metrics_schema() -> Schema {
    Schema::parse_columns("host:string, v:int, ts:timestamp").unwrap()
}

#[test]
fn test_flow_end_to_end() {
    let (registry, transport) = metrics_transport();
    let buf = SharedBuf::default();

    let mut builder = FlowBuilder::new("sum per host");
    let src = builder.source(
        transport.clone(),
        Arc::clone(&registry),
        "metrics",
        metrics_schema(),
        SourceOptions::default().with_timestamp_column("ts"),
    );
    let agg = builder
        .aggregate(
            src,
            &["host"],
            &[AggregateCall::parse("sum(v) as total").unwrap()],
            WindowSpec::Tumbling { size_ms: 10 },
        )
        .unwrap();
    builder.output(agg, Box::new(buf.clone()), ',');

    let mut flow = builder.build(FlowId::new(1)).unwrap();
    assert_eq!(
        flow.element_names(),
        vec![
            "source(metrics)",
            "aggregate[tumbling:10ms](sum(v) AS total)",
            "output"
        ]
    );
    flow.open().unwrap();
    assert!(flow.is_open());
    assert_eq!(registry.ids(), vec!["flow[1]:metrics:0"]);
    assert_eq!(transport.fan_out_of("metrics"), vec!["flow[1]:metrics:0"]);

    for line in ["web,1,1", "web,2,5", "db,3,7", "web,4,12"] {
        assert_eq!(transport.send("metrics", RawEvent::new(line, 0)).unwrap(), 1);
    }
    transport.finish("metrics").unwrap();
    flow.close().unwrap();

    assert_eq!(buf.contents(), "db,3\nweb,3\nweb,4\n");
    assert!(registry.ids().is_empty());
    assert!(transport.fan_out_of("metrics").is_empty());
}

#[test]
fn test_flow_with_source_channels() {
    let (registry, transport) = metrics_transport();
    let sink = collector();

    let mut builder = FlowBuilder::new("hosts").with_source_channels(4);
    let src = builder.source(
        transport.clone(),
        Arc::clone(&registry),
        "metrics",
        metrics_schema(),
        SourceOptions::default(),
    );
    let proj = builder.project(src, &["host"]).unwrap();
    assert_eq!(builder.output_schema(proj).unwrap().len(), 1);

    let mut flow = builder
        .build_into(FlowId::new(7), sink.clone())
        .unwrap();
    flow.open().unwrap();
    transport.send("metrics", RawEvent::new("web,1,1", 10)).unwrap();
    transport.send("metrics", RawEvent::new("db,2,2", 20)).unwrap();
    transport.finish("metrics").unwrap();
    flow.close().unwrap();

    let hosts: Vec<Value> = sink
        .records()
        .iter()
        .map(|e| e.values()[0].clone())
        .collect();
    assert_eq!(hosts, vec![Value::from("web"), Value::from("db")]);
    assert!(sink.is_finished());
}

#[test]
fn test_builder_rejects_bad_aggregates() {
    let (registry, transport) = metrics_transport();
    let mut builder = FlowBuilder::new("bad");
    let src = builder.source(
        transport,
        registry,
        "metrics",
        metrics_schema(),
        SourceOptions::default(),
    );
    let window = WindowSpec::Tumbling { size_ms: 10 };

    let unknown = builder.aggregate(src, &[], &[AggregateCall::new("median", "v", "m")], window);
    assert!(matches!(
        unknown,
        Err(FlowError::Type(TypeError::UnknownFunction(f))) if f == "median"
    ));

    let on_string = builder.aggregate(src, &[], &[AggregateCall::new("sum", "host", "s")], window);
    assert!(matches!(
        on_string,
        Err(FlowError::Type(TypeError::ConstraintViolation { .. }))
    ));

    let bad_window = builder.aggregate(src, &[], &[], WindowSpec::Count { size: 0 });
    assert!(matches!(bad_window, Err(FlowError::Graph(_))));
}

/// Three probes in a chain: `src -> mid -> out`.
fn probe_flow(mid: Probe, log: &Arc<Mutex<Vec<String>>>) -> LocalFlow {
    let s = schema("v:int");
    let mut builder = FlowBuilder::new("probes");
    let src_probe = Probe::new("src", log);
    let out_probe = Probe::new("out", log);
    let src = builder.add_element(ElementKind::Source, "src", Some(s.clone()), move |_| {
        Ok(Box::new(src_probe) as Box<dyn FlowElement>)
    });
    let mid_id = builder.add_element(ElementKind::Projection, "mid", Some(s), move |_| {
        Ok(Box::new(mid) as Box<dyn FlowElement>)
    });
    let out = builder.add_element(ElementKind::Output, "out", None, move |_| {
        Ok(Box::new(out_probe) as Box<dyn FlowElement>)
    });
    builder.connect(src, mid_id);
    builder.connect(mid_id, out);
    builder.build(FlowId::new(1)).unwrap()
}

#[test]
fn test_flow_opens_downstream_first_and_closes_sources_first() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut flow = probe_flow(Probe::new("mid", &log), &log);

    flow.open().unwrap();
    flow.close().unwrap();
    flow.close().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "open:out", "open:mid", "open:src", "close:src", "close:mid", "close:out"
        ]
    );
    assert!(!flow.is_open());
}

#[test]
fn test_flow_open_failure_rolls_back() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut flow = probe_flow(Probe::new("mid", &log).failing_open(), &log);

    assert!(matches!(flow.open(), Err(FlowError::Io(_))));
    assert_eq!(
        *log.lock().unwrap(),
        vec!["open:out", "open:mid", "close:mid", "close:out"]
    );
    assert!(matches!(flow.open(), Err(FlowError::Closed(_))));
}

#[test]
fn test_rollback_failures_are_logged() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let s = schema("v:int");
    let mut builder = FlowBuilder::new("probes");
    let src_probe = Probe::new("src", &log);
    let mid_probe = Probe::new("mid", &log).failing_open();
    let out_probe = Probe::new("out", &log).failing_close(FlowError::io("detach failed"));
    let src = builder.add_element(ElementKind::Source, "src", Some(s.clone()), move |_| {
        Ok(Box::new(src_probe) as Box<dyn FlowElement>)
    });
    let mid = builder.add_element(ElementKind::Projection, "mid", Some(s), move |_| {
        Ok(Box::new(mid_probe) as Box<dyn FlowElement>)
    });
    let out = builder.add_element(ElementKind::Output, "out", None, move |_| {
        Ok(Box::new(out_probe) as Box<dyn FlowElement>)
    });
    builder.connect(src, mid);
    builder.connect(mid, out);
    let mut flow = builder.build(FlowId::new(2)).unwrap();

    let (result, logs) = with_captured_logs(|| flow.open());
    assert!(matches!(result, Err(FlowError::Io(_))));
    let logs = logs.contents();
    assert!(logs.contains("flow[2] rollback after failed open"), "{logs}");
    assert!(logs.contains("detach failed"), "{logs}");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["open:out", "open:mid", "close:mid", "close:out"]
    );
}

#[test]
fn test_pump_panic_is_logged_and_reported() {
    let (registry, transport) = metrics_transport();
    let mut builder = FlowBuilder::new("hosts").with_source_channels(4);
    let src = builder.source(
        transport.clone(),
        Arc::clone(&registry),
        "metrics",
        metrics_schema(),
        SourceOptions::default(),
    );
    builder.project(src, &["host"]).unwrap();
    let mut flow = builder
        .build_into(FlowId::new(8), Arc::new(PanickingContext))
        .unwrap();
    flow.open().unwrap();
    // The pump may die before the watermark is queued.
    let _ = transport.send("metrics", RawEvent::new("web,1,1", 10));

    let (result, logs) = with_captured_logs(|| flow.close());
    assert!(matches!(result, Err(FlowError::Interrupted(_))));
    assert!(logs.contents().contains("flow[8] event pump panicked"));
}

#[test]
fn test_flow_close_tolerates_interrupts() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mid = Probe::new("mid", &log).failing_close(FlowError::Interrupted("wait".into()));
    let mut flow = probe_flow(mid, &log);
    flow.open().unwrap();
    flow.close().unwrap();
}

#[test]
fn test_flow_close_reports_first_failure_but_closes_all() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mid = Probe::new("mid", &log).failing_close(FlowError::io("detach failed"));
    let mut flow = probe_flow(mid, &log);
    flow.open().unwrap();

    assert!(matches!(flow.close(), Err(FlowError::Io(_))));
    assert!(log.lock().unwrap().contains(&"close:out".to_string()));
}

#[test]
fn test_dropping_open_flow_closes_it() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut flow = probe_flow(Probe::new("mid", &log), &log);
    flow.open().unwrap();
    drop(flow);
    assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("close:out"));
}

// ── Environment ───────────────────────────────────────────────────────────────

/// Plans every `SELECT` as `metrics -> discard`; anything else echoes.
struct EchoPlanner {
    registry: Arc<SourceRegistry>,
    transport: Arc<LocalTransport>,
}

impl Planner for EchoPlanner {
    fn plan(&mut self, text: &str) -> FlowResult<PlannedQuery> {
        if !text.to_ascii_lowercase().starts_with("select") {
            return Ok(PlannedQuery::Message(format!("ok: {text}")));
        }
        let mut builder = FlowBuilder::new(text);
        builder.source(
            self.transport.clone(),
            Arc::clone(&self.registry),
            "metrics",
            metrics_schema(),
            SourceOptions::default(),
        );
        Ok(PlannedQuery::Flow(builder))
    }
}

fn environment() -> (Arc<SourceRegistry>, LocalEnvironment<EchoPlanner>) {
    let (registry, transport) = metrics_transport();
    let planner = EchoPlanner {
        registry: Arc::clone(&registry),
        transport,
    };
    (registry, LocalEnvironment::new(planner))
}

#[test]
fn test_submit_response_message_is_optional() {
    let bare = QuerySubmitResponse::started(FlowId::new(3));
    assert_eq!(bare.message, None);
    assert_eq!(bare.flow_id, Some(FlowId::new(3)));

    let noted = QuerySubmitResponse::started(FlowId::new(3)).with_message("started flow[3]");
    assert_eq!(noted.message.as_deref(), Some("started flow[3]"));
    assert_eq!(QuerySubmitResponse::message("hi").flow_id, None);
}

#[test]
fn test_environment_requires_connection() {
    let (_, mut env) = environment();
    assert!(matches!(
        env.submit_query("SHOW FLOWS"),
        Err(FlowError::Disconnected)
    ));
    env.connect().unwrap();
    assert!(env.is_connected());
    assert_eq!(
        env.submit_query("SHOW FLOWS").unwrap().message.as_deref(),
        Some("no running flows")
    );
}

#[test]
fn test_environment_starts_lists_and_drops_flows() {
    let (registry, mut env) = environment();
    env.connect().unwrap();

    let started = env.submit_query("SELECT * FROM metrics;").unwrap();
    assert_eq!(started.flow_id, Some(FlowId::new(1)));
    assert_eq!(registry.ids(), vec!["flow[1]:metrics:0"]);
    assert!(env.flow(FlowId::new(1)).unwrap().is_open());

    let listed = env.submit_query("show flows").unwrap();
    assert_eq!(
        listed.message.as_deref(),
        Some("flow[1]: SELECT * FROM metrics")
    );
    assert_eq!(listed.flow_id, None);

    let echoed = env.submit_query("EXPLAIN x").unwrap();
    assert_eq!(echoed.message.as_deref(), Some("ok: EXPLAIN x"));

    let dropped = env.submit_query("DROP FLOW 1").unwrap();
    assert_eq!(dropped.message.as_deref(), Some("dropped flow[1]"));
    assert!(registry.ids().is_empty());
    assert!(env.flow_ids().is_empty());

    assert!(matches!(
        env.submit_query("drop flow 1"),
        Err(FlowError::UnknownFlow(id)) if id == FlowId::new(1)
    ));
    assert!(matches!(
        env.submit_query("DROP FLOW one"),
        Err(FlowError::Graph(_))
    ));
}

#[test]
fn test_environment_disconnect_closes_everything() {
    let (registry, mut env) = environment();
    env.connect().unwrap();
    env.submit_query("SELECT a").unwrap();
    env.submit_query("SELECT b").unwrap();
    assert_eq!(env.flow_ids(), vec![FlowId::new(1), FlowId::new(2)]);
    assert_eq!(registry.ids().len(), 2);

    env.disconnect().unwrap();
    assert!(registry.ids().is_empty());
    assert!(env.flow_ids().is_empty());
    assert!(matches!(
        env.submit_query("SELECT c"),
        Err(FlowError::Disconnected)
    ));
}
