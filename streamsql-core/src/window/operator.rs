use super::*;

// ── WindowResult ──────────────────────────────────────────────────────────────

/// One aggregated row: the group key, the window it covers and one value
/// per bound aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowResult {
    pub key: Vec<Value>,
    pub window: TimeWindow,
    pub values: Vec<Value>,
}

impl WindowResult {
    /// Event time stamped on the output row.
    pub fn timestamp(&self) -> EventTime {
        self.window.max_timestamp()
    }
}

// ── Per-group state ───────────────────────────────────────────────────────────

/// Buckets of one group key.
struct GroupState {
    key: Vec<Value>,
    /// Pane start -> one bucket per aggregate.
    panes: BTreeMap<EventTime, Vec<ErasedBucket>>,
    /// Progress of the current count window.
    counted: u64,
    first_seen: EventTime,
    last_seen: EventTime,
}

impl GroupState {
    fn new(key: Vec<Value>) -> Self {
        Self {
            key,
            panes: BTreeMap::new(),
            counted: 0,
            first_seen: EventTime::MAX,
            last_seen: EventTime::MIN,
        }
    }
}

// ── WindowAggregator ──────────────────────────────────────────────────────────

/// Keyed windowed aggregation over bucketed accumulator state.
///
/// # Processing model
///
/// - **Time windows**: every record lands in the pane containing its
///   timestamp; each `(key, pane)` owns one bucket per aggregate. A window
///   fires once the watermark reaches its max timestamp and its result
///   combines the buckets of every pane it covers, so overlapping sliding
///   windows share panes instead of copying state.
/// - **Count windows**: a key's window fires as soon as it has seen `size`
///   records; watermarks are ignored.
/// - **Late records**: a record whose every window has already fired is
///   dropped and counted.
pub struct WindowAggregator {
    spec: WindowSpec,
    assigner: Option<Box<dyn WindowAssigner>>,
    aggregates: Vec<BoundAggregate>,
    groups: AHashMap<Vec<u8>, GroupState>,
    /// Time windows that received at least one record and have not fired.
    pending: BTreeSet<TimeWindow>,
    current_watermark: EventTime,
    late_records: u64,
}

impl WindowAggregator {
    pub fn new(spec: WindowSpec, aggregates: Vec<BoundAggregate>) -> Result<Self, String> {
        spec.validate()?;
        Ok(Self {
            spec,
            assigner: spec.assigner(),
            aggregates,
            groups: AHashMap::new(),
            pending: BTreeSet::new(),
            current_watermark: EventTime::MIN,
            late_records: 0,
        })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    pub fn aggregates(&self) -> &[BoundAggregate] {
        &self.aggregates
    }

    pub fn current_watermark(&self) -> EventTime {
        self.current_watermark
    }

    /// Number of records dropped because all their windows had fired.
    pub fn late_records(&self) -> u64 {
        self.late_records
    }

    /// Number of time windows waiting for the watermark.
    pub fn pending_windows(&self) -> usize {
        self.pending.len()
    }

    /// Number of group keys currently holding state.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Fold one record into its windows.
    ///
    /// `args` holds one argument per aggregate, in binding order. Returns
    /// the count windows this record completed; time windows only fire on
    /// [`advance_watermark`](Self::advance_watermark) or [`flush`](Self::flush).
    pub fn process(
        &mut self,
        key: Vec<Value>,
        args: &[Value],
        timestamp: EventTime,
    ) -> FlowResult<Vec<WindowResult>> {
        debug_assert_eq!(args.len(), self.aggregates.len());
        let key_bytes = bincode::serialize(&key)?;

        let Some(assigner) = self.assigner.as_ref() else {
            return Ok(self.process_counted(key_bytes, key, args, timestamp));
        };

        let watermark = self.current_watermark;
        let open: Vec<TimeWindow> = assigner
            .assign_windows(timestamp)
            .into_iter()
            .filter(|w| w.max_timestamp() > watermark)
            .collect();
        if open.is_empty() {
            self.late_records += 1;
            tracing::debug!(
                timestamp,
                watermark, "dropping late record, all its windows have fired"
            );
            return Ok(Vec::new());
        }
        let pane = assigner.pane_start(timestamp);
        self.pending.extend(open);

        let aggregates = &self.aggregates;
        let group = self
            .groups
            .entry(key_bytes)
            .or_insert_with(|| GroupState::new(key));
        let buckets = group
            .panes
            .entry(pane)
            .or_insert_with(|| aggregates.iter().map(|a| a.func.new_bucket()).collect());
        fold(aggregates, buckets, args);
        Ok(Vec::new())
    }

    fn process_counted(
        &mut self,
        key_bytes: Vec<u8>,
        key: Vec<Value>,
        args: &[Value],
        timestamp: EventTime,
    ) -> Vec<WindowResult> {
        let WindowSpec::Count { size } = self.spec else {
            return Vec::new();
        };
        let aggregates = &self.aggregates;
        let group = self
            .groups
            .entry(key_bytes.clone())
            .or_insert_with(|| GroupState::new(key));
        let buckets = group
            .panes
            .entry(0)
            .or_insert_with(|| aggregates.iter().map(|a| a.func.new_bucket()).collect());
        fold(aggregates, buckets, args);
        group.counted += 1;
        group.first_seen = group.first_seen.min(timestamp);
        group.last_seen = group.last_seen.max(timestamp);

        if group.counted < size {
            return Vec::new();
        }
        let window = TimeWindow::new(group.first_seen, group.last_seen.saturating_add(1));
        let result = WindowResult {
            key: group.key.clone(),
            window,
            values: finish(aggregates, group, window, true),
        };
        self.groups.remove(&key_bytes);
        vec![result]
    }

    /// Advance event time to `watermark`, firing every window it closes.
    /// Results are ordered by window, then by key bytes.
    pub fn advance_watermark(&mut self, watermark: EventTime) -> Vec<WindowResult> {
        if watermark <= self.current_watermark {
            return Vec::new();
        }
        self.current_watermark = watermark;
        if self.assigner.is_none() {
            return Vec::new();
        }

        let due: Vec<TimeWindow> = self
            .pending
            .iter()
            .take_while(|w| w.max_timestamp() <= watermark)
            .copied()
            .collect();
        for window in &due {
            self.pending.remove(window);
        }
        let results = self.fire(&due);
        self.evict();
        results
    }

    /// Fire every pending time window and drop all state. Partial count
    /// windows are discarded.
    pub fn flush(&mut self) -> Vec<WindowResult> {
        let results = if self.assigner.is_some() {
            let due: Vec<TimeWindow> = std::mem::take(&mut self.pending).into_iter().collect();
            self.fire(&due)
        } else {
            if !self.groups.is_empty() {
                tracing::debug!(
                    groups = self.groups.len(),
                    "discarding partial count windows at end of stream"
                );
            }
            Vec::new()
        };
        self.groups.clear();
        results
    }

    fn fire(&self, windows: &[TimeWindow]) -> Vec<WindowResult> {
        if windows.is_empty() {
            return Vec::new();
        }
        let mut groups: Vec<(&Vec<u8>, &GroupState)> = self.groups.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));

        let mut results = Vec::new();
        for &window in windows {
            for (_, group) in &groups {
                let touched = group.panes.range(window.start..window.end).next().is_some();
                if !touched {
                    continue;
                }
                results.push(WindowResult {
                    key: group.key.clone(),
                    window,
                    values: finish(&self.aggregates, group, window, false),
                });
            }
        }
        results
    }

    /// Drop panes no unfired window can cover, and groups left empty.
    fn evict(&mut self) {
        let size = match self.spec {
            WindowSpec::Tumbling { size_ms } | WindowSpec::Sliding { size_ms, .. } => size_ms,
            WindowSpec::Count { .. } => return,
        };
        // Open windows have end - 1 > watermark, so none starts below this.
        let lowest_open_start = self
            .current_watermark
            .saturating_add(2)
            .saturating_sub(size);
        self.groups.retain(|_, group| {
            group.panes = group.panes.split_off(&lowest_open_start);
            !group.panes.is_empty()
        });
    }
}

impl fmt::Debug for WindowAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowAggregator")
            .field("spec", &self.spec)
            .field("aggregates", &self.aggregates)
            .field("groups", &self.groups.len())
            .field("pending", &self.pending.len())
            .field("current_watermark", &self.current_watermark)
            .field("late_records", &self.late_records)
            .finish()
    }
}

fn fold(aggregates: &[BoundAggregate], buckets: &mut [ErasedBucket], args: &[Value]) {
    for ((agg, bucket), arg) in aggregates.iter().zip(buckets.iter_mut()).zip(args) {
        agg.func.add_to_bucket(arg, bucket, &agg.arg_type);
    }
}

/// Combine, per aggregate, the buckets of every pane in `window`.
/// Count windows keep a single pane and take all of it.
fn finish(
    aggregates: &[BoundAggregate],
    group: &GroupState,
    window: TimeWindow,
    all_panes: bool,
) -> Vec<Value> {
    aggregates
        .iter()
        .enumerate()
        .map(|(i, agg)| {
            let mut buckets: Box<dyn Iterator<Item = &ErasedBucket> + '_> = if all_panes {
                Box::new(group.panes.values().map(|b| &b[i]))
            } else {
                Box::new(
                    group
                        .panes
                        .range(window.start..window.end)
                        .map(|(_, b)| &b[i]),
                )
            };
            agg.func.finish_window(&mut buckets, &agg.return_type)
        })
        .collect()
}
