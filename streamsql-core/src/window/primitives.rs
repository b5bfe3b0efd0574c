use super::*;

/// A half-open event-time window `[start, end)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimeWindow {
    pub start: EventTime,
    pub end: EventTime,
}

impl TimeWindow {
    pub fn new(start: EventTime, end: EventTime) -> Self {
        Self { start, end }
    }

    /// The maximum timestamp that belongs to this window.
    /// A window closes once the watermark reaches it.
    pub fn max_timestamp(&self) -> EventTime {
        self.end.saturating_sub(1)
    }

    /// Return true if `timestamp` falls inside this window.
    pub fn contains(&self, timestamp: EventTime) -> bool {
        timestamp >= self.start && timestamp < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimeWindow([{}, {}))", self.start, self.end)
    }
}

/// Window bounds are computed in `i128` and clamped, so windows around the
/// ends of the event-time range are cut short instead of overflowing.
pub(crate) fn clamp_event_time(t: i128) -> EventTime {
    t.clamp(i128::from(EventTime::MIN), i128::from(EventTime::MAX)) as EventTime
}

/// Assigns event-time windows to timestamps.
///
/// Windows are built from fixed-width panes: every window covers a whole
/// number of panes, so all timestamps inside one pane belong to exactly the
/// same windows.
pub trait WindowAssigner: Send + Sync {
    /// Return the windows that contain `timestamp`.
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow>;

    /// Width in milliseconds of the panes windows are made of.
    fn pane_size(&self) -> i64;

    /// Start of the pane containing `timestamp`.
    fn pane_start(&self, timestamp: EventTime) -> EventTime {
        let ts = i128::from(timestamp);
        clamp_event_time(ts - ts.rem_euclid(i128::from(self.pane_size())))
    }
}

/// Window configuration of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowSpec {
    /// Fixed-size, non-overlapping time windows.
    Tumbling { size_ms: i64 },
    /// Fixed-size time windows starting every `slide_ms`.
    Sliding { size_ms: i64, slide_ms: i64 },
    /// Per-key windows of `size` records.
    Count { size: u64 },
}

impl WindowSpec {
    pub fn tumbling(size: Duration) -> Self {
        WindowSpec::Tumbling {
            size_ms: size.as_millis() as i64,
        }
    }

    pub fn sliding(size: Duration, slide: Duration) -> Self {
        WindowSpec::Sliding {
            size_ms: size.as_millis() as i64,
            slide_ms: slide.as_millis() as i64,
        }
    }

    pub fn count(size: u64) -> Self {
        WindowSpec::Count { size }
    }

    /// Reject empty windows and slides longer than the window.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            WindowSpec::Tumbling { size_ms } if size_ms <= 0 => {
                Err(format!("tumbling window size must be positive, got {size_ms}ms"))
            }
            WindowSpec::Sliding { size_ms, slide_ms } if size_ms <= 0 || slide_ms <= 0 => Err(
                format!("sliding window needs positive size and slide, got {size_ms}ms/{slide_ms}ms"),
            ),
            WindowSpec::Sliding { size_ms, slide_ms } if slide_ms > size_ms => Err(format!(
                "slide {slide_ms}ms is longer than window {size_ms}ms"
            )),
            WindowSpec::Count { size: 0 } => Err("count window size must be positive".into()),
            _ => Ok(()),
        }
    }

    /// The assigner for time windows; `None` for count windows.
    pub fn assigner(&self) -> Option<Box<dyn WindowAssigner>> {
        match *self {
            WindowSpec::Tumbling { size_ms } => Some(Box::new(TumblingWindows::of_millis(size_ms))),
            WindowSpec::Sliding { size_ms, slide_ms } => {
                Some(Box::new(SlidingWindows::of_millis(size_ms, slide_ms)))
            }
            WindowSpec::Count { .. } => None,
        }
    }

    /// Parse `tumbling:10s`, `sliding:1m/10s` or `count:100`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let (kind, args) = text
            .split_once(':')
            .ok_or_else(|| format!("window spec {text:?} is missing ':'"))?;
        let spec = match kind.trim().to_ascii_lowercase().as_str() {
            "tumbling" => WindowSpec::Tumbling {
                size_ms: parse_duration_ms(args)?,
            },
            "sliding" => {
                let (size, slide) = args
                    .split_once('/')
                    .ok_or_else(|| format!("sliding window {args:?} needs size/slide"))?;
                WindowSpec::Sliding {
                    size_ms: parse_duration_ms(size)?,
                    slide_ms: parse_duration_ms(slide)?,
                }
            }
            "count" => WindowSpec::Count {
                size: args
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad count window size {args:?}"))?,
            },
            other => return Err(format!("unknown window kind {other:?}")),
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSpec::Tumbling { size_ms } => write!(f, "tumbling:{size_ms}ms"),
            WindowSpec::Sliding { size_ms, slide_ms } => {
                write!(f, "sliding:{size_ms}ms/{slide_ms}ms")
            }
            WindowSpec::Count { size } => write!(f, "count:{size}"),
        }
    }
}

/// Parse `250ms`, `10s`, `5m`, `1h`; a bare number is milliseconds.
pub fn parse_duration_ms(text: &str) -> Result<i64, String> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| format!("bad duration {text:?}"))?;
    let factor = match unit {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        other => return Err(format!("unknown duration unit {other:?} in {text:?}")),
    };
    amount
        .checked_mul(factor)
        .ok_or_else(|| format!("duration {text:?} overflows"))
}
