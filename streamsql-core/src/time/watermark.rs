use super::*;

/// Minimum possible event time. Used as the initial "no watermark" sentinel.
pub const EVENT_TIME_MIN: EventTime = i64::MIN;

/// Current wall-clock time in milliseconds since epoch.
pub fn now_millis() -> EventTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as EventTime)
        .unwrap_or(0)
}

/// Observes event timestamps and decides when to advance the watermark.
///
/// A source owns one generator and consults it after every record it emits.
pub trait WatermarkGenerator: Send {
    /// Notify the generator that an event with the given timestamp was observed.
    fn on_event(&mut self, timestamp: EventTime);

    /// Return the current watermark, or `None` if no watermark has been emitted yet.
    fn current_watermark(&self) -> Option<Watermark>;
}

/// Watermarks for streams where events can arrive out of order by at most `max_delay`.
///
/// The watermark is `max_seen_timestamp - max_delay`, so a window is held
/// open for `max_delay` after the newest event passes its end.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use streamsql_core::time::{BoundedOutOfOrderness, WatermarkGenerator};
///
/// let mut wm_gen = BoundedOutOfOrderness::new(Duration::from_secs(5));
/// wm_gen.on_event(10_000);
/// assert_eq!(wm_gen.current_watermark().unwrap().timestamp, 5_000);
/// ```
#[derive(Debug, Clone)]
pub struct BoundedOutOfOrderness {
    max_delay_ms: i64,
    max_seen_timestamp: EventTime,
}

impl BoundedOutOfOrderness {
    /// Create a generator with the given maximum out-of-order delay.
    pub fn new(max_delay: Duration) -> Self {
        Self {
            max_delay_ms: max_delay.as_millis() as i64,
            max_seen_timestamp: EVENT_TIME_MIN,
        }
    }

    /// Generator for streams whose timestamps never decrease.
    pub fn ascending() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl WatermarkGenerator for BoundedOutOfOrderness {
    fn on_event(&mut self, timestamp: EventTime) {
        if timestamp > self.max_seen_timestamp {
            self.max_seen_timestamp = timestamp;
        }
    }

    fn current_watermark(&self) -> Option<Watermark> {
        if self.max_seen_timestamp == EVENT_TIME_MIN {
            // No event seen yet; don't emit a watermark.
            return None;
        }
        Some(Watermark::new(
            self.max_seen_timestamp.saturating_sub(self.max_delay_ms),
        ))
    }
}
