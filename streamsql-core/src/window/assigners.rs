use super::*;

// ── Tumbling ──────────────────────────────────────────────────────────────────

/// Fixed-size, non-overlapping event-time windows aligned to multiples of `size`.
#[derive(Debug, Clone)]
pub struct TumblingWindows {
    size_ms: i64,
}

impl TumblingWindows {
    /// Create tumbling windows of the given `size`.
    pub fn of(size: Duration) -> Self {
        Self::of_millis(size.as_millis() as i64)
    }

    pub fn of_millis(size_ms: i64) -> Self {
        Self { size_ms }
    }
}

impl WindowAssigner for TumblingWindows {
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        let (ts, size) = (i128::from(timestamp), i128::from(self.size_ms));
        let start = ts - ts.rem_euclid(size);
        vec![TimeWindow::new(
            clamp_event_time(start),
            clamp_event_time(start + size),
        )]
    }

    fn pane_size(&self) -> i64 {
        self.size_ms
    }
}

// ── Sliding ───────────────────────────────────────────────────────────────────

/// Fixed-size, possibly overlapping event-time windows.
/// A timestamp belongs to `ceil(size / slide)` windows.
#[derive(Debug, Clone)]
pub struct SlidingWindows {
    size_ms: i64,
    slide_ms: i64,
    pane_ms: i64,
}

impl SlidingWindows {
    /// Create sliding windows of the given `size` advancing every `slide`.
    pub fn of(size: Duration, slide: Duration) -> Self {
        Self::of_millis(size.as_millis() as i64, slide.as_millis() as i64)
    }

    pub fn of_millis(size_ms: i64, slide_ms: i64) -> Self {
        Self {
            size_ms,
            slide_ms,
            pane_ms: gcd(size_ms, slide_ms),
        }
    }
}

impl WindowAssigner for SlidingWindows {
    fn assign_windows(&self, timestamp: EventTime) -> Vec<TimeWindow> {
        let ts = i128::from(timestamp);
        let (size, slide) = (i128::from(self.size_ms), i128::from(self.slide_ms));
        // Walk back from the last window start until no window covers ts.
        let mut windows = Vec::new();
        let mut start = ts - ts.rem_euclid(slide);
        while start > ts - size {
            windows.push(TimeWindow::new(
                clamp_event_time(start),
                clamp_event_time(start + size),
            ));
            start -= slide;
        }
        windows
    }

    fn pane_size(&self) -> i64 {
        self.pane_ms
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}
