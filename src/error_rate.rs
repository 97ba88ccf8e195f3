// Fixed-window error-rate counter shared by the request middleware and the alert task.

use crate::clock::Clock;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Counters of the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRateWindow {
    pub window_start_ms: i64,
    pub total_requests: u64,
    pub error_requests: u64,
}

impl ErrorRateWindow {
    fn fresh(now_ms: i64) -> Self {
        Self {
            window_start_ms: now_ms,
            total_requests: 0,
            error_requests: 0,
        }
    }

    pub fn rate_percent(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_requests as f64 / self.total_requests as f64 * 100.0
    }
}

pub struct ErrorRateTracker {
    clock: Arc<dyn Clock>,
    window_ms: i64,
    window: Mutex<ErrorRateWindow>,
}

impl ErrorRateTracker {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            window_ms: window.as_millis() as i64,
            window: Mutex::new(ErrorRateWindow::fresh(now)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ErrorRateWindow> {
        // Counters stay consistent even if a holder panicked; keep using them.
        self.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self, window: &ErrorRateWindow, now_ms: i64) -> bool {
        now_ms - window.window_start_ms > self.window_ms
    }

    /// Counts one completed request and returns the rate of the current window.
    /// An expired window is reset before counting.
    pub fn record_request(&self, is_error: bool) -> f64 {
        let now = self.clock.now_ms();
        let mut window = self.lock();
        if self.expired(&window, now) {
            *window = ErrorRateWindow::fresh(now);
        }
        window.total_requests += 1;
        if is_error {
            window.error_requests += 1;
        }
        window.rate_percent()
    }

    /// Rate of the current window; 0 once the window has expired with no newer requests.
    pub fn error_rate(&self) -> f64 {
        let now = self.clock.now_ms();
        let window = self.lock();
        if self.expired(&window, now) {
            return 0.0;
        }
        window.rate_percent()
    }

    pub fn window(&self) -> ErrorRateWindow {
        *self.lock()
    }
}
