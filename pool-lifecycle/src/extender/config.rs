use std::time::Duration;

/// Host execution ceiling minus one second.
pub const DEFAULT_MAX_SESSION_DURATION: Duration = Duration::from_millis(15 * 60 * 1000 - 1000);
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct ExtenderConfig {
    /// No window may end later than this, measured from session start.
    pub max_session_duration: Duration,
    /// Added on top of the pool's idle timeout so the close lands inside the window.
    pub safety_margin: Duration,
}

impl ExtenderConfig {
    pub fn new(max_session_duration: Duration) -> Self {
        Self {
            max_session_duration,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }

    pub fn with_max_session_duration(mut self, max_session_duration: Option<Duration>) -> Self {
        self.max_session_duration = max_session_duration.unwrap_or(DEFAULT_MAX_SESSION_DURATION);
        self
    }

    pub fn with_safety_margin(mut self, safety_margin: Option<Duration>) -> Self {
        self.safety_margin = safety_margin.unwrap_or(DEFAULT_SAFETY_MARGIN);
        self
    }
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            max_session_duration: DEFAULT_MAX_SESSION_DURATION,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}
