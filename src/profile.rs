//! Scoped wall-clock timing that reports through `log`.

use std::borrow::Cow;
use std::time::{Duration, Instant};

/// Logs the time elapsed since construction, at `info` level, when dropped.
#[must_use = "the duration is logged when this guard is dropped"]
#[derive(Debug)]
pub struct LogDuration {
    label: Cow<'static, str>,
    start: Instant,
}

impl LogDuration {
    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            start: Instant::now(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for LogDuration {
    fn drop(&mut self) {
        log::info!("{}: {:?}", self.label, self.start.elapsed());
    }
}

/// Time the rest of the enclosing block.
///
/// ```
/// fn work() {
///     shardlock::log_duration!("work");
///     // ...
/// }
/// ```
#[macro_export]
macro_rules! log_duration {
    ($label:expr) => {
        let _log_duration = $crate::profile::LogDuration::new($label);
    };
}
