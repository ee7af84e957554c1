//! Progress reporting.
//!
//! The engine narrates what it is doing through an [`ActivityReporter`].
//! Reporters observe only; nothing they do affects control flow.

use std::sync::Mutex;
use std::time::Instant;

pub trait ActivityReporter: Send + Sync {
    fn report(&self, status: &str);
    fn error(&self, message: &str, error: &(dyn std::error::Error + 'static));
}

/// Logs every status through `tracing`, with the time since the previous one.
#[derive(Debug)]
pub struct TracingActivity {
    title: String,
    started: Instant,
    last: Mutex<Instant>,
}

impl TracingActivity {
    pub fn start(title: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            title: title.into(),
            started: now,
            last: Mutex::new(now),
        }
    }

    pub fn end(&self) {
        tracing::info!(
            "[{}] done in {:.3} s",
            self.title,
            self.started.elapsed().as_secs_f64()
        );
    }

    fn lap(&self) -> f64 {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        let lap = now.duration_since(*last).as_secs_f64();
        *last = now;
        lap
    }
}

impl ActivityReporter for TracingActivity {
    fn report(&self, status: &str) {
        tracing::info!("[{}] {status} - {:.3} s", self.title, self.lap());
    }

    fn error(&self, message: &str, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(error = %error, "[{} ERROR] {message}", self.title);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct RecordingActivity {
    lines: Mutex<Vec<String>>,
}

impl RecordingActivity {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn push(&self, line: String) {
        self.lines.lock().unwrap_or_else(|p| p.into_inner()).push(line);
    }
}

impl ActivityReporter for RecordingActivity {
    fn report(&self, status: &str) {
        self.push(status.to_string());
    }

    fn error(&self, message: &str, error: &(dyn std::error::Error + 'static)) {
        self.push(format!("ERROR {message}: {error}"));
    }
}
