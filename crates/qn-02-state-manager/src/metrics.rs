//! Per-type timing for the dispatcher and the client.
//!
//! `DispatchMetrics` accumulates the time the server spends executing each
//! request type against the register. `ClientMetrics` counts requests and
//! the wall time a client spends blocked on the socket.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::domain::MessageType;

/// Count and cumulative duration for one message type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeTiming {
    pub count: u64,
    pub elapsed: Duration,
}

/// Server-side computation timing, owned by one server instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    timings: BTreeMap<MessageType, TypeTiming>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message_type: MessageType, elapsed: Duration) {
        let entry = self.timings.entry(message_type).or_default();
        entry.count += 1;
        entry.elapsed += elapsed;
    }

    pub fn get(&self, message_type: MessageType) -> Option<TypeTiming> {
        self.timings.get(&message_type).copied()
    }

    pub fn count(&self, message_type: MessageType) -> u64 {
        self.get(message_type).map_or(0, |t| t.count)
    }

    pub fn total(&self) -> Duration {
        self.timings.values().map(|t| t.elapsed).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MessageType, TypeTiming)> + '_ {
        self.timings.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.timings.is_empty()
    }

    /// Timing summary in the server log format.
    pub fn render_timing_log(&self) -> String {
        let mut out = String::from("computation timing:\n");
        for (message_type, timing) in &self.timings {
            let _ = writeln!(out, "\t{}: {}", message_type, timing.elapsed.as_secs_f64());
        }
        let _ = writeln!(out, "\ttotal computation timing: {}", self.total().as_secs_f64());
        out
    }

    /// Emit the summary through tracing and, if given, write it to `path`.
    pub fn flush(&self, path: Option<&Path>) -> std::io::Result<()> {
        for (message_type, timing) in &self.timings {
            info!(
                message_type = %message_type,
                count = timing.count,
                seconds = timing.elapsed.as_secs_f64(),
                "computation timing"
            );
        }
        info!(
            seconds = self.total().as_secs_f64(),
            "total computation timing"
        );

        if let Some(path) = path {
            std::fs::write(path, self.render_timing_log())?;
        }
        Ok(())
    }
}

/// Client-side request counters and socket time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetrics {
    requests: BTreeMap<MessageType, u64>,
    io_time: Duration,
}

impl ClientMetrics {
    pub fn record(&mut self, message_type: MessageType, io_time: Duration) {
        *self.requests.entry(message_type).or_default() += 1;
        self.io_time += io_time;
    }

    pub fn requests(&self, message_type: MessageType) -> u64 {
        self.requests.get(&message_type).copied().unwrap_or(0)
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.values().sum()
    }

    pub fn io_time(&self) -> Duration {
        self.io_time
    }
}
