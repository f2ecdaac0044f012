//! Host-facing log channel
//!
//! Hosts subscribe a handler and receive every advisory, warning and error
//! the orchestrator produces as a `(message, severity)` record. Records are
//! mirrored to the `log` facade before delivery, so a plain `env_logger`
//! setup sees them too.
//!
//! Handlers run synchronously on the thread that emitted the record and must
//! not subscribe or unsubscribe from inside the callback.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Record severity, numbered the way hosts expect it on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Severity {
    /// Informational
    Info = 0,
    /// Something degraded but the session goes on
    Warning = 1,
    /// An operation failed
    Error = 2,
}

impl Severity {
    /// Numeric code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map a numeric code, clamping unknown values into range
    pub fn from_code(code: i32) -> Self {
        match code {
            i32::MIN..=0 => Self::Info,
            1 => Self::Warning,
            _ => Self::Error,
        }
    }

    /// Recover the severity from a `"[N] message"` formatted line
    pub fn parse_prefix(line: &str) -> Self {
        let bytes = line.as_bytes();
        if bytes.len() >= 3 && bytes[0] == b'[' && bytes[2] == b']' {
            if let Some(digit) = char::from(bytes[1]).to_digit(10) {
                return Self::from_code(digit as i32);
            }
        }
        Self::Info
    }

    fn level(self) -> log::Level {
        match self {
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Human readable text
    pub message: String,
    /// Severity of the record
    pub severity: Severity,
}

impl LogRecord {
    /// Create a record
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }

    /// `"[severity] message"`, the single-string form some hosts consume
    pub fn formatted(&self) -> String {
        format!("[{}] {}", self.severity, self.message)
    }
}

/// Token returned by [`LogChannel::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(&LogRecord) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_token: u64,
    handlers: Vec<(SubscriptionToken, Handler)>,
}

/// Subscribable log channel
///
/// Cloning yields another handle to the same channel.
#[derive(Clone, Default)]
pub struct LogChannel {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl LogChannel {
    /// Create a channel with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let token = SubscriptionToken(subscribers.next_token);
        subscribers.next_token += 1;
        subscribers.handlers.push((token, Arc::new(handler)));
        token
    }

    /// Remove a handler; returns false if the token was unknown
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.handlers.len();
        subscribers.handlers.retain(|(t, _)| *t != token);
        subscribers.handlers.len() != before
    }

    /// Number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }

    /// Emit a record to the `log` facade and every subscriber
    pub fn emit(&self, message: impl Into<String>, severity: Severity) {
        let record = LogRecord::new(message, severity);
        log::log!(target: "touchlink", severity.level(), "{}", record.message);

        // Snapshot so handlers run without the lock held
        let handlers: Vec<Handler> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(&record);
        }
    }

    /// Emit at info severity
    pub fn info(&self, message: impl Into<String>) {
        self.emit(message, Severity::Info);
    }

    /// Emit at warning severity
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(message, Severity::Warning);
    }

    /// Emit at error severity
    pub fn error(&self, message: impl Into<String>) {
        self.emit(message, Severity::Error);
    }
}

impl fmt::Debug for LogChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Collects records in memory; handy for hosts without a UI and for tests
#[derive(Clone, Default)]
pub struct LogCollector {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this collector to a channel
    pub fn attach(&self, channel: &LogChannel) -> SubscriptionToken {
        let records = Arc::clone(&self.records);
        channel.subscribe(move |record| {
            records
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(record.clone());
        })
    }

    /// Copy of everything collected so far
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Collected records of exactly the given severity
    pub fn with_severity(&self, severity: Severity) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.severity == severity)
            .collect()
    }

    /// True if any record contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|record| record.message.contains(needle))
    }

    /// Drop everything collected so far
    pub fn clear(&self) {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_record_roundtrips_severity() {
        let record = LogRecord::new("ovr_SubmitFrame failed", Severity::Error);
        let line = record.formatted();
        assert_eq!(line, "[2] ovr_SubmitFrame failed");
        assert_eq!(Severity::parse_prefix(&line), Severity::Error);
        assert_eq!(Severity::parse_prefix("no prefix"), Severity::Info);
        assert_eq!(Severity::parse_prefix("[9] clamped"), Severity::Error);
    }

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let channel = LogChannel::new();
        let collector = LogCollector::new();
        let token = collector.attach(&channel);

        channel.warn("tool path missing");
        assert_eq!(collector.records().len(), 1);
        assert_eq!(collector.records()[0].severity, Severity::Warning);

        assert!(channel.unsubscribe(token));
        assert!(!channel.unsubscribe(token));
        channel.error("not delivered");
        assert_eq!(collector.records().len(), 1);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let channel = LogChannel::new();
        let collector = LogCollector::new();
        collector.attach(&channel);

        let clone = channel.clone();
        clone.error("from clone");
        assert!(collector.contains("from clone"));
        assert_eq!(clone.subscriber_count(), 1);
    }

    #[test]
    fn test_filter_by_severity() {
        let channel = LogChannel::new();
        let collector = LogCollector::new();
        collector.attach(&channel);

        channel.info("a");
        channel.warn("b");
        channel.error("c");
        assert_eq!(collector.with_severity(Severity::Warning).len(), 1);
        assert_eq!(collector.with_severity(Severity::Error)[0].message, "c");
    }
}
