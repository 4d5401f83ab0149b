//! Request/response logging.
//!
//! When debug logging is enabled, every call produces exactly one combined
//! record: the request summary captured at send time followed by the status
//! (or failure) and body captured at receive time. Records are correlated by
//! [`RequestId`]. A response without a pending request is logged on its own
//! and marked unpaired.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Identifier of one dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Destination for combined log records.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &str);
}

/// Emits records as `tracing` events under the `conduit::http` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &str) {
        tracing::info!(target: "conduit::http", "\n{}", record);
    }
}

/// Writes records to standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl LogSink for StderrSink {
    fn emit(&self, record: &str) {
        eprintln!("{}", record);
    }
}

/// What came back for a logged request.
#[derive(Debug, Clone)]
pub enum Received {
    Response { status: u16, body: String },
    Failure(String),
}

struct PendingRecord {
    summary: String,
    sent_at: Instant,
}

/// Correlates requests with their responses and emits one record per pair.
pub struct RequestLogger {
    pending: Mutex<HashMap<RequestId, PendingRecord>>,
    sink: Arc<dyn LogSink>,
}

impl RequestLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Records a request that was just sent. Does nothing when `enabled` is false.
    pub fn on_send(&self, id: RequestId, summary: String, enabled: bool) {
        if !enabled {
            return;
        }
        self.pending.lock().insert(
            id,
            PendingRecord {
                summary,
                sent_at: Instant::now(),
            },
        );
    }

    /// Consumes the record for `id`, if any, and emits the combined entry.
    pub fn on_receive(&self, id: RequestId, received: &Received, enabled: bool) {
        // Removed even when disabled so toggling the flag mid-flight cannot leak records.
        let record = self.pending.lock().remove(&id);
        if !enabled {
            return;
        }

        let mut out = String::new();
        match &record {
            Some(record) => {
                let _ = writeln!(
                    out,
                    "[conduit] request {} ({} ms)",
                    id,
                    record.sent_at.elapsed().as_millis()
                );
                out.push_str(&record.summary);
            }
            None => {
                let _ = writeln!(out, "[conduit] response {} (unpaired)", id);
            }
        }
        match received {
            Received::Response { status, body } => {
                let _ = writeln!(out, "<- {}", status);
                if !body.is_empty() {
                    let _ = writeln!(out, "  {}", body);
                }
            }
            Received::Failure(message) => {
                let _ = writeln!(out, "<- failed: {}", message);
            }
        }

        self.sink.emit(out.trim_end());
    }

    /// Number of requests still waiting for their response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl std::fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLogger")
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct CollectingSink {
        pub(crate) records: Mutex<Vec<String>>,
    }

    impl LogSink for CollectingSink {
        fn emit(&self, record: &str) {
            self.records.lock().push(record.to_string());
        }
    }

    fn logger() -> (RequestLogger, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        (RequestLogger::new(sink.clone()), sink)
    }

    #[test]
    fn test_pairs_request_and_response() {
        let (logger, sink) = logger();
        let id = RequestId::next();
        logger.on_send(id, "GET https://api.example.com/a\n".to_string(), true);
        assert_eq!(logger.pending_count(), 1);

        logger.on_receive(
            id,
            &Received::Response {
                status: 200,
                body: r#"{"code":0}"#.to_string(),
            },
            true,
        );

        assert_eq!(logger.pending_count(), 0);
        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].contains(&format!("request {}", id)));
        assert!(records[0].contains("GET https://api.example.com/a"));
        assert!(records[0].contains("<- 200"));
        assert!(records[0].contains(r#"{"code":0}"#));
    }

    #[test]
    fn test_concurrent_records_are_not_cross_attributed() {
        let (logger, sink) = logger();
        let first = RequestId::next();
        let second = RequestId::next();
        logger.on_send(first, "GET /first\n".to_string(), true);
        logger.on_send(second, "GET /second\n".to_string(), true);

        logger.on_receive(second, &Received::Failure("timed out".to_string()), true);

        let records = sink.records.lock();
        assert!(records[0].contains("/second"));
        assert!(!records[0].contains("/first"));
        assert!(records[0].contains("failed: timed out"));
        drop(records);
        assert_eq!(logger.pending_count(), 1);
    }

    #[test]
    fn test_unmatched_response_is_logged_unpaired() {
        let (logger, sink) = logger();
        let other = RequestId::next();
        logger.on_send(other, "GET /other\n".to_string(), true);

        let id = RequestId::next();
        logger.on_receive(
            id,
            &Received::Response {
                status: 500,
                body: String::new(),
            },
            true,
        );

        let records = sink.records.lock();
        assert!(records[0].contains("unpaired"));
        assert!(!records[0].contains("/other"));
        drop(records);
        assert_eq!(logger.pending_count(), 1);
    }

    #[test]
    fn test_disabled_logging_emits_nothing() {
        let (logger, sink) = logger();
        let id = RequestId::next();
        logger.on_send(id, "GET /a\n".to_string(), false);
        assert_eq!(logger.pending_count(), 0);
        logger.on_receive(id, &Received::Failure("x".to_string()), false);
        assert!(sink.records.lock().is_empty());
    }

    #[test]
    fn test_disabling_mid_flight_drops_the_record() {
        let (logger, sink) = logger();
        let id = RequestId::next();
        logger.on_send(id, "GET /a\n".to_string(), true);
        logger.on_receive(id, &Received::Failure("x".to_string()), false);
        assert_eq!(logger.pending_count(), 0);
        assert!(sink.records.lock().is_empty());
    }

    #[test]
    fn test_request_ids_increase() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b > a);
        assert_eq!(a.to_string(), format!("#{}", a.get()));
    }
}
