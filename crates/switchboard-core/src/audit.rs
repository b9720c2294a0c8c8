//! Audit sink — bounded, append-only trace of routing decisions.
//!
//! One sink per routing domain. Appends go through an mpsc channel drained
//! by a single worker task, so records land in the ring strictly in send
//! order. Appending is fire-and-forget: a full channel drops the record with
//! a local warning and never fails the request. The ring keeps only the most
//! recent N records — an operational trace, not a durability guarantee.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default ring capacity.
pub const DEFAULT_AUDIT_CAPACITY: usize = 50;

/// One routing decision in the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    /// Resolved target agent, or the topic a denial was about.
    pub target: String,
    pub confidence: f64,
    /// Outcome tag: "handoff", "denied", or "evaluate".
    pub protocol: String,
}

impl AuditRecord {
    pub fn new(
        query: impl Into<String>,
        target: impl Into<String>,
        confidence: f64,
        protocol: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            query: query.into(),
            target: target.into(),
            confidence,
            protocol: protocol.into(),
        }
    }
}

#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditRecord>,
    records: Arc<RwLock<VecDeque<AuditRecord>>>,
}

impl AuditSink {
    /// Create a sink and spawn its single writer task.
    pub fn new(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditRecord>(256);
        let records = Arc::new(RwLock::new(VecDeque::with_capacity(capacity)));

        let ring = Arc::clone(&records);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let mut guard = match ring.write() {
                    Ok(guard) => guard,
                    Err(poisoned) => {
                        warn!("Audit ring lock was poisoned, recovering");
                        poisoned.into_inner()
                    }
                };
                if guard.len() == capacity {
                    guard.pop_front();
                }
                guard.push_back(record);
            }
            debug!("Audit writer stopped");
        });

        Self { tx, records }
    }

    /// Append a record, best effort. Never blocks, never errors out to the
    /// caller; a full channel drops the record with a warning.
    pub fn append(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            warn!("Audit record dropped: {}", e);
        }
    }

    /// The most recent `limit` records in insertion order.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let guard = match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Audit ring lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let skip = guard.len().saturating_sub(limit);
        guard.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Poll until the worker has drained `expected` records or time out.
    async fn wait_for(sink: &AuditSink, expected: usize) {
        for _ in 0..100 {
            if sink.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sink never reached {} records (has {})", expected, sink.len());
    }

    #[tokio::test]
    async fn test_append_and_recent() {
        let sink = AuditSink::new(10);
        sink.append(AuditRecord::new("q1", "agent_it", 0.9, "handoff"));
        sink.append(AuditRecord::new("q2", "PAYROLL", 0.0, "denied"));
        wait_for(&sink, 2).await;

        let recent = sink.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "q1");
        assert_eq!(recent[1].query, "q2");
    }

    #[tokio::test]
    async fn test_ring_bounded_oldest_evicted() {
        let capacity = 5;
        let sink = AuditSink::new(capacity);
        for i in 0..capacity + 1 {
            sink.append(AuditRecord::new(format!("q{}", i), "t", 0.5, "handoff"));
        }
        wait_for(&sink, capacity).await;

        let recent = sink.recent(100);
        assert_eq!(recent.len(), capacity);
        // q0 evicted; q1..q5 survive in insertion order.
        assert_eq!(recent[0].query, "q1");
        assert_eq!(recent[capacity - 1].query, "q5");
    }

    #[tokio::test]
    async fn test_recent_limit_returns_newest() {
        let sink = AuditSink::new(10);
        for i in 0..6 {
            sink.append(AuditRecord::new(format!("q{}", i), "t", 0.5, "handoff"));
        }
        wait_for(&sink, 6).await;

        let recent = sink.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "q4");
        assert_eq!(recent[1].query, "q5");
    }

    #[tokio::test]
    async fn test_empty_sink() {
        let sink = AuditSink::new(10);
        assert!(sink.is_empty());
        assert!(sink.recent(10).is_empty());
    }

    #[tokio::test]
    async fn test_append_never_errors_when_flooded() {
        let sink = AuditSink::new(4);
        // Far more than the channel buffer; append must stay non-blocking
        // and silent even if some records are shed.
        for i in 0..2000 {
            sink.append(AuditRecord::new(format!("q{}", i), "t", 0.5, "handoff"));
        }
        // Let the worker catch up; the ring holds at most its capacity.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sink.len() <= 4);
    }
}
