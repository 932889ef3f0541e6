//! Notification history

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manager::AlertDetails;
use crate::notifier::{DeliveryReceipt, SinkError};

/// Outcome of a single sink call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Result<DeliveryReceipt, SinkError>> for SinkResult {
    fn from(result: &Result<DeliveryReceipt, SinkError>) -> Self {
        match result {
            Ok(receipt) => Self {
                success: true,
                detail: Some(receipt.detail.clone()),
                error: None,
            },
            Err(e) => Self {
                success: false,
                detail: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// One attempted owner notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// When the attempt completed
    pub timestamp: DateTime<Utc>,
    /// Episode that produced the attempt (absent for test sends)
    pub episode_id: Option<u64>,
    pub details: AlertDetails,
    pub result: SinkResult,
    /// Seconds between episode start and dispatch
    pub elapsed_at_send: f64,
    /// Sent outside the escalation flow
    pub forced: bool,
}

/// Bounded, append-only log of attempts, oldest first
#[derive(Debug)]
pub struct NotificationHistory {
    records: VecDeque<NotificationRecord>,
    limit: usize,
    successes: u64,
}

impl NotificationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(limit.min(64)),
            limit: limit.max(1),
            successes: 0,
        }
    }

    pub fn push(&mut self, record: NotificationRecord) {
        if record.result.success {
            self.successes += 1;
        }
        if self.records.len() >= self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recent `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<NotificationRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&NotificationRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Successful sends over the manager's lifetime, including evicted records
    pub fn successes(&self) -> u64 {
        self.successes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms::AlertLevel;

    fn record(success: bool) -> NotificationRecord {
        NotificationRecord {
            timestamp: Utc::now(),
            episode_id: Some(1),
            details: AlertDetails::new("sleeping_eyes_closed", 0.9, AlertLevel::Critical, 5.0, "test"),
            result: SinkResult {
                success,
                detail: None,
                error: (!success).then(|| "boom".to_string()),
            },
            elapsed_at_send: 10.0,
            forced: false,
        }
    }

    #[test]
    fn test_bounded_keeps_newest() {
        let mut history = NotificationHistory::new(2);
        history.push(record(true));
        history.push(record(false));
        history.push(record(true));

        assert_eq!(history.len(), 2);
        assert_eq!(history.successes(), 2);
        let recent = history.recent(10);
        assert!(!recent[0].result.success);
        assert!(recent[1].result.success);
    }

    #[test]
    fn test_recent_limit() {
        let mut history = NotificationHistory::new(10);
        for _ in 0..5 {
            history.push(record(true));
        }
        assert_eq!(history.recent(3).len(), 3);
        assert_eq!(history.recent(0).len(), 0);
    }

    #[test]
    fn test_sink_result_from_error() {
        let result: Result<DeliveryReceipt, SinkError> =
            Err(SinkError::NotConfigured("missing api key".to_string()));
        let sink_result = SinkResult::from(&result);
        assert!(!sink_result.success);
        assert!(sink_result.error.unwrap().contains("missing api key"));
    }
}
