//! Activity log repository

use crate::StorageError;
use chrono::{DateTime, Utc};
use dms::{ActivityEvent, ActivityLabel, AlertLevel};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Events kept per session before the oldest are dropped
    pub max_events_per_session: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            // ~10 minutes at 15fps
            max_events_per_session: 9_000,
        }
    }
}

/// Stored classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: ActivityEvent,
}

/// Aggregate view of a session's log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Events ever inserted, including those dropped by retention
    pub total_events: u64,
    /// Events currently retained
    pub retained_events: usize,
    pub alarms_triggered: u64,
    pub by_activity: HashMap<ActivityLabel, usize>,
    pub last_activity: Option<ActivityLabel>,
}

#[derive(Debug, Default)]
struct LogState {
    records: VecDeque<ActivityRecord>,
    next_id: u64,
    alarms_triggered: u64,
}

/// In-memory activity log for one monitoring session
pub struct ActivityRepository {
    state: Mutex<LogState>,
    max_records: usize,
}

impl ActivityRepository {
    pub fn new(config: &StorageConfig) -> Self {
        let max_records = config.max_events_per_session.max(1);
        debug!(max_records, "Creating in-memory activity log");
        Self {
            state: Mutex::new(LogState {
                records: VecDeque::with_capacity(max_records.min(1024)),
                next_id: 1,
                alarms_triggered: 0,
            }),
            max_records,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LogState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Append an event, returning its id
    pub fn insert(&self, event: ActivityEvent) -> Result<u64, StorageError> {
        let mut state = self.lock()?;

        // Enforce retention
        while state.records.len() >= self.max_records {
            state.records.pop_front();
        }

        let id = state.next_id;
        state.next_id += 1;
        if event.trigger_alarm {
            state.alarms_triggered += 1;
        }

        state.records.push_back(ActivityRecord {
            id,
            recorded_at: Utc::now(),
            event,
        });
        Ok(id)
    }

    /// Most recent events, newest first, optionally at or above a level
    pub fn recent(
        &self,
        min_level: Option<AlertLevel>,
        limit: usize,
    ) -> Result<Vec<ActivityRecord>, StorageError> {
        let state = self.lock()?;

        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| min_level.map_or(true, |level| r.event.alert_level >= level))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Events with a frame timestamp at or after `since_ns`, oldest first
    pub fn since(&self, since_ns: u64) -> Result<Vec<ActivityRecord>, StorageError> {
        let state = self.lock()?;

        Ok(state
            .records
            .iter()
            .filter(|r| r.event.timestamp_ns >= since_ns)
            .cloned()
            .collect())
    }

    pub fn summary(&self) -> Result<ActivitySummary, StorageError> {
        let state = self.lock()?;

        let mut by_activity = HashMap::new();
        for record in &state.records {
            *by_activity.entry(record.event.activity).or_insert(0) += 1;
        }

        Ok(ActivitySummary {
            total_events: state.next_id - 1,
            retained_events: state.records.len(),
            alarms_triggered: state.alarms_triggered,
            by_activity,
            last_activity: state.records.back().map(|r| r.event.activity),
        })
    }

}

impl Default for ActivityRepository {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}
