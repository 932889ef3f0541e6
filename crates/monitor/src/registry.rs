//! Active session registry

use std::collections::HashMap;
use std::sync::Arc;

use alerting::NotificationSink;
use metrics::gauge;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::session::{MonitorSession, SessionInfo};
use crate::{MonitorConfig, MonitorError};

/// Sessions keyed by id, sharing one configuration and notification sink
pub struct SessionRegistry {
    config: MonitorConfig,
    sink: Arc<dyn NotificationSink>,
    sessions: RwLock<HashMap<Uuid, Arc<MonitorSession>>>,
}

impl SessionRegistry {
    pub fn new(config: MonitorConfig, sink: Arc<dyn NotificationSink>) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    pub async fn create(&self) -> Result<Arc<MonitorSession>, MonitorError> {
        let session = Arc::new(MonitorSession::new(&self.config, Arc::clone(&self.sink))?);
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id(), Arc::clone(&session));
        gauge!("monitor_active_sessions").set(sessions.len() as f64);
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<MonitorSession>, MonitorError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(MonitorError::SessionNotFound(id))
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect();
        infos.sort_by_key(|i| i.started_at);
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove a session, flushing its pending sends
    pub async fn close(&self, id: Uuid) -> Result<SessionInfo, MonitorError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.remove(&id).ok_or(MonitorError::SessionNotFound(id))?;
            gauge!("monitor_active_sessions").set(sessions.len() as f64);
            session
        };
        Ok(session.close().await)
    }

    /// Close every session
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        gauge!("monitor_active_sessions").set(0.0);
        info!(sessions = drained.len(), "Closing all sessions");
        for session in drained {
            session.close().await;
        }
    }
}
