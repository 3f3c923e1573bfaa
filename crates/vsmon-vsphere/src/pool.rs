use crate::api::{
    ConnectOptions, Connector, CounterDescriptor, EntityMetricResult, QuerySpec, VsphereApi,
};
use crate::entity::Infrastructure;
use crate::error::{Result, VsphereError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

/// Who a session is bound to. Each collection worker keeps its own session
/// for the lifetime of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    Orchestrator,
    Worker(usize),
}

/// Lazily connected sessions, one per [`SessionKey`].
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    options: Arc<ConnectOptions>,
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>, options: ConnectOptions) -> Self {
        Self {
            connector,
            options: Arc::new(options),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &str {
        &self.options.host
    }

    /// Return the session bound to `key`, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns [`VsphereError::Connection`] if connecting or the liveness
    /// check fails. Nothing is cached in that case, so the next call retries.
    pub async fn session(&self, key: SessionKey) -> Result<Arc<Session>> {
        let existing = self.lock_sessions().get(&key).cloned();
        if let Some(session) = existing {
            return Ok(session);
        }

        let api = open(self.connector.as_ref(), &self.options).await?;
        tracing::debug!(host = %self.options.host, session = ?key, "Session connected");
        let session = Arc::new(Session {
            key,
            connector: Arc::clone(&self.connector),
            options: Arc::clone(&self.options),
            api: RwLock::new(Arc::from(api)),
        });

        let mut sessions = self.lock_sessions();
        Ok(Arc::clone(sessions.entry(key).or_insert(session)))
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions().len()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<SessionKey, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn open(connector: &dyn Connector, options: &ConnectOptions) -> Result<Box<dyn VsphereApi>> {
    let connection_error = |e: anyhow::Error| VsphereError::Connection {
        host: options.host.clone(),
        message: format!("{e:#}"),
    };

    let api = connector.connect(options).await.map_err(connection_error)?;
    // Some servers accept the login but fail every later call; check liveness once.
    api.current_time().await.map_err(connection_error)?;
    Ok(api)
}

/// A connected session. Every call is retried once on a fresh connection.
pub struct Session {
    key: SessionKey,
    connector: Arc<dyn Connector>,
    options: Arc<ConnectOptions>,
    api: RwLock<Arc<dyn VsphereApi>>,
}

impl Session {
    pub async fn get_infrastructure(&self) -> Result<Infrastructure> {
        self.smart_retry("get_infrastructure", |api| async move {
            api.get_infrastructure().await
        })
        .await
    }

    pub async fn get_perf_counters_by_level(&self, level: u8) -> Result<Vec<CounterDescriptor>> {
        self.smart_retry("get_perf_counters_by_level", |api| async move {
            api.get_perf_counters_by_level(level).await
        })
        .await
    }

    pub async fn get_max_query_metrics(&self) -> Result<i64> {
        self.smart_retry("get_max_query_metrics", |api| async move {
            api.get_max_query_metrics().await
        })
        .await
    }

    pub async fn query_metrics(&self, specs: &[QuerySpec]) -> Result<Vec<EntityMetricResult>> {
        self.smart_retry("query_metrics", |api| {
            let specs = specs.to_vec();
            async move { api.query_metrics(&specs).await }
        })
        .await
    }

    /// Run `call`; on failure reconnect and run it exactly once more.
    async fn smart_retry<T, F, Fut>(&self, name: &str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn VsphereApi>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let api = Arc::clone(&*self.api.read().await);
        let first_error = match call(api).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        tracing::warn!(
            session = ?self.key,
            call = name,
            error = %first_error,
            "vSphere call failed, reconnecting and retrying"
        );

        let fresh: Arc<dyn VsphereApi> = Arc::from(open(self.connector.as_ref(), &self.options).await?);
        *self.api.write().await = Arc::clone(&fresh);
        call(fresh).await.map_err(VsphereError::Api)
    }
}
