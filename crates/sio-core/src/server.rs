//! Connection intake and namespace registry. Grounded on
//! `examples/iwismer-rusty-timer/services/server/src/main.rs`'s tracing-init-plus-
//! graceful-shutdown shape, generalized from one fixed websocket loop into a namespace
//! registry that can own many.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::adapter::Adapter;
use crate::error::AdmissionError;
use crate::ids::{Offset, PrivateSessionId};
use crate::namespace::Namespace;
use crate::parent_namespace::ParentNamespace;
use crate::room::BroadcastOptions;
use crate::session::SessionStore;
use crate::socket::{RetryPolicy, Socket};
use crate::transport::Transport;
use sio_protocol::Value;

/// The minimum protocol version this server accepts; older connections are rejected
/// outright rather than attempting a downgrade.
pub const MIN_SUPPORTED_PROTOCOL_VERSION: u8 = 4;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub connect_timeout: Duration,
    pub max_disconnection_duration: Duration,
    pub recovery_enabled: bool,
    pub retry_policy: Option<RetryPolicy>,
    pub session_sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            connect_timeout: Duration::from_secs(45),
            max_disconnection_duration: Duration::from_secs(2 * 60),
            recovery_enabled: false,
            retry_policy: None,
            session_sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Everything a freshly-accepted transport needs resolved before admission can run: the
/// namespace it asked for, any auth payload, its declared protocol version, and — for a
/// reconnecting client — the private session id and replay offset it presented.
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub namespace: String,
    pub auth: Value,
    pub protocol_version: u8,
    pub recovery: Option<(PrivateSessionId, Option<Offset>)>,
}

/// Parse a legacy (pre-v4) query string into a `Value::Object`, collapsing repeated keys
/// into a `Value::Array` so no information from a multi-valued key is dropped (the Open
/// Question decision recorded in DESIGN.md).
pub fn parse_legacy_query(query: &str) -> Value {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("").to_owned();
        let value = parts.next().unwrap_or("").to_owned();
        pairs.push((key, value));
    }
    let mut grouped: Vec<(String, Vec<Value>)> = Vec::new();
    for (key, value) in pairs {
        if let Some(entry) = grouped.iter_mut().find(|(k, _)| *k == key) {
            entry.1.push(Value::string(value));
        } else {
            grouped.push((key, vec![Value::string(value)]));
        }
    }
    Value::Object(
        grouped
            .into_iter()
            .map(|(k, mut values)| {
                let v = if values.len() == 1 { values.pop().unwrap() } else { Value::Array(values) };
                (k, v)
            })
            .collect(),
    )
}

type AdapterFactory = Arc<dyn Fn(&str) -> Arc<dyn Adapter> + Send + Sync>;

/// Owns every namespace (static and dynamic) and demultiplexes newly accepted transports
/// onto them. Does not own transports itself; callers hand in an already-accepted
/// `Arc<dyn Transport>` plus its parsed `ConnectAttempt`.
pub struct Server {
    config: ServerConfig,
    adapter_factory: AdapterFactory,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    parent_namespaces: RwLock<Vec<Arc<ParentNamespace>>>,
    session_store: Option<Arc<SessionStore>>,
}

impl Server {
    pub fn new(config: ServerConfig, adapter_factory: impl Fn(&str) -> Arc<dyn Adapter> + Send + Sync + 'static) -> Arc<Self> {
        let session_store = config
            .recovery_enabled
            .then(|| Arc::new(SessionStore::new(config.max_disconnection_duration)));
        Arc::new(Server {
            config,
            adapter_factory: Arc::new(adapter_factory),
            namespaces: RwLock::new(HashMap::new()),
            parent_namespaces: RwLock::new(Vec::new()),
            session_store,
        })
    }

    pub fn session_store(&self) -> Option<Arc<SessionStore>> {
        self.session_store.clone()
    }

    /// Get or lazily create the static namespace named `name`.
    pub async fn of(&self, name: impl Into<String>) -> Arc<Namespace> {
        let name = name.into();
        if let Some(ns) = self.namespaces.read().await.get(&name) {
            return ns.clone();
        }
        let mut namespaces = self.namespaces.write().await;
        if let Some(ns) = namespaces.get(&name) {
            return ns.clone();
        }
        let adapter = (self.adapter_factory.as_ref())(&name);
        let ns = Namespace::new(name.clone(), adapter, self.config.retry_policy, self.config.recovery_enabled);
        namespaces.insert(name, ns.clone());
        ns
    }

    pub async fn register_dynamic(&self, parent: Arc<ParentNamespace>) {
        self.parent_namespaces.write().await.push(parent);
    }

    async fn resolve_namespace(&self, name: &str, auth: &Value) -> Option<Arc<Namespace>> {
        if let Some(ns) = self.namespaces.read().await.get(name) {
            return Some(ns.clone());
        }
        for parent in self.parent_namespaces.read().await.iter() {
            if let Some(ns) = parent.child_namespace(name, auth).await {
                return Some(ns);
            }
        }
        None
    }

    /// Run admission for one newly accepted transport, bounded by `connect_timeout`: a
    /// connection that never completes CONNECT within that window is dropped.
    pub async fn handle_connection(self: &Arc<Self>, transport: Arc<dyn Transport>, attempt: ConnectAttempt) -> Result<Arc<Socket>, AdmissionError> {
        let server = self.clone();
        match tokio::time::timeout(self.config.connect_timeout, server.admit(transport, attempt)).await {
            Ok(result) => result,
            Err(_) => Err(AdmissionError::new("connect timed out")),
        }
    }

    async fn admit(self: Arc<Self>, transport: Arc<dyn Transport>, attempt: ConnectAttempt) -> Result<Arc<Socket>, AdmissionError> {
        if attempt.protocol_version < MIN_SUPPORTED_PROTOCOL_VERSION {
            return Err(AdmissionError::new(format!(
                "unsupported protocol version {}, minimum is {}",
                attempt.protocol_version, MIN_SUPPORTED_PROTOCOL_VERSION
            )));
        }
        let ns = self
            .resolve_namespace(&attempt.namespace, &attempt.auth)
            .await
            .ok_or_else(|| AdmissionError::new(format!("invalid namespace: {}", attempt.namespace)))?;
        ns.add(transport, attempt.auth, attempt.recovery).await
    }

    /// Start the periodic session-expiry sweep, if recovery is enabled. Returns immediately;
    /// the sweep runs for the lifetime of the returned task.
    pub fn spawn_session_sweep(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let store = self.session_store.clone()?;
        let interval = self.config.session_sweep_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        }))
    }

    /// Force-disconnect every socket on every namespace, for graceful shutdown.
    pub async fn shutdown(&self) {
        let namespaces: Vec<Arc<Namespace>> = self.namespaces.read().await.values().cloned().collect();
        info!(count = namespaces.len(), "shutting down, disconnecting all sockets");
        for ns in namespaces {
            ns.adapter().disconnect_sockets(BroadcastOptions::new(), true, ns.as_ref()).await;
        }
    }
}

/// Await a shutdown signal (ctrl-c or, on Unix, SIGTERM) and then drive `server.shutdown()`.
/// Mirrors the reference server's own signal-driven graceful shutdown.
pub async fn run_until_shutdown(server: Arc<Server>) {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                server.shutdown().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    server.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_query_collapses_repeated_keys_into_array() {
        let v = parse_legacy_query("token=abc&tag=a&tag=b");
        if let Value::Object(map) = v {
            assert_eq!(map.get("token"), Some(&Value::string("abc")));
            assert_eq!(map.get("tag"), Some(&Value::Array(vec![Value::string("a"), Value::string("b")])));
        } else {
            panic!("expected object");
        }
    }

    #[tokio::test]
    async fn of_returns_the_same_namespace_on_repeat_calls() {
        let server = Server::new(ServerConfig::default(), |_name| Arc::new(crate::adapter::LocalAdapter::new()) as Arc<dyn Adapter>);
        let a = server.of("/chat").await;
        let b = server.of("/chat").await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn admission_rejects_unknown_namespace() {
        let server = Server::new(ServerConfig::default(), |_name| Arc::new(crate::adapter::LocalAdapter::new()) as Arc<dyn Adapter>);
        let result = server
            .resolve_namespace("/nope", &Value::Null)
            .await;
        assert!(result.is_none());
    }
}
