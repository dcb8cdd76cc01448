//! Dynamic namespaces matched by predicate rather than an exact name. Children are
//! materialized lazily on first matching connection and swept
//! once their socket count returns to zero, mirroring how `Namespace` itself is a thin,
//! cheaply-recreated shell around an `Adapter`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use sio_protocol::Value;

use crate::adapter::{Adapter, SocketDetails};
use crate::error::SocketError;
use crate::namespace::Namespace;
use crate::socket::RetryPolicy;

/// Takes the connecting name and the client's auth payload, so admission to a dynamic
/// namespace can depend on both, not just the name pattern.
pub type NamespacePredicate = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;
type AdapterFactory = Arc<dyn Fn(&str) -> Arc<dyn Adapter> + Send + Sync>;
type ChildSetupHook = Arc<dyn Fn(&Arc<Namespace>) + Send + Sync>;

pub struct ParentNamespace {
    predicate: NamespacePredicate,
    adapter_factory: AdapterFactory,
    retry_policy: Option<RetryPolicy>,
    recovery_enabled: bool,
    children: RwLock<HashMap<String, Arc<Namespace>>>,
    setup_hooks: RwLock<Vec<ChildSetupHook>>,
}

impl ParentNamespace {
    pub fn new(
        predicate: impl Fn(&str, &Value) -> bool + Send + Sync + 'static,
        adapter_factory: impl Fn(&str) -> Arc<dyn Adapter> + Send + Sync + 'static,
        retry_policy: Option<RetryPolicy>,
        recovery_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(ParentNamespace {
            predicate: Arc::new(predicate),
            adapter_factory: Arc::new(adapter_factory),
            retry_policy,
            recovery_enabled,
            children: RwLock::new(HashMap::new()),
            setup_hooks: RwLock::new(Vec::new()),
        })
    }

    pub fn matches(&self, name: &str, auth: &Value) -> bool {
        (self.predicate.as_ref())(name, auth)
    }

    /// Register a hook run once against every child namespace the first time it is
    /// materialized (typically to attach the same middleware/connection handler every
    /// child should have).
    pub async fn on_child_create(&self, hook: impl Fn(&Arc<Namespace>) + Send + Sync + 'static) {
        self.setup_hooks.write().await.push(Arc::new(hook));
    }

    /// Return `name`'s namespace, creating it on first use if `name` matches this parent's
    /// predicate. Returns `None` for names this parent doesn't own.
    pub async fn child_namespace(&self, name: &str, auth: &Value) -> Option<Arc<Namespace>> {
        if !self.matches(name, auth) {
            return None;
        }
        if let Some(existing) = self.children.read().await.get(name) {
            return Some(existing.clone());
        }
        let mut children = self.children.write().await;
        if let Some(existing) = children.get(name) {
            return Some(existing.clone());
        }
        let adapter = (self.adapter_factory.as_ref())(name);
        let ns = Namespace::new(name.to_owned(), adapter, self.retry_policy, self.recovery_enabled);
        for hook in self.setup_hooks.read().await.iter() {
            (hook.as_ref())(&ns);
        }
        children.insert(name.to_owned(), ns.clone());
        Some(ns)
    }

    /// Drop children with no sockets left so a later reconnect under the same name gets a
    /// fresh namespace instead of resurrecting stale adapter state.
    pub async fn sweep_empty_children(&self) {
        let names: Vec<String> = {
            let children = self.children.read().await;
            children.keys().cloned().collect()
        };
        let mut empties = Vec::new();
        for name in names {
            let ns = self.children.read().await.get(&name).cloned();
            if let Some(ns) = ns {
                if ns.socket_count().await == 0 {
                    empties.push(name);
                }
            }
        }
        if empties.is_empty() {
            return;
        }
        let mut children = self.children.write().await;
        for name in empties {
            children.remove(&name);
        }
    }

    /// Parent namespaces do not support a namespace-wide `fetchSockets`: each child has its
    /// own adapter and there is no meaningful single set to return across all of them.
    pub fn fetch_sockets(&self) -> Result<Vec<SocketDetails>, SocketError> {
        Err(SocketError::Unsupported("fetchSockets is not supported on a parent namespace".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::LocalAdapter;

    #[tokio::test]
    async fn child_namespace_is_created_once_and_reused() {
        let parent = ParentNamespace::new(|name, _auth| name.starts_with("/dyn-"), |_name| Arc::new(LocalAdapter::new()) as Arc<dyn Adapter>, None, false);
        let a = parent.child_namespace("/dyn-1", &Value::Null).await.unwrap();
        let b = parent.child_namespace("/dyn-1", &Value::Null).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn non_matching_name_returns_none() {
        let parent = ParentNamespace::new(|name, _auth| name.starts_with("/dyn-"), |_name| Arc::new(LocalAdapter::new()) as Arc<dyn Adapter>, None, false);
        assert!(parent.child_namespace("/other", &Value::Null).await.is_none());
    }

    #[tokio::test]
    async fn sweep_drops_namespaces_with_no_sockets() {
        let parent = ParentNamespace::new(|name, _auth| name.starts_with("/dyn-"), |_name| Arc::new(LocalAdapter::new()) as Arc<dyn Adapter>, None, false);
        let ns = parent.child_namespace("/dyn-1", &Value::Null).await.unwrap();
        drop(ns);
        parent.sweep_empty_children().await;
        assert_eq!(parent.children.read().await.len(), 0);
    }

    #[tokio::test]
    async fn predicate_can_admit_or_reject_based_on_auth() {
        let parent = ParentNamespace::new(
            |name, auth| name.starts_with("/dyn-") && matches!(auth, Value::Object(o) if o.get("token").is_some()),
            |_name| Arc::new(LocalAdapter::new()) as Arc<dyn Adapter>,
            None,
            false,
        );
        assert!(parent.child_namespace("/dyn-1", &Value::Null).await.is_none());

        let authed = Value::Object(vec![("token".to_owned(), Value::string("tok"))].into_iter().collect());
        assert!(parent.child_namespace("/dyn-1", &authed).await.is_some());
    }
}
