//! Demonstration binary wiring `sio-core`'s `Server` over an in-memory transport and,
//! optionally, `sio-cluster`'s multi-process adapter over an in-memory pub/sub. Grounded on
//! `services/server/src/main.rs`'s tracing-init / graceful-shutdown skeleton; real
//! transport and HTTP are out of scope for this demonstration, so this binary stands in for
//! them with `sio-testkit`'s mock transport and pub/sub rather than fabricating a
//! dependency on axum/WebSocket.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use sio_cluster::{load_cluster_config, ClusterAdapter};
use sio_core::{load_server_config, Adapter, ConnectAttempt, LocalAdapter, Server};
use sio_protocol::Value;
use sio_testkit::{MockPubSub, MockTransport};

const DEMO_NAMESPACE: &str = "/";

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let cluster_enabled = env::var("SIO_CLUSTER").map(|v| v == "1").unwrap_or(false);
    let config_path = env::var("SIO_CONFIG").ok();
    let cluster_config_path = env::var("SIO_CLUSTER_CONFIG").ok();

    let server_config = load_server_config(config_path.as_deref()).expect("failed to load server config");
    let cluster_config = load_cluster_config(cluster_config_path.as_deref()).expect("failed to load cluster config");

    let cluster_adapter = if cluster_enabled {
        info!("cluster mode enabled; wiring an in-memory pub/sub, since no real backend is in scope");
        let pubsub = Arc::new(MockPubSub::new());
        let adapter = ClusterAdapter::new(DEMO_NAMESPACE, pubsub, cluster_config)
            .await
            .expect("failed to start cluster adapter");
        Some(adapter)
    } else {
        None
    };

    let demo_adapter: Arc<dyn Adapter> = match &cluster_adapter {
        Some(cluster) => cluster.clone(),
        None => Arc::new(LocalAdapter::new()),
    };
    let mut adapters: HashMap<String, Arc<dyn Adapter>> = HashMap::new();
    adapters.insert(DEMO_NAMESPACE.to_owned(), demo_adapter);

    let server = Server::new(server_config, move |name| {
        adapters.get(name).cloned().unwrap_or_else(|| Arc::new(LocalAdapter::new()) as Arc<dyn Adapter>)
    });

    let ns = server.of(DEMO_NAMESPACE).await;
    if let Some(cluster) = &cluster_adapter {
        cluster.bind_registry(&ns);
        cluster.spawn_heartbeat_loop();
    }

    ns.on_connection(|socket| {
        info!(socket = %socket.id, "socket connected");
        socket.on("message", |args| {
            info!(?args, "received message event");
        });
    })
    .await;

    let (transport, mut outbox) = MockTransport::new("demo-client-1", 4);
    let attempt = ConnectAttempt {
        namespace: DEMO_NAMESPACE.to_owned(),
        auth: Value::Null,
        protocol_version: 4,
        recovery: None,
    };
    match server.handle_connection(Arc::new(transport), attempt).await {
        Ok(socket) => {
            tokio::spawn(async move {
                while let Some(bufs) = outbox.recv().await {
                    info!(?bufs, "wrote buffers to demo transport");
                }
            });
            let _ = socket.emit("welcome", vec![Value::string("hello from sio-gateway")]).await;
        }
        Err(e) => tracing::warn!(error = %e, "demo connection was rejected"),
    }

    server.spawn_session_sweep();

    info!("sio-gateway running, press ctrl-c to shut down");
    sio_core::run_until_shutdown(server).await;
    if let Some(cluster) = cluster_adapter {
        cluster.shutdown().await;
    }
    info!("sio-gateway shut down gracefully");
}
