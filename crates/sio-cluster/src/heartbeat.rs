//! Peer membership tracking via heartbeat. Grounded
//! on `examples/iwismer-rusty-timer/services/forwarder/src/uplink.rs`'s hello/heartbeat
//! handshake shape and `services/server/src/ws_forwarder.rs`'s `tokio::time::interval`
//! heartbeat loop, generalized from a single fixed peer to an open membership set.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// Last-seen timestamps for every peer server this adapter has heard a heartbeat from.
/// Swept on a timer; a peer not seen within `timeout` is dropped and its outstanding
/// requests are credited as if it had replied with zero clients.
pub struct Membership {
    timeout: Duration,
    last_seen: RwLock<HashMap<String, Instant>>,
}

impl Membership {
    pub fn new(timeout: Duration) -> Self {
        Membership {
            timeout,
            last_seen: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record(&self, uid: &str) {
        let is_new = !self.last_seen.read().await.contains_key(uid);
        self.last_seen.write().await.insert(uid.to_owned(), Instant::now());
        if is_new {
            debug!(peer = uid, "peer joined cluster");
        }
    }

    pub async fn forget(&self, uid: &str) {
        self.last_seen.write().await.remove(uid);
    }

    pub async fn known_peers(&self) -> Vec<String> {
        self.last_seen.read().await.keys().cloned().collect()
    }

    pub async fn peer_count(&self) -> u64 {
        self.last_seen.read().await.len() as u64
    }

    /// Drop peers not heard from within `timeout`; returns the uids removed so the caller
    /// can credit their outstanding requests as zero-response.
    pub async fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut last_seen = self.last_seen.write().await;
        let expired: Vec<String> = last_seen
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > self.timeout)
            .map(|(uid, _)| uid.clone())
            .collect();
        for uid in &expired {
            last_seen.remove(uid);
            debug!(peer = uid, "peer expired, removing from membership");
        }
        expired
    }
}

/// Tracks whether this server has published anything recently, so the periodic heartbeat
/// only fires when quiet: it is refreshable and republishes once the interval elapses
/// without other activity.
pub struct HeartbeatTimer {
    interval: Duration,
    last_activity: RwLock<Instant>,
}

impl HeartbeatTimer {
    pub fn new(interval: Duration) -> Self {
        HeartbeatTimer {
            interval,
            last_activity: RwLock::new(Instant::now()),
        }
    }

    pub async fn refresh(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    pub async fn should_fire(&self) -> bool {
        self.last_activity.read().await.elapsed() >= self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_peers_are_swept_and_reported() {
        let membership = Membership::new(Duration::from_millis(10));
        membership.record("peer-a").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let expired = membership.sweep_expired().await;
        assert_eq!(expired, vec!["peer-a".to_owned()]);
        assert_eq!(membership.peer_count().await, 0);
    }

    #[tokio::test]
    async fn fresh_peers_are_not_swept() {
        let membership = Membership::new(Duration::from_secs(60));
        membership.record("peer-a").await;
        assert!(membership.sweep_expired().await.is_empty());
        assert_eq!(membership.peer_count().await, 1);
    }

    #[tokio::test]
    async fn heartbeat_timer_fires_only_after_interval() {
        let timer = HeartbeatTimer::new(Duration::from_millis(20));
        assert!(!timer.should_fire().await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(timer.should_fire().await);
        timer.refresh().await;
        assert!(!timer.should_fire().await);
    }
}
