//! Request/response correlation for cluster operations that need every peer to answer
//! before completing (broadcast-with-ack, fetch-sockets, server-side-emit-with-ack).
//! Grounded on `crate::adapter::LocalAdapter`'s own `pending_acks: HashMap<u64,
//! PendingBroadcastAck>` pattern in `sio-core`, generalized from "one entry per socket" to
//! "one entry per peer server" and parameterized over the response item type.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

struct PendingRequest<T> {
    missing: HashSet<String>,
    responses: Vec<T>,
    resolve: Option<oneshot::Sender<Vec<T>>>,
}

/// Tracks in-flight cluster requests by an opaque string id. A request completes the
/// moment every peer it knew about at creation time has either replied or been credited as
/// missing (peer timeout, adapter shutdown).
pub struct RequestTracker<T> {
    counter: AtomicU64,
    pending: Mutex<HashMap<String, PendingRequest<T>>>,
}

impl<T: Send + 'static> Default for RequestTracker<T> {
    fn default() -> Self {
        RequestTracker {
            counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Send + 'static> RequestTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_request_id(&self) -> String {
        format!("req-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a new pending request expecting one reply from each of `known_peers`.
    /// Returns the receiving half of its resolution channel; the sender side resolves
    /// exactly once, either when every peer has answered or when forced via
    /// `resolve_partial` (ack timeout).
    pub fn begin(&self, request_id: impl Into<String>, known_peers: Vec<String>) -> oneshot::Receiver<Vec<T>> {
        let (tx, rx) = oneshot::channel();
        if known_peers.is_empty() {
            let _ = tx.send(Vec::new());
            return rx;
        }
        self.pending.lock().unwrap().insert(
            request_id.into(),
            PendingRequest {
                missing: known_peers.into_iter().collect(),
                responses: Vec::new(),
                resolve: Some(tx),
            },
        );
        rx
    }

    /// `peer` replied to `request_id` with `item`; resolves the request once it was the
    /// last peer still outstanding. A reply from a peer not in `missing` (a duplicate, or a
    /// reply to an already-resolved/unknown request) is dropped.
    pub fn record_response(&self, request_id: &str, peer: &str, item: T) {
        let mut pending = self.pending.lock().unwrap();
        let done = match pending.get_mut(request_id) {
            Some(entry) if entry.missing.contains(peer) => {
                entry.missing.remove(peer);
                entry.responses.push(item);
                entry.missing.is_empty()
            }
            _ => false,
        };
        if done {
            Self::finish(&mut pending, request_id);
        }
    }

    /// `peer` disappeared (heartbeat timeout or `ADAPTER_CLOSE`); credit it as a
    /// zero-response reply on every request still waiting on it so none of them hang.
    pub fn credit_peer_as_missing(&self, peer: &str) {
        let mut pending = self.pending.lock().unwrap();
        let completed: Vec<String> = pending
            .iter_mut()
            .filter_map(|(id, entry)| (entry.missing.remove(peer) && entry.missing.is_empty()).then(|| id.clone()))
            .collect();
        for id in completed {
            Self::finish(&mut pending, &id);
        }
    }

    /// Force-resolve `request_id` with whatever responses arrived so far (ack timeout).
    /// A no-op if the request already resolved — timer-fired completion is idempotent
    /// w.r.t. record deletion.
    pub fn resolve_partial(&self, request_id: &str) {
        let mut pending = self.pending.lock().unwrap();
        Self::finish(&mut pending, request_id);
    }

    fn finish(pending: &mut HashMap<String, PendingRequest<T>>, request_id: &str) {
        if let Some(mut entry) = pending.remove(request_id) {
            if let Some(resolve) = entry.resolve.take() {
                let _ = resolve.send(std::mem::take(&mut entry.responses));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_once_every_known_peer_replies() {
        let tracker: RequestTracker<u64> = RequestTracker::new();
        let rx = tracker.begin("r1", vec!["a".into(), "b".into()]);
        tracker.record_response("r1", "a", 1);
        tracker.record_response("r1", "b", 2);
        let mut responses = rx.await.unwrap();
        responses.sort_unstable();
        assert_eq!(responses, vec![1, 2]);
    }

    #[tokio::test]
    async fn missing_peer_is_credited_as_zero_response() {
        let tracker: RequestTracker<u64> = RequestTracker::new();
        let rx = tracker.begin("r1", vec!["a".into(), "b".into()]);
        tracker.record_response("r1", "a", 1);
        tracker.credit_peer_as_missing("b");
        assert_eq!(rx.await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn duplicate_reply_from_same_peer_is_dropped() {
        let tracker: RequestTracker<u64> = RequestTracker::new();
        let rx = tracker.begin("r1", vec!["a".into()]);
        tracker.record_response("r1", "a", 1);
        tracker.record_response("r1", "a", 2);
        assert_eq!(rx.await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn begin_with_no_known_peers_resolves_immediately() {
        let tracker: RequestTracker<u64> = RequestTracker::new();
        let rx = tracker.begin("r1", vec![]);
        assert_eq!(rx.await.unwrap(), Vec::<u64>::new());
    }

    #[tokio::test]
    async fn resolve_partial_completes_with_whatever_arrived() {
        let tracker: RequestTracker<u64> = RequestTracker::new();
        let rx = tracker.begin("r1", vec!["a".into(), "b".into()]);
        tracker.record_response("r1", "a", 1);
        tracker.resolve_partial("r1");
        assert_eq!(rx.await.unwrap(), vec![1]);
    }
}
