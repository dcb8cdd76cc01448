//! Named-event listener registry.
//!
//! Listeners are plain synchronous closures over the decoded argument list; nothing here
//! is `async` because emission must never block on listener completion deadlocking back
//! into the emitter, and a listener may itself re-enter the emitter while still running. A
//! listener that needs to do async work spawns its own task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use sio_protocol::Value;

pub type Callback = Arc<dyn Fn(&[Value]) + Send + Sync>;

#[derive(Clone)]
struct Listener {
    id: u64,
    once: bool,
    callback: Callback,
}

/// A listener id returned by `on`/`once`/`on_any`, usable with the matching `off*` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<HashMap<String, Vec<Listener>>>,
    any: RwLock<Vec<Listener>>,
    any_outgoing: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn on(&self, event: impl Into<String>, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.add_listener(event, callback, false, false)
    }

    pub fn once(&self, event: impl Into<String>, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        self.add_listener(event, callback, true, false)
    }

    pub fn prepend_listener(
        &self,
        event: impl Into<String>,
        callback: impl Fn(&[Value]) + Send + Sync + 'static,
    ) -> ListenerId {
        self.add_listener(event, callback, false, true)
    }

    fn add_listener(
        &self,
        event: impl Into<String>,
        callback: impl Fn(&[Value]) + Send + Sync + 'static,
        once: bool,
        prepend: bool,
    ) -> ListenerId {
        let id = self.alloc_id();
        let listener = Listener {
            id,
            once,
            callback: Arc::new(callback),
        };
        let mut map = self.listeners.write().unwrap();
        let entry = map.entry(event.into()).or_default();
        if prepend {
            entry.insert(0, listener);
        } else {
            entry.push(listener);
        }
        ListenerId(id)
    }

    pub fn off(&self, event: &str, id: ListenerId) {
        if let Some(entry) = self.listeners.write().unwrap().get_mut(event) {
            entry.retain(|l| l.id != id.0);
        }
    }

    pub fn off_all(&self, event: &str) {
        self.listeners.write().unwrap().remove(event);
    }

    pub fn on_any(&self, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.any.write().unwrap().push(Listener {
            id,
            once: false,
            callback: Arc::new(callback),
        });
        ListenerId(id)
    }

    pub fn off_any(&self, id: ListenerId) {
        self.any.write().unwrap().retain(|l| l.id != id.0);
    }

    pub fn on_any_outgoing(&self, callback: impl Fn(&[Value]) + Send + Sync + 'static) -> ListenerId {
        let id = self.alloc_id();
        self.any_outgoing.write().unwrap().push(Listener {
            id,
            once: false,
            callback: Arc::new(callback),
        });
        ListenerId(id)
    }

    pub fn off_any_outgoing(&self, id: ListenerId) {
        self.any_outgoing.write().unwrap().retain(|l| l.id != id.0);
    }

    /// Invoke every listener registered for `event` with `args`, then every `on_any`
    /// listener. Snapshots the listener list before invoking so a listener that adds or
    /// removes listeners mid-emission (including removing itself, the `once` case) does
    /// not corrupt iteration or get invoked twice.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let snapshot: Vec<Listener> = {
            let mut map = self.listeners.write().unwrap();
            let Some(entry) = map.get_mut(event) else {
                return self.emit_any(event, args);
            };
            let snapshot = entry.clone();
            entry.retain(|l| !l.once);
            snapshot
        };
        for listener in &snapshot {
            (listener.callback.as_ref())(args);
        }
        self.emit_any(event, args);
    }

    fn emit_any(&self, event: &str, args: &[Value]) {
        let snapshot: Vec<Listener> = self.any.read().unwrap().clone();
        if snapshot.is_empty() {
            return;
        }
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::string(event));
        full.extend_from_slice(args);
        for listener in &snapshot {
            (listener.callback.as_ref())(&full);
        }
    }

    pub fn emit_outgoing(&self, event: &str, args: &[Value]) {
        let snapshot: Vec<Listener> = self.any_outgoing.read().unwrap().clone();
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::string(event));
        full.extend_from_slice(args);
        for listener in &snapshot {
            (listener.callback.as_ref())(&full);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn once_listener_fires_exactly_one_time() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        emitter.once("ping", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        emitter.emit("ping", &[]);
        emitter.emit("ping", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_any_receives_event_name_and_args() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let s = seen.clone();
        emitter.on_any(move |args| {
            s.lock().unwrap().push(args.to_vec());
        });
        emitter.emit("chat", &[Value::string("hi")]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0][0], Value::string("chat"));
        assert_eq!(seen[0][1], Value::string("hi"));
    }

    #[test]
    fn reentrant_emit_does_not_deadlock() {
        let emitter = Arc::new(EventEmitter::new());
        let e = emitter.clone();
        emitter.on("a", move |_| {
            e.emit("b", &[]);
        });
        emitter.on("b", |_| {});
        emitter.emit("a", &[]);
    }

    #[test]
    fn off_removes_only_the_targeted_listener() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let id = emitter.on("x", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        emitter.on("x", move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });
        emitter.off("x", id);
        emitter.emit("x", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
