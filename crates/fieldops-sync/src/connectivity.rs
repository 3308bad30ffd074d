//! # Connectivity Monitor
//!
//! Current online/offline snapshot plus transition notifications.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ConnectivitySource (browser event, OS netlink, test double)           │
//! │       │  on_transition(cb)                                             │
//! │       ▼                                                                 │
//! │  ConnectivityMonitor::set_state(state)                                 │
//! │       │                                                                 │
//! │       ├── unchanged? ──► nothing                                       │
//! │       │                                                                 │
//! │       ├── watch channel  ──► SyncScheduler (select! loop)              │
//! │       │                                                                 │
//! │       └── subscriber handlers, called after the lock is released       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The monitor never blocks and never awaits. Handlers must be idempotent:
//! sources are allowed to report the same transition more than once.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info};

/// Network reachability as seen by this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl From<bool> for ConnectivityState {
    fn from(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

/// Callback invoked on each transition.
pub type TransitionHandler = Arc<dyn Fn(ConnectivityState) + Send + Sync>;

/// A platform signal the monitor can be bound to.
pub trait ConnectivitySource: Send + Sync {
    /// The state right now.
    fn current_state(&self) -> ConnectivityState;

    /// Registers a callback for future transitions.
    fn on_transition(&self, callback: Box<dyn Fn(ConnectivityState) + Send + Sync>);
}

/// Opaque handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Inner {
    state: watch::Sender<ConnectivityState>,
    subscribers: Mutex<Vec<(SubscriptionToken, TransitionHandler)>>,
    next_token: AtomicU64,
}

/// Shared connectivity snapshot. Clones observe the same state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ConnectivityMonitor {
    /// Creates a monitor starting in `initial`.
    pub fn new(initial: ConnectivityState) -> Self {
        let (state, _) = watch::channel(initial);
        ConnectivityMonitor {
            inner: Arc::new(Inner {
                state,
                subscribers: Mutex::new(Vec::new()),
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a monitor bound to `source`, seeded with its current state.
    pub fn from_source(source: &dyn ConnectivitySource) -> Self {
        let monitor = Self::new(source.current_state());
        monitor.attach(source);
        monitor
    }

    /// Routes every transition reported by `source` into this monitor.
    pub fn attach(&self, source: &dyn ConnectivitySource) {
        self.set_state(source.current_state());
        let monitor = self.clone();
        source.on_transition(Box::new(move |state| {
            monitor.set_state(state);
        }));
    }

    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Feeds a new observation. Returns true if it was a transition.
    ///
    /// Repeated observations of the current state are ignored, so handlers
    /// fire once per real transition.
    pub fn set_state(&self, new_state: ConnectivityState) -> bool {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == new_state {
                false
            } else {
                *current = new_state;
                true
            }
        });

        if !changed {
            debug!(state = %new_state, "Connectivity unchanged");
            return false;
        }

        info!(state = %new_state, "Connectivity changed");

        // Snapshot under the lock, invoke outside it so a handler may
        // subscribe or unsubscribe without deadlocking.
        let handlers: Vec<TransitionHandler> = match self.inner.subscribers.lock() {
            Ok(subs) => subs.iter().map(|(_, h)| h.clone()).collect(),
            Err(poisoned) => poisoned.get_ref().iter().map(|(_, h)| h.clone()).collect(),
        };

        for handler in handlers {
            handler(new_state);
        }

        true
    }

    /// Registers a transition handler.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let handler: TransitionHandler = Arc::new(handler);

        match self.inner.subscribers.lock() {
            Ok(mut subs) => subs.push((token, handler)),
            Err(poisoned) => poisoned.into_inner().push((token, handler)),
        }

        token
    }

    /// Removes a handler. Returns false if the token was not registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subs = match self.inner.subscribers.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = subs.len();
        subs.retain(|(t, _)| *t != token);
        subs.len() != before
    }

    /// A receiver for async consumers. Marks the current state as seen.
    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.inner.state.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.subscribers.lock() {
            Ok(subs) => subs.len(),
            Err(poisoned) => poisoned.get_ref().len(),
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// A source whose transitions are driven by the test.
    #[derive(Default)]
    struct ManualSource {
        online: std::sync::atomic::AtomicBool,
        callbacks: Mutex<Vec<Box<dyn Fn(ConnectivityState) + Send + Sync>>>,
    }

    impl ManualSource {
        fn emit(&self, state: ConnectivityState) {
            self.online.store(state.is_online(), Ordering::SeqCst);
            for cb in self.callbacks.lock().unwrap().iter() {
                cb(state);
            }
        }
    }

    impl ConnectivitySource for ManualSource {
        fn current_state(&self) -> ConnectivityState {
            self.online.load(Ordering::SeqCst).into()
        }

        fn on_transition(&self, callback: Box<dyn Fn(ConnectivityState) + Send + Sync>) {
            self.callbacks.lock().unwrap().push(callback);
        }
    }

    #[test]
    fn test_handlers_fire_once_per_transition() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        monitor.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!monitor.set_state(ConnectivityState::Online));
        assert!(monitor.set_state(ConnectivityState::Offline));
        assert!(!monitor.set_state(ConnectivityState::Offline));
        assert!(monitor.set_state(ConnectivityState::Online));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(monitor.is_online());
    }

    #[test]
    fn test_unsubscribe() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let token = monitor.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(monitor.unsubscribe(token));
        assert!(!monitor.unsubscribe(token));
        monitor.set_state(ConnectivityState::Online);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let token_slot: Arc<Mutex<Option<SubscriptionToken>>> = Arc::new(Mutex::new(None));

        let inner_monitor = monitor.clone();
        let slot = token_slot.clone();
        let token = monitor.subscribe(move |_| {
            if let Some(t) = *slot.lock().unwrap() {
                inner_monitor.unsubscribe(t);
            }
        });
        *token_slot.lock().unwrap() = Some(token);

        monitor.set_state(ConnectivityState::Online);
        assert_eq!(monitor.subscriber_count(), 0);
    }

    #[test]
    fn test_attach_source() {
        let source = ManualSource::default();
        let monitor = ConnectivityMonitor::from_source(&source);
        assert!(!monitor.is_online());

        source.emit(ConnectivityState::Online);
        assert!(monitor.is_online());

        source.emit(ConnectivityState::Offline);
        assert_eq!(monitor.state(), ConnectivityState::Offline);
    }

    #[tokio::test]
    async fn test_watch_sees_transition() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let mut rx = monitor.watch();

        monitor.set_state(ConnectivityState::Online);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectivityState::Online);
    }
}
