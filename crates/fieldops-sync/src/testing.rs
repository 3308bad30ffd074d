//! Test doubles shared by the module tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use fieldops_core::{Action, FailureKind};
use fieldops_db::MemoryStore;

use crate::remote::{RemoteFailure, RemoteOutcome, RemoteStore};
use crate::store::PendingOperationStore;

/// What the scripted remote does for a given record label.
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Succeed,
    Fail(FailureKind),
    Conflict,
    Hang(Duration),
}

/// One observed remote call.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RemoteCall {
    pub action: Action,
    pub target_key: Option<String>,
    pub label: String,
}

/// Remote store whose answers are keyed by the record's `label` field.
/// Unscripted labels succeed.
#[derive(Default)]
pub(crate) struct ScriptedRemote {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<RemoteCall>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for one permit on the returned semaphore.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let remote = ScriptedRemote {
            gate: Some(gate.clone()),
            ..Self::default()
        };
        (remote, gate)
    }

    pub fn set(&self, label: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(label.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn apply(
        &self,
        action: Action,
        target_key: Option<&str>,
        record: &Value,
        _timeout: Duration,
    ) -> RemoteOutcome {
        let label = record
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        self.calls.lock().unwrap().push(RemoteCall {
            action,
            target_key: target_key.map(str::to_string),
            label: label.clone(),
        });

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&label)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => RemoteOutcome::Success,
            Behavior::Fail(kind) => {
                RemoteOutcome::TransientFailure(RemoteFailure::new(kind, format!("{label} failed")))
            }
            Behavior::Conflict => RemoteOutcome::ConflictFailure(format!("{label} is stale")),
            Behavior::Hang(duration) => {
                tokio::time::sleep(duration).await;
                RemoteOutcome::Success
            }
        }
    }
}

/// A record the scripted remote can route on.
pub(crate) fn record(label: &str) -> Value {
    json!({ "label": label, "crew": "north-7" })
}

/// An empty store over a fresh in-memory KV.
pub(crate) async fn memory_store() -> (MemoryStore, Arc<PendingOperationStore>) {
    let kv = MemoryStore::new();
    let store = PendingOperationStore::open(Arc::new(kv.clone()), None)
        .await
        .unwrap();
    (kv, Arc::new(store))
}

/// Yields until `remote` has seen at least `n` calls.
pub(crate) async fn wait_for_calls(remote: &ScriptedRemote, n: usize) {
    for _ in 0..10_000 {
        if remote.call_count() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("remote never received {n} calls");
}
