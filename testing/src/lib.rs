//! # Actionflow Testing
//!
//! Test fixtures for the actionflow dispatch pipeline: a recording store,
//! canned policies, middlewares, and tasks.
//!
//! ## Example
//!
//! ```ignore
//! use actionflow_testing::{RecordingStore, ok_task};
//! use actionflow_runtime::AsyncMiddleware;
//!
//! #[tokio::test]
//! async fn dispatches_request_then_response() {
//!     let store = RecordingStore::shared();
//!     let middleware = AsyncMiddleware::new(ok_task(json!({"id": 1})));
//!
//!     middleware.dispatch(&(store.clone() as _), action).await;
//!
//!     assert_eq!(store.kinds(), vec!["MY_LIST_REQUEST", "MY_LIST_RESPONSE"]);
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use serde_json::{Value, json};

use actionflow_core::chain::{Continuation, Outcome, PipelineCtx, TaskError};
use actionflow_core::middleware::RequestMiddleware;
use actionflow_core::policy::{ApplyPoint, Policy, policy_fn};
use actionflow_core::store::Store;
use actionflow_core::Action;

/// Store fixture recording every dispatched action.
#[derive(Debug, Default)]
pub struct RecordingStore {
    dispatched: Mutex<Vec<Action>>,
    state: Mutex<Value>,
}

impl RecordingStore {
    /// Create an empty recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty recording store behind an `Arc`, ready to clone into
    /// the pipeline and inspect afterwards.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every action dispatched so far, in order.
    #[must_use]
    pub fn dispatched(&self) -> Vec<Action> {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The type identifiers of every dispatched action, in order. Async
    /// actions report their request identifier.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.dispatched()
            .iter()
            .map(|action| match action {
                Action::Sync(action) => action.kind.clone(),
                Action::Async(action) => action.request_kind().to_owned(),
            })
            .collect()
    }

    /// Number of dispatched actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing was dispatched yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every recorded dispatch.
    pub fn clear(&self) {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Replace the state snapshot returned by [`Store::state`].
    pub fn set_state(&self, state: Value) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl Store for RecordingStore {
    fn dispatch(&self, action: Action) {
        self.dispatched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }

    fn state(&self) -> Value {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Policy fixture setting a boolean meta flag before passing through.
#[must_use]
pub fn tagging_policy(point: ApplyPoint, key: &str) -> Arc<dyn Policy> {
    let key = key.to_owned();
    policy_fn(point, move |_store, mut ctx, next| {
        ctx.action.meta.insert(key.clone(), json!(true));
        next(ctx)
    })
}

/// Policy fixture that never calls `next`, yielding a fixed outcome.
#[must_use]
pub fn short_circuit_policy(point: ApplyPoint, outcome: Outcome) -> Arc<dyn Policy> {
    policy_fn(point, move |_store, _ctx, _next| {
        let outcome = outcome.clone();
        Box::pin(async move { outcome })
    })
}

/// Policy fixture appending a label to a shared log before passing through.
#[must_use]
pub fn recording_policy(
    point: ApplyPoint,
    log: &Arc<Mutex<Vec<String>>>,
    label: &str,
) -> Arc<dyn Policy> {
    let log = Arc::clone(log);
    let label = label.to_owned();
    policy_fn(point, move |_store, ctx, next| {
        log.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(label.clone());
        next(ctx)
    })
}

/// Task fixture resolving with a fixed response value.
#[must_use]
pub fn ok_task(response: Value) -> Arc<dyn actionflow_runtime::AsyncTask> {
    actionflow_runtime::task_fn(move |_store, _options| {
        let response = response.clone();
        Box::pin(async move { Ok(Some(response)) })
    })
}

/// Task fixture failing with a fixed error.
#[must_use]
pub fn err_task(error: TaskError) -> Arc<dyn actionflow_runtime::AsyncTask> {
    actionflow_runtime::task_fn(move |_store, _options| {
        let error = error.clone();
        Box::pin(async move { Err(error) })
    })
}

/// Task fixture that never resolves. Pair with a timeout to assert that a
/// hook short-circuited before the task.
#[must_use]
pub fn pending_task() -> Arc<dyn actionflow_runtime::AsyncTask> {
    actionflow_runtime::task_fn(|_store, _options| Box::pin(futures::future::pending::<Outcome>()))
}

/// Middleware fixture stamping both checkpoints into the action's meta.
#[derive(Debug, Default)]
pub struct TaggingMiddleware;

impl RequestMiddleware for TaggingMiddleware {
    fn on_request(
        self: Arc<Self>,
        _store: Arc<dyn Store>,
        mut ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        ctx.action.meta.insert("on_request".to_owned(), json!(true));
        next(ctx)
    }

    fn on_response(
        self: Arc<Self>,
        _store: Arc<dyn Store>,
        mut ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        ctx.action.meta.insert("on_response".to_owned(), json!(true));
        next(ctx)
    }
}

/// Middleware fixture appending checkpoint labels to a shared log.
#[derive(Debug)]
pub struct RecordingMiddleware {
    log: Arc<Mutex<Vec<String>>>,
    label: String,
}

impl RecordingMiddleware {
    /// Middleware logging `{label}:request` and `{label}:response`.
    #[must_use]
    pub fn new(log: &Arc<Mutex<Vec<String>>>, label: impl Into<String>) -> Self {
        Self {
            log: Arc::clone(log),
            label: label.into(),
        }
    }

    fn record(&self, checkpoint: &str) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("{}:{checkpoint}", self.label));
    }
}

impl RequestMiddleware for RecordingMiddleware {
    fn on_request(
        self: Arc<Self>,
        _store: Arc<dyn Store>,
        ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        self.record("request");
        next(ctx)
    }

    fn on_response(
        self: Arc<Self>,
        _store: Arc<dyn Store>,
        ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        self.record("response");
        next(ctx)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use actionflow_core::SyncAction;

    #[test]
    fn recording_store_tracks_dispatches() {
        let store = RecordingStore::new();
        assert!(store.is_empty());

        store.dispatch(Action::Sync(SyncAction::new("FIRST")));
        store.dispatch(Action::Sync(SyncAction::new("SECOND")));

        assert_eq!(store.kinds(), vec!["FIRST", "SECOND"]);
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn recording_store_serves_a_state_snapshot() {
        let store = RecordingStore::new();
        assert_eq!(store.state(), Value::Null);

        store.set_state(json!({ "user": "alice" }));
        assert_eq!(store.state(), json!({ "user": "alice" }));
    }

    #[tokio::test]
    async fn canned_tasks_resolve_with_their_outcomes() {
        use actionflow_core::Meta;
        use actionflow_runtime::{AsyncTask, TaskOptions};

        let store: Arc<dyn Store> = RecordingStore::shared();
        let options = || TaskOptions {
            payload: None,
            meta: Meta::new(),
        };

        let outcome = ok_task(json!("OK"))
            .run(Arc::clone(&store), options())
            .await;
        assert_eq!(outcome, Ok(Some(json!("OK"))));

        let outcome = err_task(TaskError::new("boom"))
            .run(Arc::clone(&store), options())
            .await;
        assert_eq!(outcome, Err(TaskError::new("boom")));
    }
}
