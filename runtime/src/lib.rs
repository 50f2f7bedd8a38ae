//! # Actionflow Runtime
//!
//! The dispatch pipeline for asynchronous actions.
//!
//! [`AsyncMiddleware`] sits in front of a [`Store`]: synchronous actions pass
//! straight through, asynchronous actions run the full pipeline — dispatch
//! the request action, execute the hooks and the task, then dispatch the
//! response action carrying the task's result or error.
//!
//! ## Pipeline order
//!
//! ```text
//! dispatch(REQUEST)
//!   -> middleware on_request hooks (meta.middlewares order)
//!   -> beforeRequest policies (meta.policies order)
//!   -> task
//!   -> beforeResponse policies
//!   -> middleware on_response hooks
//!   -> dispatch(RESPONSE)
//! ```
//!
//! Every hook receives the next continuation; a hook that returns without
//! invoking it short-circuits everything downstream, including the task and
//! the response dispatch.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use actionflow_core::chain::{Completion, Continuation, Outcome, PipelineCtx, compose};
use actionflow_core::middleware::MiddlewareRegistry;
use actionflow_core::policy::{ApplyPoint, PolicyRegistry};
use actionflow_core::store::Store;
use actionflow_core::{Action, AsyncAction, Meta, SyncAction};

/// Call-time view of an asynchronous action handed to the task.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    /// Action payload, if any.
    pub payload: Option<Value>,

    /// Action metadata after every request hook ran.
    pub meta: Meta,
}

impl TaskOptions {
    /// The `meta.url` string, if present.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.meta.get("url").and_then(Value::as_str)
    }

    /// The `meta.method` string, if present.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.meta.get("method").and_then(Value::as_str)
    }
}

/// The effectful work an asynchronous action describes, typically an API
/// call. Failure is a value: return `Err` inside the [`Outcome`], never
/// panic.
pub trait AsyncTask: Send + Sync {
    /// Execute the task for one action.
    fn run(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        options: TaskOptions,
    ) -> BoxFuture<'static, Outcome>;
}

struct FnTask<F> {
    run: F,
}

impl<F> AsyncTask for FnTask<F>
where
    F: Fn(Arc<dyn Store>, TaskOptions) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
{
    fn run(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        options: TaskOptions,
    ) -> BoxFuture<'static, Outcome> {
        (self.run)(store, options)
    }
}

/// Build a task from a closure.
pub fn task_fn<F>(run: F) -> Arc<dyn AsyncTask>
where
    F: Fn(Arc<dyn Store>, TaskOptions) -> BoxFuture<'static, Outcome> + Send + Sync + 'static,
{
    Arc::new(FnTask { run })
}

/// What the middleware did with one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    /// A synchronous action, forwarded to the store untouched.
    Forwarded,

    /// An asynchronous action, executed to completion by the pipeline.
    Completed(Outcome),
}

impl Dispatched {
    /// Whether the action bypassed the pipeline.
    #[must_use]
    pub const fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded)
    }

    /// The pipeline outcome; forwarded actions map to an empty success.
    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Forwarded => Ok(None),
            Self::Completed(outcome) => outcome,
        }
    }
}

/// The async dispatch pipeline.
///
/// Owns the task plus the policy and middleware registries; registries are
/// injected at construction, there is no process-global state.
pub struct AsyncMiddleware {
    task: Arc<dyn AsyncTask>,
    policies: Arc<PolicyRegistry>,
    middlewares: Arc<MiddlewareRegistry>,
}

impl AsyncMiddleware {
    /// Pipeline around a task, with empty registries.
    #[must_use]
    pub fn new(task: Arc<dyn AsyncTask>) -> Self {
        Self {
            task,
            policies: Arc::new(PolicyRegistry::new()),
            middlewares: Arc::new(MiddlewareRegistry::new()),
        }
    }

    /// Use this policy registry for `meta.policies` lookup.
    #[must_use]
    pub fn with_policies(mut self, policies: Arc<PolicyRegistry>) -> Self {
        self.policies = policies;
        self
    }

    /// Use this middleware registry for `meta.middlewares` lookup.
    #[must_use]
    pub fn with_middlewares(mut self, middlewares: Arc<MiddlewareRegistry>) -> Self {
        self.middlewares = middlewares;
        self
    }

    /// Dispatch one action.
    ///
    /// Synchronous actions are forwarded to the store and nothing else
    /// happens. Asynchronous actions run the full pipeline; the request
    /// action is dispatched first, and exactly one response action follows
    /// unless a hook short-circuits.
    pub async fn dispatch(&self, store: &Arc<dyn Store>, action: Action) -> Dispatched {
        let action = match action {
            Action::Sync(action) => {
                store.dispatch(Action::Sync(action));
                return Dispatched::Forwarded;
            },
            Action::Async(action) => action,
        };

        tracing::debug!(
            request = %action.request_kind(),
            response = %action.response_kind(),
            "executing async action"
        );
        store.dispatch(Action::Sync(request_action(&action)));

        let runner = self.policies.runner(&action.policy_names());
        let middleware_names = action.middleware_names();

        // built innermost first: the response dispatch, wrapped by
        // beforeResponse policies, the task, beforeRequest policies, and
        // finally the on_request hooks outermost
        let respond = respond_terminal(store);
        let respond = compose(
            self.middlewares.response_links(&middleware_names),
            store,
            respond,
        );
        let respond = runner.chain(ApplyPoint::BeforeResponse, store, respond);
        let execute = execute_link(Arc::clone(&self.task), store, respond);
        let execute = runner.chain(ApplyPoint::BeforeRequest, store, execute);
        let chain = compose(
            self.middlewares.request_links(&middleware_names),
            store,
            execute,
        );

        Dispatched::Completed(chain(PipelineCtx::new(action)).await)
    }
}

/// The request action dispatched when an async action enters the pipeline.
fn request_action(action: &AsyncAction) -> SyncAction {
    let mut request = SyncAction::new(action.request_kind()).with_meta(action.meta.clone());
    if let Some(payload) = &action.payload {
        request = request.with_payload(payload.clone());
    }
    request
}

/// Chain link running the task and recording its completion in the context.
fn execute_link(
    task: Arc<dyn AsyncTask>,
    store: &Arc<dyn Store>,
    respond: Continuation,
) -> Continuation {
    let store = Arc::clone(store);
    Box::new(move |mut ctx| {
        Box::pin(async move {
            let options = TaskOptions {
                payload: ctx.action.payload.clone(),
                meta: ctx.action.meta.clone(),
            };
            let outcome = task.run(Arc::clone(&store), options).await;
            ctx.completion = Completion::from(outcome);
            respond(ctx).await
        })
    })
}

/// Terminal continuation: dispatch the response action carrying the task's
/// result or error, then yield the outcome back up the chain.
fn respond_terminal(store: &Arc<dyn Store>) -> Continuation {
    let store = Arc::clone(store);
    Box::new(move |ctx| {
        Box::pin(async move {
            let outcome = ctx.completion.into_outcome();
            let mut response =
                SyncAction::new(ctx.action.response_kind()).with_meta(ctx.action.meta.clone());
            match &outcome {
                Ok(Some(value)) => response = response.with_payload(value.clone()),
                Ok(None) => {},
                Err(error) => {
                    tracing::debug!(
                        response = %response.kind,
                        error = %error,
                        "async action failed"
                    );
                    response = response.with_payload(error.to_payload()).with_error(true);
                },
            }
            store.dispatch(Action::Sync(response));
            outcome
        })
    })
}
