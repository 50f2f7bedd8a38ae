//! Continuation chain composition.
//!
//! The pipeline is an ordered sequence of interceptors folded around a
//! terminal continuation. Each link receives the pipeline context and the
//! next continuation and decides whether to invoke it; a link that returns
//! without calling `next` short-circuits everything downstream and supplies
//! its own outcome. The terminal continuation's return value propagates back
//! up the chain unchanged absent short-circuiting.
//!
//! Task failure is modeled as data ([`TaskError`] inside [`Outcome`]), never
//! as a raised error crossing the async boundary.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use thiserror::Error;

use crate::action::AsyncAction;
use crate::store::Store;

/// Failure reported by a task, carried as a value through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    /// Human-readable failure description.
    pub message: String,

    /// Optional structured failure details.
    pub details: Option<Value>,
}

impl TaskError {
    /// Create a task error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Payload dispatched with the `error: true` response action.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        match &self.details {
            Some(details) => json!({ "message": self.message, "details": details }),
            None => json!({ "message": self.message }),
        }
    }
}

/// Value threaded back up the chain: the task's response on success, the
/// task error on failure.
pub type Outcome = Result<Option<Value>, TaskError>;

/// Task completion state carried through the pipeline context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Completion {
    /// The task has not run yet; this is the state at the request checkpoint.
    #[default]
    Pending,

    /// The task resolved with an optional response value.
    Success(Option<Value>),

    /// The task failed.
    Failure(TaskError),
}

impl Completion {
    /// Whether the task has not completed yet.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Convert into the chain outcome; `Pending` maps to an empty success.
    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        match self {
            Self::Pending => Ok(None),
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl From<Outcome> for Completion {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Pipeline context handed to every link in the chain.
#[derive(Debug, Clone)]
pub struct PipelineCtx {
    /// The asynchronous action being executed. Links may rewrite its
    /// metadata or payload before passing it on.
    pub action: AsyncAction,

    /// Task completion state; [`Completion::Pending`] until the task ran.
    pub completion: Completion,
}

impl PipelineCtx {
    /// Context for an action entering the pipeline.
    #[must_use]
    pub const fn new(action: AsyncAction) -> Self {
        Self {
            action,
            completion: Completion::Pending,
        }
    }
}

/// The continuation a link invokes to keep the chain going. The innermost
/// continuation is the terminal handler.
pub type Continuation = Box<dyn FnOnce(PipelineCtx) -> BoxFuture<'static, Outcome> + Send>;

/// A composable chain link: receives the store, the pipeline context, and
/// the next continuation.
pub type BoxInterceptor = Arc<
    dyn Fn(Arc<dyn Store>, PipelineCtx, Continuation) -> BoxFuture<'static, Outcome>
        + Send
        + Sync,
>;

/// Wrap a closure into a chain link.
pub fn interceptor_fn<F>(f: F) -> BoxInterceptor
where
    F: Fn(Arc<dyn Store>, PipelineCtx, Continuation) -> BoxFuture<'static, Outcome>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Fold an ordered sequence of links around a terminal continuation.
///
/// Links execute in sequence order, each wrapping everything after it. An
/// empty sequence returns the terminal unchanged, so the degenerate chain is
/// observably identical to invoking the terminal directly.
#[must_use]
pub fn compose(
    links: impl IntoIterator<Item = BoxInterceptor, IntoIter: DoubleEndedIterator>,
    store: &Arc<dyn Store>,
    terminal: Continuation,
) -> Continuation {
    let mut next = terminal;
    for link in links.into_iter().rev() {
        let store = Arc::clone(store);
        let inner = next;
        next = Box::new(move |ctx| link(store, ctx, inner));
    }
    next
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::action::{Action, Meta};
    use std::sync::Mutex;

    struct NullStore;

    impl Store for NullStore {
        fn dispatch(&self, _action: Action) {}

        fn state(&self) -> Value {
            Value::Null
        }
    }

    fn ctx() -> PipelineCtx {
        PipelineCtx::new(AsyncAction::new("REQ", "RES", Meta::new()).unwrap())
    }

    fn marking_link(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> BoxInterceptor {
        let log = Arc::clone(log);
        interceptor_fn(move |_store, ctx, next| {
            log.lock().unwrap().push(label);
            next(ctx)
        })
    }

    #[tokio::test]
    async fn empty_chain_is_the_terminal_itself() {
        let store: Arc<dyn Store> = Arc::new(NullStore);
        let sentinel = json!("SINGULAR_VALUE");
        let expected = sentinel.clone();
        let terminal: Continuation =
            Box::new(move |_ctx| Box::pin(async move { Ok(Some(sentinel)) }));

        let chain = compose(Vec::new(), &store, terminal);
        assert_eq!(chain(ctx()).await, Ok(Some(expected)));
    }

    #[tokio::test]
    async fn links_execute_in_sequence_order() {
        let store: Arc<dyn Store> = Arc::new(NullStore);
        let log = Arc::new(Mutex::new(Vec::new()));
        let links = vec![
            marking_link(&log, "first"),
            marking_link(&log, "second"),
            marking_link(&log, "third"),
        ];
        let terminal_log = Arc::clone(&log);
        let terminal: Continuation = Box::new(move |_ctx| {
            Box::pin(async move {
                terminal_log.lock().unwrap().push("terminal");
                Ok(None)
            })
        });

        let outcome = compose(links, &store, terminal)(ctx()).await;

        assert_eq!(outcome, Ok(None));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first", "second", "third", "terminal"]
        );
    }

    #[tokio::test]
    async fn link_not_calling_next_short_circuits() {
        let store: Arc<dyn Store> = Arc::new(NullStore);
        let log = Arc::new(Mutex::new(Vec::new()));
        let short: BoxInterceptor = interceptor_fn(|_store, _ctx, _next| {
            Box::pin(async move { Err(TaskError::new("halted")) })
        });
        let links = vec![marking_link(&log, "ran"), short, marking_link(&log, "never")];
        let terminal: Continuation =
            Box::new(|_ctx| Box::pin(async move { Ok(Some(json!("unreachable"))) }));

        let outcome = compose(links, &store, terminal)(ctx()).await;

        assert_eq!(outcome, Err(TaskError::new("halted")));
        assert_eq!(*log.lock().unwrap(), vec!["ran"]);
    }

    #[test]
    fn task_error_payload_shape() {
        let plain = TaskError::new("boom");
        assert_eq!(plain.to_payload(), json!({ "message": "boom" }));

        let detailed = TaskError::new("boom").with_details(json!({ "status": 502 }));
        assert_eq!(
            detailed.to_payload(),
            json!({ "message": "boom", "details": { "status": 502 } })
        );
    }

    #[test]
    fn completion_conversions() {
        assert_eq!(Completion::Pending.into_outcome(), Ok(None));
        assert!(Completion::Pending.is_pending());
        assert_eq!(
            Completion::from(Ok(Some(json!(1)))).into_outcome(),
            Ok(Some(json!(1)))
        );
        let failure: Outcome = Err(TaskError::new("x"));
        assert_eq!(Completion::from(failure.clone()).into_outcome(), failure);
    }
}
