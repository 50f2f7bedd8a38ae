//! Policy registry and runner.
//!
//! A policy is a named chain link applied at a specific pipeline checkpoint
//! (its apply point). The registry maps unique names to policies and is an
//! explicit object constructed at startup and handed to whatever needs
//! lookup; there is no process-global instance. The runner resolves an
//! ordered name list into a composed continuation for one apply point.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use smallvec::SmallVec;
use thiserror::Error;

use crate::chain::{BoxInterceptor, Continuation, Outcome, PipelineCtx, compose};
use crate::store::Store;

/// The pipeline checkpoint at which a policy executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyPoint {
    /// After the request action is dispatched, before the task runs.
    BeforeRequest,

    /// After the task completes, before the response action is dispatched.
    BeforeResponse,
}

impl ApplyPoint {
    /// Wire spelling used in declarative registration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeRequest => "beforeRequest",
            Self::BeforeResponse => "beforeResponse",
        }
    }
}

impl fmt::Display for ApplyPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplyPoint {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beforeRequest" => Ok(Self::BeforeRequest),
            "beforeResponse" => Ok(Self::BeforeResponse),
            other => Err(PolicyError::InvalidApplyPoint(other.to_owned())),
        }
    }
}

/// Registration errors, raised synchronously at setup time and fatal to the
/// offending call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The name is already registered.
    #[error("{0:?} is already registered")]
    DuplicateName(String),

    /// The apply point spelling is not `beforeRequest` or `beforeResponse`.
    #[error("invalid apply point {0:?}, expected beforeRequest or beforeResponse")]
    InvalidApplyPoint(String),
}

/// A named, pluggable chain link tagged with the checkpoint it applies to.
pub trait Policy: Send + Sync {
    /// The checkpoint this policy executes at.
    fn apply_point(&self) -> ApplyPoint;

    /// Run the policy. Invoke `next` to continue the chain; returning
    /// without doing so short-circuits downstream policies and the terminal
    /// handler, and the policy supplies its own outcome.
    fn apply(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome>;
}

struct FnPolicy<F> {
    point: ApplyPoint,
    handler: F,
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(Arc<dyn Store>, PipelineCtx, Continuation) -> BoxFuture<'static, Outcome>
        + Send
        + Sync
        + 'static,
{
    fn apply_point(&self) -> ApplyPoint {
        self.point
    }

    fn apply(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        (self.handler)(store, ctx, next)
    }
}

/// Build a policy from an apply point and a closure.
pub fn policy_fn<F>(point: ApplyPoint, handler: F) -> Arc<dyn Policy>
where
    F: Fn(Arc<dyn Store>, PipelineCtx, Continuation) -> BoxFuture<'static, Outcome>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnPolicy { point, handler })
}

/// Registry mapping unique policy names to policies.
///
/// Complete all registration before handling traffic; the registry is not
/// synchronized for concurrent mutation.
#[derive(Default)]
pub struct PolicyRegistry {
    entries: HashMap<String, Arc<dyn Policy>>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a policy under a unique name.
    ///
    /// # Errors
    ///
    /// [`PolicyError::DuplicateName`] if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        policy: Arc<dyn Policy>,
    ) -> Result<(), PolicyError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(PolicyError::DuplicateName(name));
        }
        tracing::debug!(policy = %name, apply_point = %policy.apply_point(), "registered policy");
        self.entries.insert(name, policy);
        Ok(())
    }

    /// Register a closure-backed policy, parsing the apply point from its
    /// wire spelling.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidApplyPoint`] for an unknown spelling,
    /// [`PolicyError::DuplicateName`] if the name is taken.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        apply_point: &str,
        handler: F,
    ) -> Result<(), PolicyError>
    where
        F: Fn(Arc<dyn Store>, PipelineCtx, Continuation) -> BoxFuture<'static, Outcome>
            + Send
            + Sync
            + 'static,
    {
        let point = apply_point.parse::<ApplyPoint>()?;
        self.register(name, policy_fn(point, handler))
    }

    /// Remove every registered policy. Test harness hook, not used in normal
    /// operation.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered policies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve names to policies, preserving input order.
    ///
    /// Unknown names are skipped, never an error: named policies can roll
    /// out gradually without build-time coupling between declarations and
    /// registrations.
    #[must_use]
    pub fn lookup<S: AsRef<str>>(&self, names: &[S]) -> SmallVec<[Arc<dyn Policy>; 4]> {
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let found = self.entries.get(name).cloned();
                if found.is_none() {
                    tracing::warn!(policy = %name, "unknown policy name skipped during lookup");
                }
                found
            })
            .collect()
    }

    /// Build a runner over the policies resolved from `names`.
    #[must_use]
    pub fn runner<S: AsRef<str>>(&self, names: &[S]) -> PolicyRunner {
        PolicyRunner::new(self.lookup(names))
    }
}

/// Composes an ordered policy list into per-checkpoint continuation chains.
pub struct PolicyRunner {
    policies: SmallVec<[Arc<dyn Policy>; 4]>,
}

impl PolicyRunner {
    /// Runner over an ordered policy list.
    #[must_use]
    pub fn new(policies: impl IntoIterator<Item = Arc<dyn Policy>>) -> Self {
        Self {
            policies: policies.into_iter().collect(),
        }
    }

    /// The policies matching an apply point, as chain links, in order.
    #[must_use]
    pub fn select(&self, point: ApplyPoint) -> Vec<BoxInterceptor> {
        self.policies
            .iter()
            .filter(|policy| policy.apply_point() == point)
            .map(|policy| {
                let policy = Arc::clone(policy);
                let link: BoxInterceptor =
                    Arc::new(move |store, ctx, next| Arc::clone(&policy).apply(store, ctx, next));
                link
            })
            .collect()
    }

    /// Compose the matching policies around a terminal continuation.
    ///
    /// With zero matching policies this degenerates to the terminal itself,
    /// preserving its return value unchanged.
    #[must_use]
    pub fn chain(
        &self,
        point: ApplyPoint,
        store: &Arc<dyn Store>,
        terminal: Continuation,
    ) -> Continuation {
        compose(self.select(point), store, terminal)
    }

    /// Build the chain for one apply point and invoke it.
    pub async fn run(
        &self,
        point: ApplyPoint,
        store: &Arc<dyn Store>,
        terminal: Continuation,
        ctx: PipelineCtx,
    ) -> Outcome {
        self.chain(point, store, terminal)(ctx).await
    }
}
