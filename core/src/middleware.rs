//! Request middleware registry.
//!
//! Request middlewares are the second hook source: named and resolved from
//! `meta.middlewares` with the same tolerant lookup and the same composition
//! contract as policies, but without an apply point. Each entry exposes an
//! `on_request` / `on_response` hook pair instead, both passthrough unless
//! overridden.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use smallvec::SmallVec;

use crate::chain::{BoxInterceptor, Continuation, Outcome, PipelineCtx};
use crate::policy::PolicyError;
use crate::store::Store;

/// A named middleware applied at both pipeline checkpoints.
pub trait RequestMiddleware: Send + Sync {
    /// Hook run at the request checkpoint. Passthrough by default.
    fn on_request(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        let _ = store;
        next(ctx)
    }

    /// Hook run at the response checkpoint. Passthrough by default.
    fn on_response(
        self: Arc<Self>,
        store: Arc<dyn Store>,
        ctx: PipelineCtx,
        next: Continuation,
    ) -> BoxFuture<'static, Outcome> {
        let _ = store;
        next(ctx)
    }
}

/// Registry mapping unique middleware names to middlewares.
///
/// Same shape as the policy registry: register once, reset for test
/// teardown, tolerant order-preserving lookup.
#[derive(Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, Arc<dyn RequestMiddleware>>,
}

impl MiddlewareRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a middleware under a unique name.
    ///
    /// # Errors
    ///
    /// [`PolicyError::DuplicateName`] if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        middleware: Arc<dyn RequestMiddleware>,
    ) -> Result<(), PolicyError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(PolicyError::DuplicateName(name));
        }
        tracing::debug!(middleware = %name, "registered request middleware");
        self.entries.insert(name, middleware);
        Ok(())
    }

    /// Remove every registered middleware. Test harness hook.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Whether a name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve names to middlewares, preserving input order; unknown names
    /// are skipped, never an error.
    #[must_use]
    pub fn lookup<S: AsRef<str>>(&self, names: &[S]) -> SmallVec<[Arc<dyn RequestMiddleware>; 4]> {
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let found = self.entries.get(name).cloned();
                if found.is_none() {
                    tracing::warn!(middleware = %name, "unknown middleware name skipped during lookup");
                }
                found
            })
            .collect()
    }

    /// Chain links running the `on_request` hooks of the named middlewares,
    /// in order.
    #[must_use]
    pub fn request_links<S: AsRef<str>>(&self, names: &[S]) -> Vec<BoxInterceptor> {
        self.lookup(names).into_iter().map(request_link).collect()
    }

    /// Chain links running the `on_response` hooks of the named middlewares,
    /// in order.
    #[must_use]
    pub fn response_links<S: AsRef<str>>(&self, names: &[S]) -> Vec<BoxInterceptor> {
        self.lookup(names).into_iter().map(response_link).collect()
    }
}

fn request_link(middleware: Arc<dyn RequestMiddleware>) -> BoxInterceptor {
    Arc::new(move |store, ctx, next| Arc::clone(&middleware).on_request(store, ctx, next))
}

fn response_link(middleware: Arc<dyn RequestMiddleware>) -> BoxInterceptor {
    Arc::new(move |store, ctx, next| Arc::clone(&middleware).on_response(store, ctx, next))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use crate::action::{Action, AsyncAction, Meta};
    use crate::chain::compose;
    use serde_json::{Value, json};

    struct NullStore;

    impl Store for NullStore {
        fn dispatch(&self, _action: Action) {}

        fn state(&self) -> Value {
            Value::Null
        }
    }

    struct Stamp;

    impl RequestMiddleware for Stamp {
        fn on_request(
            self: Arc<Self>,
            _store: Arc<dyn Store>,
            mut ctx: PipelineCtx,
            next: Continuation,
        ) -> BoxFuture<'static, Outcome> {
            ctx.action.meta.insert("stamped".to_owned(), json!(true));
            next(ctx)
        }
    }

    struct Inert;

    impl RequestMiddleware for Inert {}

    fn ctx() -> PipelineCtx {
        PipelineCtx::new(AsyncAction::new("REQ", "RES", Meta::new()).unwrap())
    }

    #[test]
    fn register_is_unique_per_name() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("stamp", Arc::new(Stamp)).unwrap();
        assert_eq!(
            registry.register("stamp", Arc::new(Stamp)),
            Err(PolicyError::DuplicateName("stamp".to_owned()))
        );

        registry.reset();
        assert!(registry.is_empty());
    }

    #[test]
    fn lookup_is_tolerant_and_ordered() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("stamp", Arc::new(Stamp)).unwrap();
        registry.register("inert", Arc::new(Inert)).unwrap();

        assert_eq!(registry.lookup(&["inert", "ghost", "stamp"]).len(), 2);
        assert_eq!(registry.request_links(&["stamp", "ghost"]).len(), 1);
    }

    #[tokio::test]
    async fn request_hook_runs_and_default_hooks_pass_through() {
        let mut registry = MiddlewareRegistry::new();
        registry.register("stamp", Arc::new(Stamp)).unwrap();
        registry.register("inert", Arc::new(Inert)).unwrap();
        let store: Arc<dyn Store> = Arc::new(NullStore);

        let terminal: Continuation = Box::new(|ctx| {
            Box::pin(async move {
                assert_eq!(ctx.action.meta.get("stamped"), Some(&json!(true)));
                Ok(Some(json!("done")))
            })
        });
        let links = registry.request_links(&["stamp", "inert"]);
        let outcome = compose(links, &store, terminal)(ctx()).await;
        assert_eq!(outcome, Ok(Some(json!("done"))));

        // the Stamp middleware leaves on_response at the default passthrough
        let terminal: Continuation = Box::new(|ctx| {
            Box::pin(async move {
                assert_eq!(ctx.action.meta.get("stamped"), None);
                Ok(None)
            })
        });
        let links = registry.response_links(&["stamp", "inert"]);
        let outcome = compose(links, &store, terminal)(ctx()).await;
        assert_eq!(outcome, Ok(None));
    }
}
