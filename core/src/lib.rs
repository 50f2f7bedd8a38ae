//! # Actionflow Core
//!
//! Core types for the actionflow dispatch pipeline: the action data model,
//! the continuation chain, policy and request-middleware registries, and the
//! declarative action creator factory.
//!
//! ## Core Concepts
//!
//! - **Action**: a tagged message, either synchronous (forwarded to the store
//!   untouched) or asynchronous (a request/response pair executed by the
//!   pipeline in `actionflow-runtime`)
//! - **Chain**: interceptors folded around a terminal continuation; each link
//!   decides whether the rest of the chain runs
//! - **Policy**: a named cross-cutting behavior anchored to one of two apply
//!   points, selected per action via `meta.policies`
//! - **Request middleware**: a named `on_request` / `on_response` hook pair,
//!   selected per action via `meta.middlewares`
//! - **Creators**: a declarative config map compiled into action creator
//!   functions and UPPER_SNAKE type identifiers
//!
//! ## Architecture Principles
//!
//! - Unidirectional data flow: everything observable happens through store
//!   dispatches
//! - Failures are values: task errors travel through the chain as data, not
//!   as raised errors
//! - Explicit wiring: registries are plain values owned by the caller, there
//!   is no global mutable state

pub mod action;
pub mod chain;
pub mod creators;
pub mod middleware;
pub mod policy;
pub mod store;

pub use action::{Action, ActionError, AsyncAction, Meta, SyncAction};
pub use chain::{
    BoxInterceptor, Completion, Continuation, Outcome, PipelineCtx, TaskError, compose,
    interceptor_fn,
};
pub use creators::{
    ActionConfig, ActionCreator, ActionSet, ApiConfig, ConfigError, CreatorError, CreatorOptions,
    Modifier, TemplateConfig, TypeEntry, create_actions, parse_url, to_upper_snake,
    validate_configs,
};
pub use middleware::{MiddlewareRegistry, RequestMiddleware};
pub use policy::{ApplyPoint, Policy, PolicyError, PolicyRegistry, PolicyRunner, policy_fn};
pub use store::Store;
