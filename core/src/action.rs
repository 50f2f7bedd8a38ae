//! Action data model.
//!
//! Actions are messages describing an intent to change state, dispatched to a
//! store. A synchronous action carries a single type identifier and is
//! forwarded to the store untouched; an asynchronous action carries an
//! ordered request/response identifier pair and is executed by the dispatch
//! pipeline in `actionflow-runtime`.
//!
//! The two shapes are a tagged variant, discriminated at the boundary by
//! [`Action::from_value`] before anything enters the pipeline. A constructed
//! [`AsyncAction`] always satisfies the async-action invariant: both
//! identifiers are non-empty and `meta` is present.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata attached to an action: url, method, policy and middleware name
/// lists, plus any caller-supplied extra parameters.
pub type Meta = Map<String, Value>;

/// Errors raised while discriminating a loose action value at the boundary.
///
/// These are structural errors: they are fatal to the offending call and are
/// never carried as pipeline data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The `type` field was a sequence but not a pair of two non-empty
    /// strings (request and response).
    #[error("expected type to be a pair of two non-empty strings, request and response")]
    MalformedType,

    /// An asynchronous action arrived without an object-shaped `meta`.
    #[error("expected meta to be an object")]
    MalformedMeta,

    /// The `type` field was absent, empty, or neither a string nor a sequence.
    #[error("expected type to be a non-empty string or a pair of strings")]
    MissingType,
}

/// A synchronous action: a single type identifier plus optional payload,
/// metadata, and error flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
    /// Type identifier, e.g. `MY_LIST_RESPONSE`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional metadata map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,

    /// Optional payload value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Set to `true` on failure responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
}

impl SyncAction {
    /// Create a bare synchronous action with the given type identifier.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            meta: None,
            payload: None,
            error: None,
        }
    }

    /// Attach a metadata map.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the error flag.
    #[must_use]
    pub fn with_error(mut self, error: bool) -> Self {
        self.error = Some(error);
        self
    }
}

/// An asynchronous action: an ordered request/response identifier pair plus
/// mandatory metadata.
///
/// The identifiers are private; construction through [`AsyncAction::new`]
/// validates them, so every value of this type is a well-formed async action.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncAction {
    request_kind: String,
    response_kind: String,

    /// Metadata map; always present for asynchronous actions.
    pub meta: Meta,

    /// Optional payload value.
    pub payload: Option<Value>,
}

impl AsyncAction {
    /// Build an asynchronous action from a request/response identifier pair.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MalformedType`] if either identifier is empty.
    pub fn new(
        request: impl Into<String>,
        response: impl Into<String>,
        meta: Meta,
    ) -> Result<Self, ActionError> {
        let request_kind = request.into();
        let response_kind = response.into();
        if request_kind.is_empty() || response_kind.is_empty() {
            return Err(ActionError::MalformedType);
        }
        Ok(Self {
            request_kind,
            response_kind,
            meta,
            payload: None,
        })
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Request type identifier.
    #[must_use]
    pub fn request_kind(&self) -> &str {
        &self.request_kind
    }

    /// Response type identifier.
    #[must_use]
    pub fn response_kind(&self) -> &str {
        &self.response_kind
    }

    /// Policy names listed under `meta.policies`, in order.
    ///
    /// Absent lists and non-string entries are skipped, never an error.
    #[must_use]
    pub fn policy_names(&self) -> Vec<String> {
        string_list(&self.meta, "policies")
    }

    /// Request middleware names listed under `meta.middlewares`, in order.
    ///
    /// Absent lists and non-string entries are skipped, never an error.
    #[must_use]
    pub fn middleware_names(&self) -> Vec<String> {
        string_list(&self.meta, "middlewares")
    }
}

fn string_list(meta: &Meta, key: &str) -> Vec<String> {
    meta.get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// An action entering the dispatch pipeline, discriminated at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Plain action, forwarded to the store untouched.
    Sync(SyncAction),

    /// Request/response pair action, executed by the async pipeline.
    Async(AsyncAction),
}

impl Action {
    /// Discriminate a loose action value into the tagged representation.
    ///
    /// A string `type` yields a synchronous action. An array `type` must be a
    /// pair of two non-empty strings and requires an object-shaped `meta`.
    ///
    /// # Errors
    ///
    /// [`ActionError::MalformedType`] for a bad pair,
    /// [`ActionError::MalformedMeta`] for a missing or non-object `meta` on
    /// an async action, [`ActionError::MissingType`] otherwise.
    pub fn from_value(value: &Value) -> Result<Self, ActionError> {
        let Some(object) = value.as_object() else {
            return Err(ActionError::MissingType);
        };
        match object.get("type") {
            Some(Value::String(kind)) if !kind.is_empty() => Ok(Self::Sync(SyncAction {
                kind: kind.clone(),
                meta: object.get("meta").and_then(Value::as_object).cloned(),
                payload: object.get("payload").cloned(),
                error: object.get("error").and_then(Value::as_bool),
            })),
            Some(Value::Array(pair)) => {
                let [request, response] = pair.as_slice() else {
                    return Err(ActionError::MalformedType);
                };
                let (Some(request), Some(response)) = (request.as_str(), response.as_str())
                else {
                    return Err(ActionError::MalformedType);
                };
                let Some(meta) = object.get("meta").and_then(Value::as_object) else {
                    return Err(ActionError::MalformedMeta);
                };
                let mut action = AsyncAction::new(request, response, meta.clone())?;
                if let Some(payload) = object.get("payload") {
                    action = action.with_payload(payload.clone());
                }
                Ok(Self::Async(action))
            },
            _ => Err(ActionError::MissingType),
        }
    }

    /// Render the loose wire shape understood by reducers and devtools.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Sync(action) => serde_json::to_value(action).unwrap_or(Value::Null),
            Self::Async(action) => {
                let mut object = Map::new();
                object.insert(
                    "type".to_owned(),
                    Value::Array(vec![
                        Value::String(action.request_kind.clone()),
                        Value::String(action.response_kind.clone()),
                    ]),
                );
                object.insert("meta".to_owned(), Value::Object(action.meta.clone()));
                if let Some(payload) = &action.payload {
                    object.insert("payload".to_owned(), payload.clone());
                }
                Value::Object(object)
            },
        }
    }
}

impl From<SyncAction> for Action {
    fn from(action: SyncAction) -> Self {
        Self::Sync(action)
    }
}

impl From<AsyncAction> for Action {
    fn from(action: AsyncAction) -> Self {
        Self::Async(action)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    #[test]
    fn discriminates_sync_action_from_string_type() {
        let action = Action::from_value(&json!({
            "type": "MY_RESET",
            "payload": 1,
        }))
        .unwrap();

        let Action::Sync(action) = action else {
            panic!("expected a sync action");
        };
        assert_eq!(action.kind, "MY_RESET");
        assert_eq!(action.payload, Some(json!(1)));
        assert_eq!(action.meta, None);
    }

    #[test]
    fn discriminates_async_action_from_pair_type() {
        let action = Action::from_value(&json!({
            "type": ["MY_LIST_REQUEST", "MY_LIST_RESPONSE"],
            "meta": { "url": "endpoint", "method": "get" },
        }))
        .unwrap();

        let Action::Async(action) = action else {
            panic!("expected an async action");
        };
        assert_eq!(action.request_kind(), "MY_LIST_REQUEST");
        assert_eq!(action.response_kind(), "MY_LIST_RESPONSE");
        assert_eq!(action.meta.get("url"), Some(&json!("endpoint")));
    }

    #[test]
    fn rejects_pairs_that_are_not_two_nonempty_strings() {
        for bad in [
            json!({ "type": ["ONLY_ONE"], "meta": {} }),
            json!({ "type": ["A", "B", "C"], "meta": {} }),
            json!({ "type": ["A", ""], "meta": {} }),
            json!({ "type": ["", "B"], "meta": {} }),
            json!({ "type": ["A", 2], "meta": {} }),
        ] {
            assert_eq!(
                Action::from_value(&bad),
                Err(ActionError::MalformedType),
                "value should be rejected: {bad}"
            );
        }
    }

    #[test]
    fn rejects_async_actions_without_object_meta() {
        for bad in [
            json!({ "type": ["REQ", "RES"] }),
            json!({ "type": ["REQ", "RES"], "meta": "nope" }),
            json!({ "type": ["REQ", "RES"], "meta": 3 }),
        ] {
            assert_eq!(Action::from_value(&bad), Err(ActionError::MalformedMeta));
        }
    }

    #[test]
    fn rejects_missing_or_empty_type() {
        assert_eq!(
            Action::from_value(&json!({ "payload": 1 })),
            Err(ActionError::MissingType)
        );
        assert_eq!(
            Action::from_value(&json!({ "type": "" })),
            Err(ActionError::MissingType)
        );
        assert_eq!(Action::from_value(&json!(42)), Err(ActionError::MissingType));
    }

    #[test]
    fn async_constructor_rejects_empty_identifiers() {
        assert_eq!(
            AsyncAction::new("", "RES", Meta::new()).unwrap_err(),
            ActionError::MalformedType
        );
        assert_eq!(
            AsyncAction::new("REQ", "", Meta::new()).unwrap_err(),
            ActionError::MalformedType
        );
    }

    #[test]
    fn name_lists_are_tolerant() {
        let mut meta = Meta::new();
        meta.insert("policies".to_owned(), json!(["auth", 7, "log"]));
        let action = AsyncAction::new("REQ", "RES", meta).unwrap();

        assert_eq!(action.policy_names(), vec!["auth", "log"]);
        assert!(action.middleware_names().is_empty());
    }

    #[test]
    fn to_value_round_trips_the_wire_shape() {
        let wire = json!({
            "type": ["REQ", "RES"],
            "meta": { "url": "endpoint" },
            "payload": { "id": 1 },
        });
        let action = Action::from_value(&wire).unwrap();
        assert_eq!(action.to_value(), wire);

        let wire = json!({ "type": "PLAIN", "error": true });
        let action = Action::from_value(&wire).unwrap();
        assert_eq!(action.to_value(), wire);
    }
}
