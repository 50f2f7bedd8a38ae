//! Declarative action creators.
//!
//! A config map declares request/response action pairs (url template, method,
//! extras) alongside plain synchronous templates. [`create_actions`] validates
//! the whole set once, fail fast, derives the UPPER_SNAKE type identifiers,
//! and returns creator functions that build actions from call-time payload
//! and params.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::action::{Action, ActionError, AsyncAction, Meta, SyncAction};

/// Config validation failures, raised once at setup time, never per call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The url is empty.
    #[error("invalid url provided for {0}, it should be a non-empty string")]
    InvalidUrl(String),

    /// The url uses the reserved `:payload` placeholder.
    #[error("invalid url provided for {0}, payload cannot be used as a url param")]
    PayloadParam(String),

    /// The method is empty.
    #[error("invalid method provided for {0}, it should be a non-empty string")]
    InvalidMethod(String),
}

/// Creator failures, raised per call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreatorError {
    /// A url placeholder has no string or number entry in the params.
    #[error("param {name:?} from url {url:?} not found in params")]
    MissingParam {
        /// Placeholder name.
        name: String,

        /// The url template being substituted.
        url: String,
    },

    /// The derived request/response pair failed action validation.
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Call-time arguments to a creator.
#[derive(Debug, Clone, Default)]
pub struct CreatorOptions {
    /// Action payload.
    pub payload: Option<Value>,

    /// Url and meta parameters.
    pub params: Meta,

    /// Error flag for synchronous actions.
    pub error: Option<bool>,
}

impl CreatorOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Add one param.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Replace the params map.
    #[must_use]
    pub fn with_params(mut self, params: Meta) -> Self {
        self.params = params;
        self
    }

    /// Set the error flag.
    #[must_use]
    pub fn with_error(mut self, error: bool) -> Self {
        self.error = Some(error);
        self
    }
}

/// Hook rewriting call-time options before an action is built.
pub type Modifier = Arc<dyn Fn(CreatorOptions) -> CreatorOptions + Send + Sync>;

/// Declarative config for one request/response action pair.
#[derive(Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Url template; `:name` placeholders substitute from call-time params.
    pub url: String,

    /// HTTP method hint carried in `meta.method`.
    pub method: String,

    /// Default metadata merged under call-time params.
    #[serde(default)]
    pub meta: Option<Meta>,

    /// Normalization schema carried in `meta.schema`.
    #[serde(default)]
    pub schema: Option<Value>,

    /// Policy names carried in `meta.policies`.
    #[serde(default)]
    pub policies: Option<Vec<String>>,

    /// Request middleware names carried in `meta.middlewares`.
    #[serde(default)]
    pub middlewares: Option<Vec<String>>,

    /// Options rewrite hook, applied before the action is built.
    #[serde(skip)]
    pub modifier: Option<Modifier>,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("meta", &self.meta)
            .field("schema", &self.schema)
            .field("policies", &self.policies)
            .field("middlewares", &self.middlewares)
            .field("modifier", &self.modifier.as_ref().map(|_| "<modifier>"))
            .finish()
    }
}

/// Defaults for a plain synchronous action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateConfig {
    /// Default metadata merged under call-time params.
    #[serde(default)]
    pub meta: Option<Meta>,

    /// Default payload when the call supplies none.
    #[serde(default)]
    pub payload: Option<Value>,

    /// Default error flag when the call supplies none.
    #[serde(default)]
    pub error: Option<bool>,
}

/// One entry in a declarative action config map.
#[derive(Debug, Clone)]
pub enum ActionConfig {
    /// Request/response pair executed by the async pipeline.
    Api(ApiConfig),

    /// Synchronous action with declared defaults.
    Template(TemplateConfig),

    /// Bare synchronous action: just a type identifier.
    Unit,
}

impl<'de> Deserialize<'de> for ActionConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        // anything declaring a url or method is an api entry; a partial
        // declaration fails loudly instead of degrading to a template
        let is_api = value
            .as_object()
            .is_some_and(|object| object.contains_key("url") || object.contains_key("method"));
        if is_api {
            return ApiConfig::deserialize(value)
                .map(Self::Api)
                .map_err(serde::de::Error::custom);
        }
        if value.is_object() {
            return TemplateConfig::deserialize(value)
                .map(Self::Template)
                .map_err(serde::de::Error::custom);
        }
        Ok(Self::Unit)
    }
}

/// Derived type identifier(s) for one config entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeEntry {
    /// Synchronous action type.
    Single(String),

    /// Request/response pair.
    Pair {
        /// Request type identifier.
        request: String,

        /// Response type identifier.
        response: String,
    },
}

#[derive(Clone)]
enum CreatorKind {
    Api {
        config: ApiConfig,
        request: String,
        response: String,
    },
    Template {
        config: TemplateConfig,
        name: String,
    },
    Unit {
        name: String,
    },
}

/// Builds actions from call-time options; produced by [`create_actions`].
#[derive(Clone)]
pub struct ActionCreator {
    kind: CreatorKind,
}

impl ActionCreator {
    /// Build an action with no call-time options.
    ///
    /// # Errors
    ///
    /// Same as [`ActionCreator::create`].
    pub fn create_default(&self) -> Result<Action, CreatorError> {
        self.create(CreatorOptions::default())
    }

    /// Build an action from call-time options.
    ///
    /// # Errors
    ///
    /// [`CreatorError::MissingParam`] when a url placeholder has no matching
    /// string or number param.
    pub fn create(&self, options: CreatorOptions) -> Result<Action, CreatorError> {
        match &self.kind {
            CreatorKind::Api {
                config,
                request,
                response,
            } => create_api(config, request, response, options),
            CreatorKind::Template { config, name } => Ok(create_template(config, name, options)),
            CreatorKind::Unit { name } => Ok(create_unit(name, options)),
        }
    }

    /// The type identifier(s) this creator produces.
    #[must_use]
    pub fn type_entry(&self) -> TypeEntry {
        match &self.kind {
            CreatorKind::Api {
                request, response, ..
            } => TypeEntry::Pair {
                request: request.clone(),
                response: response.clone(),
            },
            CreatorKind::Template { name, .. } | CreatorKind::Unit { name } => {
                TypeEntry::Single(name.clone())
            },
        }
    }
}

impl fmt::Debug for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCreator")
            .field("types", &self.type_entry())
            .finish()
    }
}

fn create_api(
    config: &ApiConfig,
    request: &str,
    response: &str,
    options: CreatorOptions,
) -> Result<Action, CreatorError> {
    let options = match &config.modifier {
        Some(modifier) => modifier(options),
        None => options,
    };
    let url = parse_url(&config.url, &options.params)?;

    // config meta defaults first, call-time params override, url and method
    // always win
    let mut meta = config.meta.clone().unwrap_or_default();
    for (key, value) in options.params {
        meta.insert(key, value);
    }
    meta.insert("url".to_owned(), Value::String(url));
    meta.insert("method".to_owned(), Value::String(config.method.clone()));
    if let Some(schema) = &config.schema {
        meta.insert("schema".to_owned(), schema.clone());
    }
    if let Some(policies) = &config.policies {
        meta.insert("policies".to_owned(), string_array(policies));
    }
    if let Some(middlewares) = &config.middlewares {
        meta.insert("middlewares".to_owned(), string_array(middlewares));
    }

    let mut action = AsyncAction::new(request, response, meta)?;
    if let Some(payload) = options.payload {
        action = action.with_payload(payload);
    }
    Ok(Action::Async(action))
}

fn create_template(config: &TemplateConfig, name: &str, options: CreatorOptions) -> Action {
    let mut meta = config.meta.clone().unwrap_or_default();
    for (key, value) in options.params {
        meta.insert(key, value);
    }
    Action::Sync(SyncAction {
        kind: name.to_owned(),
        meta: if meta.is_empty() { None } else { Some(meta) },
        payload: options.payload.or_else(|| config.payload.clone()),
        error: options.error.or(config.error),
    })
}

fn create_unit(name: &str, options: CreatorOptions) -> Action {
    Action::Sync(SyncAction {
        kind: name.to_owned(),
        meta: if options.params.is_empty() {
            None
        } else {
            Some(options.params)
        },
        payload: options.payload,
        error: options.error,
    })
}

fn string_array(names: &[String]) -> Value {
    Value::Array(names.iter().cloned().map(Value::String).collect())
}

/// Substitute `:name` url placeholders from params.
///
/// Placeholder values must be strings or numbers; a bare `:` with no
/// alphanumeric tail (a port separator, say) is left alone.
///
/// # Errors
///
/// [`CreatorError::MissingParam`] if a placeholder has no usable entry.
pub fn parse_url(url: &str, params: &Meta) -> Result<String, CreatorError> {
    let mut out = String::with_capacity(url.len());
    let mut chars = url.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != ':' {
            out.push(ch);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if name.is_empty() {
            out.push(':');
            continue;
        }
        match params.get(&name).and_then(param_text) {
            Some(text) => out.push_str(&text),
            None => {
                return Err(CreatorError::MissingParam {
                    name,
                    url: url.to_owned(),
                });
            },
        }
    }
    Ok(out)
}

fn param_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn placeholder_names(url: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut chars = url.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != ':' {
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if !name.is_empty() {
            names.push(name);
        }
    }
    names
}

/// `readWithExtras` → `READ_WITH_EXTRAS`; existing underscores pass through.
#[must_use]
pub fn to_upper_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (index, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() && index > 0 {
            out.push('_');
        }
        out.push(ch.to_ascii_uppercase());
    }
    out
}

fn type_name(prefix: &str, name: &str) -> String {
    let upper = to_upper_snake(name);
    if prefix.is_empty() {
        upper
    } else {
        format!("{}_{}", prefix.to_ascii_uppercase(), upper)
    }
}

/// Validate a config map. Runs once at setup time; creator calls assume a
/// validated config.
///
/// # Errors
///
/// The first [`ConfigError`] encountered, tagged with the derived type name.
pub fn validate_configs(
    prefix: &str,
    configs: &BTreeMap<String, ActionConfig>,
) -> Result<(), ConfigError> {
    for (name, config) in configs {
        let ActionConfig::Api(api) = config else {
            continue;
        };
        let config_name = type_name(prefix, name);
        if api.url.is_empty() {
            return Err(ConfigError::InvalidUrl(config_name));
        }
        if placeholder_names(&api.url).iter().any(|param| param == "payload") {
            return Err(ConfigError::PayloadParam(config_name));
        }
        if api.method.is_empty() {
            return Err(ConfigError::InvalidMethod(config_name));
        }
    }
    Ok(())
}

/// Creators and derived type identifiers for one declarative config map.
#[derive(Debug)]
pub struct ActionSet {
    /// Derived type identifiers keyed by the UPPER_SNAKE entry name.
    pub types: BTreeMap<String, TypeEntry>,

    /// Creators keyed by the original entry name.
    pub creators: BTreeMap<String, ActionCreator>,
}

impl ActionSet {
    /// Creator for an entry, by its original config name.
    #[must_use]
    pub fn creator(&self, name: &str) -> Option<&ActionCreator> {
        self.creators.get(name)
    }

    /// Type entry by UPPER_SNAKE name.
    #[must_use]
    pub fn type_entry(&self, name: &str) -> Option<&TypeEntry> {
        self.types.get(name)
    }
}

/// Build creators and type identifiers from a declarative config map.
///
/// Validation of the full set runs once here, not per creator call.
///
/// # Errors
///
/// Any [`ConfigError`] from [`validate_configs`].
pub fn create_actions(
    prefix: &str,
    configs: BTreeMap<String, ActionConfig>,
) -> Result<ActionSet, ConfigError> {
    validate_configs(prefix, &configs)?;

    let mut types = BTreeMap::new();
    let mut creators = BTreeMap::new();
    for (name, config) in configs {
        let base = type_name(prefix, &name);
        let (entry, creator) = match config {
            ActionConfig::Api(api) => {
                let request = format!("{base}_REQUEST");
                let response = format!("{base}_RESPONSE");
                (
                    TypeEntry::Pair {
                        request: request.clone(),
                        response: response.clone(),
                    },
                    ActionCreator {
                        kind: CreatorKind::Api {
                            config: api,
                            request,
                            response,
                        },
                    },
                )
            },
            ActionConfig::Template(template) => (
                TypeEntry::Single(base.clone()),
                ActionCreator {
                    kind: CreatorKind::Template {
                        config: template,
                        name: base,
                    },
                },
            ),
            ActionConfig::Unit => (
                TypeEntry::Single(base.clone()),
                ActionCreator {
                    kind: CreatorKind::Unit { name: base },
                },
            ),
        };
        types.insert(to_upper_snake(&name), entry);
        creators.insert(name, creator);
    }
    Ok(ActionSet { types, creators })
}
