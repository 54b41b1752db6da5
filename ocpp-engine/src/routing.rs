//! Action routing
//!
//! A [`RouteMap`] binds action names to [`HandlerBundle`]s. It is built once
//! when a session is constructed and never changes afterwards.
//!
//! Handlers come in two explicit flavours instead of being inspected at call
//! time: [`Handler::new`] only sees the payload, [`Handler::with_context`]
//! also receives the [`CallContext`] (message id and action) of the call.
//! Payloads given to handlers and returned by them use internal naming.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::OcppError;
use crate::naming::serialize_payload;

/// Future returned by every handler
pub type HandlerFuture = BoxFuture<'static, Result<Value, OcppError>>;

type PlainFn = dyn Fn(Value) -> HandlerFuture + Send + Sync;
type ContextFn = dyn Fn(Value, CallContext) -> HandlerFuture + Send + Sync;

/// Identity of the inbound call a handler is serving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub message_id: String,
    pub action: String,
}

/// A registered action handler
#[derive(Clone)]
pub enum Handler {
    /// Receives the payload only
    Plain(Arc<PlainFn>),
    /// Receives the payload and the call context
    WithContext(Arc<ContextFn>),
}

impl Handler {
    /// Handler working on raw internal-naming payloads
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OcppError>> + Send + 'static,
    {
        Handler::Plain(Arc::new(move |payload| f(payload).boxed()))
    }

    /// Context-aware handler working on raw internal-naming payloads
    pub fn with_context<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, OcppError>> + Send + 'static,
    {
        Handler::WithContext(Arc::new(move |payload, ctx| f(payload, ctx).boxed()))
    }

    /// Handler taking a typed request and returning a typed response
    pub fn typed<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, OcppError>> + Send + 'static,
    {
        Handler::new(move |payload| {
            let pending = serde_json::from_value::<Req>(payload).map(&f);
            async move { serialize_payload(&pending?.await?) }
        })
    }

    /// Context-aware handler taking a typed request
    pub fn typed_with_context<Req, Resp, F, Fut>(f: F) -> Self
    where
        Req: DeserializeOwned + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, OcppError>> + Send + 'static,
    {
        Handler::with_context(move |payload, ctx| {
            let pending = serde_json::from_value::<Req>(payload).map(|req| f(req, ctx));
            async move { serialize_payload(&pending?.await?) }
        })
    }

    pub fn wants_context(&self) -> bool {
        matches!(self, Handler::WithContext(_))
    }

    pub(crate) fn invoke(&self, payload: Value, ctx: CallContext) -> HandlerFuture {
        match self {
            Handler::Plain(f) => f(payload),
            Handler::WithContext(f) => f(payload, ctx),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Plain(_) => write!(f, "Handler::Plain"),
            Handler::WithContext(_) => write!(f, "Handler::WithContext"),
        }
    }
}

/// Everything registered for one action
#[derive(Debug, Clone)]
pub struct HandlerBundle {
    pub on_action: Handler,
    pub after_action: Option<Handler>,
    pub skip_schema_validation: bool,
}

/// Immutable action -> handler table
#[derive(Debug, Clone, Default)]
pub struct RouteMap {
    routes: HashMap<String, HandlerBundle>,
}

impl RouteMap {
    pub fn builder() -> RouteBuilder {
        RouteBuilder::default()
    }

    /// Build the table from a peer implementation's declared capabilities
    pub fn from_source<R: Routable>(source: Arc<R>) -> Result<Self, OcppError> {
        source.routes(RouteBuilder::default()).build()
    }

    /// Look up an action; a miss is [`OcppError::ActionNotRegistered`]
    pub fn get(&self, action: &str) -> Result<&HandlerBundle, OcppError> {
        self.routes
            .get(action)
            .ok_or_else(|| OcppError::ActionNotRegistered(action.to_string()))
    }

    pub fn contains(&self, action: &str) -> bool {
        self.routes.contains_key(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Collects handler registrations
#[derive(Default)]
pub struct RouteBuilder {
    on_action: HashMap<String, Handler>,
    after_action: HashMap<String, Handler>,
    skip_validation: HashSet<String>,
}

impl RouteBuilder {
    /// Register the handler answering `action`
    pub fn on(mut self, action: impl Into<String>, handler: Handler) -> Self {
        self.on_action.insert(action.into(), handler);
        self
    }

    /// Register a hook run after the response to `action` has been sent
    pub fn after(mut self, action: impl Into<String>, handler: Handler) -> Self {
        self.after_action.insert(action.into(), handler);
        self
    }

    /// Skip schema validation of requests and responses for `action`
    pub fn skip_schema_validation(mut self, action: impl Into<String>) -> Self {
        self.skip_validation.insert(action.into());
        self
    }

    /// Freeze the registrations. Every `after` hook and skip flag needs an
    /// `on` handler for the same action.
    pub fn build(mut self) -> Result<RouteMap, OcppError> {
        let orphan = self
            .after_action
            .keys()
            .chain(self.skip_validation.iter())
            .find(|action| !self.on_action.contains_key(*action));

        if let Some(action) = orphan {
            return Err(OcppError::InvalidRoute {
                action: action.clone(),
                reason: "no on-action handler registered".into(),
            });
        }

        let routes = self
            .on_action
            .into_iter()
            .map(|(action, on_action)| {
                let bundle = HandlerBundle {
                    after_action: self.after_action.remove(&action),
                    skip_schema_validation: self.skip_validation.contains(&action),
                    on_action,
                };
                (action, bundle)
            })
            .collect();

        Ok(RouteMap { routes })
    }
}

/// A peer implementation that declares which actions it handles
pub trait Routable: Send + Sync + 'static {
    fn routes(self: Arc<Self>, routes: RouteBuilder) -> RouteBuilder;
}
