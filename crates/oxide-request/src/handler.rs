//! Request handlers that take part in the dispatch chain.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use crate::request::RequestContext;
use crate::response::Response;

/// A boxed future for async handler operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Action run when a rule's action variable captured nothing.
pub const DEFAULT_ACTION: &str = "index";

static DEFAULT_URL_HANDLERS: LazyLock<Vec<UrlHandler>> =
    LazyLock::new(|| vec![UrlHandler::new("$Action//$ID/$OtherID", "$Action")]);

/// Maps a URL pattern to the action that handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlHandler {
    /// Pattern matched against the remaining URL.
    pub pattern: String,
    /// Action name, or `$Name` to use a captured value.
    pub action: String,
}

impl UrlHandler {
    pub fn new(pattern: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            action: action.into(),
        }
    }

    /// Resolves the action name against the latest match.
    ///
    /// `$Action` becomes the captured `Action` value, or `index` when the
    /// variable captured nothing.
    pub fn resolve_action(&self, req: &RequestContext) -> String {
        match self.action.strip_prefix('$') {
            Some(name) => req
                .latest_param(name)
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_ACTION)
                .to_string(),
            None => self.action.clone(),
        }
    }
}

/// What a handler does with a matched action.
pub enum HandlerOutcome {
    /// Finish the request with this response.
    Response(Response),
    /// Hand the rest of the URL to another handler.
    Delegate(Arc<dyn RequestHandler>),
}

impl std::fmt::Debug for HandlerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Response(res) => f.debug_tuple("Response").field(res).finish(),
            Self::Delegate(_) => f.write_str("Delegate(..)"),
        }
    }
}

/// A link in the chain of responsibility.
///
/// The dispatcher tries each of [`RequestHandler::url_handlers`] in order
/// against the same [`RequestContext`]; the first pattern that matches
/// selects the action passed to [`RequestHandler::handle_action`].
///
/// # Example
///
/// ```ignore
/// struct Pages;
///
/// impl RequestHandler for Pages {
///     fn handle_action<'a>(
///         &'a self,
///         action: &'a str,
///         req: &'a mut RequestContext,
///     ) -> BoxFuture<'a, HandlerOutcome> {
///         Box::pin(async move {
///             let id = req.param("ID").unwrap_or("none");
///             HandlerOutcome::Response(Response::text(format!("{action} {id}")))
///         })
///     }
/// }
/// ```
pub trait RequestHandler: Send + Sync {
    /// Ordered rules for this handler.
    ///
    /// Defaults to `$Action//$ID/$OtherID`, which shifts one segment and
    /// accepts two optional trailing ids.
    fn url_handlers(&self) -> &[UrlHandler] {
        &DEFAULT_URL_HANDLERS
    }

    /// Runs `action` for the current request.
    fn handle_action<'a>(
        &'a self,
        action: &'a str,
        req: &'a mut RequestContext,
    ) -> BoxFuture<'a, HandlerOutcome>;
}
