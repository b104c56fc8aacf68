//! Top-level dispatch loop.
//!
//! A [`Dispatcher`] owns the top-level rules and the registry of named
//! controllers. It matches one rule, hands the context to the selected
//! controller and then walks the handler chain until a response is
//! produced or the URL cannot be matched any further.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::handler::{BoxFuture, HandlerOutcome, RequestHandler, UrlHandler};
use crate::pattern::{AnyController, Pattern};
use crate::request::RequestContext;
use crate::response::Response;

/// A top-level rule mapping a pattern to a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRule {
    /// Pattern matched against the full URL.
    pub pattern: String,
    /// Controller name, or `$Controller` to use the captured value.
    pub controller: String,
}

/// Serializable dispatch rules.
///
/// ```json
/// { "rules": [{ "pattern": "$Controller//$Action/$ID/$OtherID", "controller": "$Controller" }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub rules: Vec<DispatchRule>,
}

impl DispatchConfig {
    /// Decodes the rules from JSON.
    pub fn from_json(json: &str) -> Result<Self, DispatchError> {
        Ok(serde_json::from_str(json)?)
    }
}

enum Step {
    Done(Response),
    Delegate(Arc<dyn RequestHandler>),
}

/// Routes requests to registered controllers.
pub struct Dispatcher {
    /// Top-level rules in match order.
    rules: Vec<(Pattern, String)>,
    /// Controllers addressable by name.
    controllers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with no rules.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            controllers: HashMap::new(),
        }
    }

    /// Builds a dispatcher from decoded rules and a controller registry.
    ///
    /// Every rule naming a literal controller must find it in `controllers`.
    pub fn from_config(
        config: DispatchConfig,
        controllers: HashMap<String, Arc<dyn RequestHandler>>,
    ) -> Result<Self, DispatchError> {
        for rule in &config.rules {
            if !rule.controller.starts_with('$') && !controllers.contains_key(&rule.controller) {
                return Err(DispatchError::UnknownController(rule.controller.clone()));
            }
        }

        Ok(Self {
            rules: config
                .rules
                .into_iter()
                .map(|rule| (Pattern::parse(&rule.pattern), rule.controller))
                .collect(),
            controllers,
        })
    }

    /// Registers a controller under `name`.
    #[must_use]
    pub fn controller(mut self, name: impl Into<String>, handler: impl RequestHandler + 'static) -> Self {
        self.controllers.insert(name.into(), Arc::new(handler));
        self
    }

    /// Adds a top-level rule.
    #[must_use]
    pub fn rule(mut self, pattern: &str, controller: impl Into<String>) -> Self {
        self.rules.push((Pattern::parse(pattern), controller.into()));
        self
    }

    /// Returns true if a controller is registered under `name`.
    pub fn has_controller(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    /// Dispatches a request, turning failures into error responses.
    pub fn dispatch<'a>(&'a self, req: &'a mut RequestContext) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            match self.try_dispatch(req).await {
                Ok(response) => response,
                Err(DispatchError::NotFound { .. }) => Response::not_found(),
                Err(err @ DispatchError::DelegationLoop { .. }) => {
                    warn!(error = %err, "handler chain stopped");
                    Response::not_found()
                }
                Err(err) => {
                    warn!(error = %err, "dispatch failed");
                    Response::internal_server_error()
                }
            }
        })
    }

    /// Dispatches a request through the top-level rules and the handler
    /// chain.
    pub async fn try_dispatch(&self, req: &mut RequestContext) -> Result<Response, DispatchError> {
        let handler = self.select_controller(req)?;
        self.handle_request(handler, req).await
    }

    /// Walks the handler chain starting at `handler`.
    pub async fn handle_request(
        &self,
        handler: Arc<dyn RequestHandler>,
        req: &mut RequestContext,
    ) -> Result<Response, DispatchError> {
        let mut current = handler;
        loop {
            match run_url_handlers(current.as_ref(), req).await? {
                Step::Done(response) => return Ok(response),
                Step::Delegate(next) => current = next,
            }
        }
    }

    fn select_controller(&self, req: &mut RequestContext) -> Result<Arc<dyn RequestHandler>, DispatchError> {
        let known = |name: &str| self.controllers.contains_key(name);

        for (pattern, target) in &self.rules {
            if req.match_parsed(pattern, true, &known).is_none() {
                continue;
            }

            let name = match target.strip_prefix('$') {
                Some(var) => req.latest_param(var).unwrap_or_default(),
                None => target.as_str(),
            };
            debug!(%pattern, controller = name, "dispatch rule matched");

            return self
                .controllers
                .get(name)
                .cloned()
                .ok_or_else(|| DispatchError::UnknownController(name.to_string()));
        }

        Err(not_found(req))
    }
}

async fn run_url_handlers(
    handler: &dyn RequestHandler,
    req: &mut RequestContext,
) -> Result<Step, DispatchError> {
    for rule in handler.url_handlers() {
        if req.match_pattern_with(&rule.pattern, true, &AnyController).is_none() {
            continue;
        }

        let action = rule.resolve_action(req);
        debug!(pattern = %rule.pattern, %action, remaining = %req.remaining(), "url handler matched");

        return match handler.handle_action(&action, req).await {
            HandlerOutcome::Response(response) if req.all_parsed() => Ok(Step::Done(response)),
            HandlerOutcome::Response(_) => Err(not_found(req)),
            HandlerOutcome::Delegate(next) => delegate(rule, next, req),
        };
    }

    Err(not_found(req))
}

fn delegate(
    rule: &UrlHandler,
    next: Arc<dyn RequestHandler>,
    req: &RequestContext,
) -> Result<Step, DispatchError> {
    if req.is_empty_pattern(&rule.pattern) {
        return Err(DispatchError::DelegationLoop {
            pattern: rule.pattern.clone(),
        });
    }
    debug!(remaining = %req.remaining(), "delegating to nested handler");
    Ok(Step::Delegate(next))
}

fn not_found(req: &RequestContext) -> DispatchError {
    DispatchError::NotFound {
        method: req.method().to_string(),
        path: req.remaining(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl RequestHandler for Echo {
        fn handle_action<'a>(
            &'a self,
            action: &'a str,
            req: &'a mut RequestContext,
        ) -> BoxFuture<'a, HandlerOutcome> {
            Box::pin(async move {
                let id = req.param("ID").unwrap_or("-");
                HandlerOutcome::Response(Response::text(format!("{action}:{id}")))
            })
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new()
            .controller("Pages", Echo)
            .rule("$Controller//$Action/$ID/$OtherID", "$Controller")
    }

    #[tokio::test]
    async fn test_dispatch_to_captured_controller() {
        let mut req = RequestContext::get("Pages/show/5");
        let res = dispatcher().dispatch(&mut req).await;
        assert_eq!(res.body_string(), Some("show:5".to_string()));
        assert_eq!(req.param("Controller"), Some("Pages"));
    }

    #[tokio::test]
    async fn test_unknown_controller_is_not_found() {
        let mut req = RequestContext::get("Missing/show/5");
        let res = dispatcher().dispatch(&mut req).await;
        assert_eq!(res.status, 404);
        assert_eq!(req.remaining(), "Missing/show/5");
    }

    #[tokio::test]
    async fn test_default_action_is_index() {
        let mut req = RequestContext::get("Pages");
        let res = dispatcher().dispatch(&mut req).await;
        assert_eq!(res.body_string(), Some("index:-".to_string()));
    }

    #[test]
    fn test_config_rejects_unknown_controller() {
        let config = DispatchConfig::from_json(
            r#"{"rules":[{"pattern":"admin//$Action","controller":"Admin"}]}"#,
        )
        .unwrap();
        let err = Dispatcher::from_config(config, HashMap::new()).err();
        assert!(matches!(err, Some(DispatchError::UnknownController(name)) if name == "Admin"));
    }

    #[test]
    fn test_config_invalid_json() {
        assert!(matches!(
            DispatchConfig::from_json("{rules"),
            Err(DispatchError::InvalidConfig(_))
        ));
    }
}
