#![allow(dead_code)]

use std::sync::Arc;

use oxide_request::{
    BoxFuture, HandlerOutcome, Method, RequestContext, RequestHandler, Response, UrlHandler,
};

pub fn get(url: &str) -> RequestContext {
    RequestContext::get(url)
}

pub fn request(method: Method, url: &str) -> RequestContext {
    RequestContext::builder(method, url)
        .build()
        .unwrap_or_else(|e| panic!("Failed to build {method} {url}: {e}"))
}

/// Answers every action with `action|Name=value,...` for the given names.
pub struct Reporter {
    pub rules: Vec<UrlHandler>,
    pub names: Vec<&'static str>,
}

impl Reporter {
    pub fn new(rules: &[(&str, &str)], names: &[&'static str]) -> Self {
        Self {
            rules: rules.iter().map(|(p, a)| UrlHandler::new(*p, *a)).collect(),
            names: names.to_vec(),
        }
    }
}

impl RequestHandler for Reporter {
    fn url_handlers(&self) -> &[UrlHandler] {
        &self.rules
    }

    fn handle_action<'a>(
        &'a self,
        action: &'a str,
        req: &'a mut RequestContext,
    ) -> BoxFuture<'a, HandlerOutcome> {
        Box::pin(async move {
            let values: Vec<String> = self
                .names
                .iter()
                .map(|name| format!("{name}={}", req.param(name).unwrap_or("-")))
                .collect();
            HandlerOutcome::Response(Response::text(format!("{action}|{}", values.join(","))))
        })
    }
}

/// Delegates every action to the wrapped handler.
pub struct Forward {
    pub rules: Vec<UrlHandler>,
    pub next: Arc<dyn RequestHandler>,
}

impl RequestHandler for Forward {
    fn url_handlers(&self) -> &[UrlHandler] {
        &self.rules
    }

    fn handle_action<'a>(
        &'a self,
        _action: &'a str,
        _req: &'a mut RequestContext,
    ) -> BoxFuture<'a, HandlerOutcome> {
        Box::pin(async move { HandlerOutcome::Delegate(Arc::clone(&self.next)) })
    }
}
