//! The per-request context that patterns are matched against.

use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{RequestError, Result};
use crate::params::{MatchOutcome, Params};
use crate::pattern::{self, AnyController, ControllerResolver, Pattern};

/// Form field that overrides the transport method.
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Header that overrides the transport method when no form field is sent.
pub const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";

static EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\.([A-Za-z][A-Za-z0-9]*)$").expect("Invalid extension regex")
});

/// HTTP request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method
    Get,
    /// POST method
    Post,
    /// PUT method
    Put,
    /// PATCH method
    Patch,
    /// DELETE method
    Delete,
    /// HEAD method
    Head,
    /// OPTIONS method
    Options,
}

impl Method {
    /// Parses a method token, ignoring case.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(RequestError::UnknownMethod(s.to_string())),
        }
    }

    /// Returns the method as an uppercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Returns true for methods a client may switch to via an override.
    pub fn is_override_target(self) -> bool {
        matches!(
            self,
            Self::Get | Self::Post | Self::Put | Self::Delete | Self::Head
        )
    }

    /// Resolves the effective method from an override value.
    fn from_override(value: &str) -> Result<Self> {
        Self::parse(value)
            .ok()
            .filter(|m| m.is_override_target())
            .ok_or_else(|| RequestError::InvalidMethodOverride(value.to_string()))
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client address fields handed over by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    /// Client IP reported by a shared-internet proxy.
    pub client_ip: Option<String>,
    /// `X-Forwarded-For` value set by a reverse proxy.
    pub forwarded_for: Option<String>,
    /// Address of the socket peer.
    pub remote_addr: Option<String>,
}

/// Collects transport data and builds a [`RequestContext`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    query: HashMap<String, String>,
    post: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
    peer: PeerInfo,
}

impl RequestBuilder {
    /// Starts a request for `method` on `url`.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: HashMap::new(),
            post: HashMap::new(),
            headers: HashMap::new(),
            body: None,
            peer: PeerInfo::default(),
        }
    }

    /// Sets a query string parameter.
    #[must_use]
    pub fn query_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Replaces all query string parameters.
    #[must_use]
    pub fn query_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.query = vars;
        self
    }

    /// Sets a form body parameter.
    #[must_use]
    pub fn post_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.post.insert(key.into(), value.into());
        self
    }

    /// Replaces all form body parameters.
    #[must_use]
    pub fn post_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.post = vars;
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the client address fields.
    #[must_use]
    pub fn peer(mut self, peer: PeerInfo) -> Self {
        self.peer = peer;
        self
    }

    /// Builds the context.
    ///
    /// Fails if `_method` (or, without it, the override header) names a
    /// method other than GET, POST, PUT, DELETE or HEAD.
    pub fn build(self) -> Result<RequestContext> {
        let method = match self
            .post
            .get(METHOD_OVERRIDE_FIELD)
            .or_else(|| self.headers.get(METHOD_OVERRIDE_HEADER))
        {
            Some(value) => {
                let method = Method::from_override(value)?;
                debug!(from = %self.method, to = %method, "method override applied");
                method
            }
            None => self.method,
        };

        Ok(self.into_context(method))
    }

    fn into_context(self, method: Method) -> RequestContext {
        let (url, extension) = split_url(&self.url);
        let segments = url
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        RequestContext {
            method,
            url,
            segments,
            extension,
            query: self.query,
            post: self.post,
            headers: self.headers,
            body: self.body,
            peer: self.peer,
            all_params: Params::new(),
            latest_params: Params::new(),
            unshifted_but_parsed: 0,
        }
    }
}

/// A request being routed through a chain of handlers.
///
/// The URL is split into segments once; each successful match can shift
/// segments off the front so the next handler only sees what is left.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    url: String,
    segments: VecDeque<String>,
    extension: Option<String>,
    query: HashMap<String, String>,
    post: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
    peer: PeerInfo,
    all_params: Params,
    latest_params: Params,
    unshifted_but_parsed: usize,
}

impl RequestContext {
    /// Builds a context from already decoded transport data.
    pub fn new(
        method: Method,
        url: &str,
        query: HashMap<String, String>,
        post: HashMap<String, String>,
        body: Option<Vec<u8>>,
    ) -> Result<Self> {
        let mut builder = RequestBuilder::new(method, url)
            .query_vars(query)
            .post_vars(post);
        builder.body = body;
        builder.build()
    }

    /// Starts a builder for `method` on `url`.
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// Creates a GET request with no parameters.
    pub fn get(url: &str) -> Self {
        Self::bare(Method::Get, url)
    }

    /// Creates a POST request with no parameters.
    pub fn post(url: &str) -> Self {
        Self::bare(Method::Post, url)
    }

    fn bare(method: Method, url: &str) -> Self {
        RequestBuilder::new(method, url).into_context(method)
    }

    /// Matches `pattern` against the unconsumed URL.
    ///
    /// Captured `$Controller` values are accepted as-is; use
    /// [`RequestContext::match_pattern_with`] to validate them.
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_request::RequestContext;
    ///
    /// let mut req = RequestContext::get("admin/crm/list");
    /// let outcome = req.match_pattern("admin/crm/$Action!", true).unwrap();
    /// assert_eq!(outcome.get("Action"), Some("list"));
    /// assert!(req.all_parsed());
    /// ```
    pub fn match_pattern(&mut self, pattern: &str, shift_on_success: bool) -> Option<MatchOutcome> {
        self.match_pattern_with(pattern, shift_on_success, &AnyController)
    }

    /// Matches `pattern`, checking `$Controller` captures with `resolver`.
    pub fn match_pattern_with<R>(
        &mut self,
        pattern: &str,
        shift_on_success: bool,
        resolver: &R,
    ) -> Option<MatchOutcome>
    where
        R: ControllerResolver + ?Sized,
    {
        self.match_parsed(&Pattern::parse(pattern), shift_on_success, resolver)
    }

    /// Matches an already parsed pattern.
    ///
    /// A failed match leaves the context untouched.
    pub fn match_parsed<R>(
        &mut self,
        pattern: &Pattern,
        shift_on_success: bool,
        resolver: &R,
    ) -> Option<MatchOutcome>
    where
        R: ControllerResolver + ?Sized,
    {
        if !pattern.allows(self.method) {
            return None;
        }

        // The root pattern only matches an exhausted URL and records nothing.
        if pattern.is_empty() {
            return self.segments.is_empty().then_some(MatchOutcome::Matched);
        }

        let params = pattern.captures(&self.segments, self.extension.as_deref(), resolver)?;

        if shift_on_success {
            self.drop_front(pattern.shift_count());
            self.unshifted_but_parsed = pattern.unshifted_count();
        }

        self.all_params.merge_non_empty(&params);
        self.latest_params = params.clone();

        Some(MatchOutcome::from_params(params))
    }

    /// Shifts one segment off the front of the URL.
    pub fn shift(&mut self) -> Option<String> {
        self.segments.pop_front()
    }

    /// Shifts `count` segments off the front of the URL.
    ///
    /// Positions past the end of the URL come back as `None`.
    pub fn shift_many(&mut self, count: usize) -> Vec<Option<String>> {
        (0..count).map(|_| self.segments.pop_front()).collect()
    }

    fn drop_front(&mut self, count: usize) {
        let count = count.min(self.segments.len());
        self.segments.drain(..count);
    }

    /// Returns true once every remaining segment has been looked at by a
    /// match that chose not to shift it.
    pub fn all_parsed(&self) -> bool {
        self.segments.len() <= self.unshifted_but_parsed
    }

    /// Returns the unconsumed part of the URL.
    pub fn remaining(&self) -> String {
        self.segments
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Returns true if `pattern` consumes nothing once its method gate is
    /// removed.
    pub fn is_empty_pattern(&self, pattern: &str) -> bool {
        pattern::is_empty_pattern(pattern)
    }

    /// Parameters accumulated over every match so far.
    pub fn all_params(&self) -> &Params {
        &self.all_params
    }

    /// Parameters captured by the most recent match.
    pub fn latest_params(&self) -> &Params {
        &self.latest_params
    }

    /// Looks up an accumulated parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.all_params.get(name)
    }

    /// Looks up a parameter from the most recent match.
    pub fn latest_param(&self, name: &str) -> Option<&str> {
        self.latest_params.get(name)
    }

    /// Returns the resolved HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::Get
    }

    pub fn is_post(&self) -> bool {
        self.method == Method::Post
    }

    pub fn is_put(&self) -> bool {
        self.method == Method::Put
    }

    pub fn is_delete(&self) -> bool {
        self.method == Method::Delete
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::Head
    }

    /// Returns the normalized URL without its extension.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the URL extension, e.g. `json` for `products/show.json`.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Gets a query string parameter.
    pub fn query_var(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Gets a form body parameter.
    pub fn post_var(&self, name: &str) -> Option<&str> {
        self.post.get(name).map(String::as_str)
    }

    /// Gets a body or query parameter, preferring the body.
    pub fn request_var(&self, name: &str) -> Option<&str> {
        self.post_var(name).or_else(|| self.query_var(name))
    }

    /// Returns true if the body or query carries `name`.
    pub fn has_var(&self, name: &str) -> bool {
        self.post.contains_key(name) || self.query.contains_key(name)
    }

    pub fn query_vars(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn post_vars(&self) -> &HashMap<String, String> {
        &self.post
    }

    /// Returns query and body parameters combined; body values win.
    pub fn request_vars(&self) -> HashMap<String, String> {
        let mut vars = self.query.clone();
        vars.extend(self.post.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }

    /// Sets a header, replacing any header of the same name.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Gets a header by its exact name.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Removes a header by its exact name.
    pub fn remove_header(&mut self, key: &str) -> Option<String> {
        self.headers.remove(key)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = Some(body.into());
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| String::from_utf8(b.clone()).ok())
    }

    /// Returns the client address, preferring proxy-reported values.
    pub fn ip(&self) -> Option<&str> {
        [
            &self.peer.client_ip,
            &self.peer.forwarded_for,
            &self.peer.remote_addr,
        ]
        .into_iter()
        .filter_map(Option::as_deref)
        .find(|ip| !ip.is_empty())
    }

    /// Returns the mimetypes listed in the `Accept` header.
    ///
    /// Quality parameters such as `;q=0.9` are stripped unless
    /// `include_quality` is set.
    pub fn accept_mimetypes(&self, include_quality: bool) -> Vec<String> {
        let Some(accept) = self.header("Accept") else {
            return Vec::new();
        };
        accept
            .split(',')
            .map(|entry| {
                let entry = if include_quality {
                    entry
                } else {
                    entry.split(';').next().unwrap_or_default()
                };
                entry.trim().to_string()
            })
            .filter(|entry| !entry.is_empty())
            .collect()
    }

    /// Parses query parameters from a query string.
    pub fn parse_query_string(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let key = parts.next()?;
                let value = parts.next().unwrap_or("");
                Some((urlencoding_decode(key), urlencoding_decode(value)))
            })
            .collect()
    }
}

/// Collapses and trims separators, then splits off a trailing extension.
fn split_url(raw: &str) -> (String, Option<String>) {
    let url = raw
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    match EXTENSION.captures(&url) {
        Some(caps) => {
            let body = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let ext = caps.get(2).map(|m| m.as_str().to_string());
            (body, ext)
        }
        None => (url, None),
    }
}

/// Simple URL decoding.
fn urlencoding_decode(s: &str) -> String {
    let mut bytes = Vec::with_capacity(s.len());
    let mut rest = s.as_bytes();

    while let Some((&b, tail)) = rest.split_first() {
        match b {
            b'%' if tail.len() >= 2 => {
                let hex = std::str::from_utf8(&tail[..2]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        bytes.push(byte);
                        rest = &tail[2..];
                        continue;
                    }
                    None => bytes.push(b'%'),
                }
            }
            b'+' => bytes.push(b' '),
            _ => bytes.push(b),
        }
        rest = tail;
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!(Method::parse("GET"), Ok(Method::Get));
        assert_eq!(Method::parse("post"), Ok(Method::Post));
        assert_eq!(
            Method::parse("INVALID"),
            Err(RequestError::UnknownMethod("INVALID".to_string()))
        );
    }

    #[test]
    fn test_url_normalization() {
        let req = RequestContext::get("//admin///crm/list/");
        assert_eq!(req.url(), "admin/crm/list");
        assert_eq!(req.remaining(), "admin/crm/list");
        assert_eq!(req.extension(), None);
    }

    #[test]
    fn test_extension_split() {
        let req = RequestContext::get("products/show.json");
        assert_eq!(req.url(), "products/show");
        assert_eq!(req.remaining(), "products/show");
        assert_eq!(req.extension(), Some("json"));
    }

    #[test]
    fn test_extension_must_start_with_letter() {
        let req = RequestContext::get("files/v1.2");
        assert_eq!(req.extension(), None);
        assert_eq!(req.remaining(), "files/v1.2");

        let req = RequestContext::get("archive.tar.gz");
        assert_eq!(req.extension(), Some("gz"));
        assert_eq!(req.url(), "archive.tar");
    }

    #[test]
    fn test_empty_url() {
        let req = RequestContext::get("/");
        assert_eq!(req.remaining(), "");
        assert!(req.all_parsed());
    }

    #[test]
    fn test_method_override_field() {
        let req = RequestContext::builder(Method::Post, "pages/1")
            .post_var(METHOD_OVERRIDE_FIELD, "delete")
            .build()
            .unwrap();
        assert_eq!(req.method(), Method::Delete);
        assert!(req.is_delete());
    }

    #[test]
    fn test_method_override_rejected() {
        let err = RequestContext::builder(Method::Post, "pages/1")
            .post_var(METHOD_OVERRIDE_FIELD, "PATCH")
            .build()
            .unwrap_err();
        assert_eq!(err, RequestError::InvalidMethodOverride("PATCH".to_string()));
    }

    #[test]
    fn test_field_overrules_header() {
        let req = RequestContext::builder(Method::Post, "pages/1")
            .header(METHOD_OVERRIDE_HEADER, "DELETE")
            .post_var(METHOD_OVERRIDE_FIELD, "PUT")
            .build()
            .unwrap();
        assert_eq!(req.method(), Method::Put);

        let req = RequestContext::builder(Method::Post, "pages/1")
            .header(METHOD_OVERRIDE_HEADER, "HEAD")
            .build()
            .unwrap();
        assert!(req.is_head());
    }

    #[test]
    fn test_request_vars_prefer_body() {
        let req = RequestContext::builder(Method::Post, "search")
            .query_var("q", "from-query")
            .query_var("page", "2")
            .post_var("q", "from-body")
            .build()
            .unwrap();
        assert_eq!(req.request_var("q"), Some("from-body"));
        assert_eq!(req.request_var("page"), Some("2"));
        assert_eq!(req.query_var("q"), Some("from-query"));
        assert!(req.has_var("page"));
        assert!(!req.has_var("missing"));
        assert_eq!(req.request_vars().get("q").map(String::as_str), Some("from-body"));
    }

    #[test]
    fn test_headers() {
        let mut req = RequestContext::get("");
        req.add_header("Content-Type", "text/xml");
        req.add_header("Content-Type", "application/json");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("content-type"), None);
        assert_eq!(req.remove_header("Content-Type"), Some("application/json".to_string()));
        assert!(req.headers().is_empty());
    }

    #[test]
    fn test_body() {
        let mut req = RequestContext::post("upload");
        assert_eq!(req.body(), None);
        req.set_body("payload");
        assert_eq!(req.body_string(), Some("payload".to_string()));
    }

    #[test]
    fn test_ip_priority() {
        let peer = PeerInfo {
            client_ip: Some(String::new()),
            forwarded_for: Some("10.0.0.2".to_string()),
            remote_addr: Some("127.0.0.1".to_string()),
        };
        let req = RequestContext::builder(Method::Get, "")
            .peer(peer)
            .build()
            .unwrap();
        assert_eq!(req.ip(), Some("10.0.0.2"));
        assert_eq!(RequestContext::get("").ip(), None);
    }

    #[test]
    fn test_accept_mimetypes() {
        let mut req = RequestContext::get("");
        assert!(req.accept_mimetypes(false).is_empty());
        req.add_header("Accept", "text/html, application/xml;q=0.9,*/*;q=0.8");
        assert_eq!(
            req.accept_mimetypes(false),
            vec!["text/html", "application/xml", "*/*"]
        );
        assert_eq!(
            req.accept_mimetypes(true),
            vec!["text/html", "application/xml;q=0.9", "*/*;q=0.8"]
        );
    }

    #[test]
    fn test_query_string_parsing() {
        let query = RequestContext::parse_query_string("name=John+Doe&age=30&city=New%20York&");
        assert_eq!(query.get("name"), Some(&"John Doe".to_string()));
        assert_eq!(query.get("age"), Some(&"30".to_string()));
        assert_eq!(query.get("city"), Some(&"New York".to_string()));
        assert_eq!(query.len(), 3);
    }

    #[test]
    fn test_query_string_utf8() {
        let query = RequestContext::parse_query_string("q=caf%C3%A9&bad=%zz");
        assert_eq!(query.get("q"), Some(&"café".to_string()));
        assert_eq!(query.get("bad"), Some(&"%zz".to_string()));
    }
}
