//! # oxide-request
//!
//! A request context for chained URL handlers.
//!
//! This crate provides:
//! - URL normalization into segments plus an optional extension
//! - Sequential pattern matching that shifts consumed segments
//! - Required and optional `$Variable` captures
//! - Method-gated patterns and method overrides
//! - A chain-of-responsibility dispatcher built on top
//!
//! ## Quick Start
//!
//! ```
//! use oxide_request::RequestContext;
//!
//! let mut req = RequestContext::get("admin/crm/list/extra");
//!
//! // `//` marks the shift point: only `admin` is consumed.
//! let outcome = req.match_pattern("admin//crm/$Action", true).unwrap();
//! assert_eq!(outcome.get("Action"), Some("list"));
//! assert_eq!(req.remaining(), "crm/list/extra");
//! ```
//!
//! ## Pattern Syntax
//!
//! | Pattern | Meaning |
//! |---------|---------|
//! | `admin/crm` | literal segments |
//! | `$Action` | optional variable |
//! | `$Action!` | required variable |
//! | `admin//$Action` | shift only the segments before `//` |
//! | `POST $Action` | only match POST requests |
//!
//! ## Accumulated Parameters
//!
//! Every successful match replaces [`RequestContext::latest_params`] and is
//! folded into [`RequestContext::all_params`], where a blank capture never
//! erases an earlier value:
//!
//! ```
//! use oxide_request::RequestContext;
//!
//! let mut req = RequestContext::get("item/5/edit");
//! req.match_pattern("item/$ID", true).unwrap();
//! req.match_pattern("$Action/$ID", true).unwrap();
//!
//! assert_eq!(req.param("ID"), Some("5"));
//! assert_eq!(req.latest_param("ID"), None);
//! ```
//!
//! ## Dispatching
//!
//! ```ignore
//! use oxide_request::{Dispatcher, RequestContext};
//!
//! let dispatcher = Dispatcher::new()
//!     .controller("Pages", PagesController)
//!     .rule("$Controller//$Action/$ID/$OtherID", "$Controller");
//!
//! let mut req = RequestContext::get("Pages/show/5");
//! let response = dispatcher.dispatch(&mut req).await;
//! ```

mod dispatcher;
mod error;
mod handler;
mod params;
mod pattern;
mod request;
mod response;

pub use dispatcher::{DispatchConfig, DispatchRule, Dispatcher};
pub use error::{DispatchError, RequestError, Result};
pub use handler::{BoxFuture, DEFAULT_ACTION, HandlerOutcome, RequestHandler, UrlHandler};
pub use params::{MatchOutcome, Params};
pub use pattern::{
    AnyController, CONTROLLER_PARAM, ControllerResolver, Pattern, PatternSegment, is_empty_pattern,
};
pub use request::{
    METHOD_OVERRIDE_FIELD, METHOD_OVERRIDE_HEADER, Method, PeerInfo, RequestBuilder,
    RequestContext,
};
pub use response::Response;
