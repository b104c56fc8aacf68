//! URL pattern parsing and matching.
//!
//! Pattern syntax:
//! - `admin/crm` - literal segments, matched in order
//! - `$Action` - optional variable, captures `None` when the URL runs out
//! - `$Action!` - required variable, the match fails without a segment
//! - `admin//$Action` - the `//` marks how far a successful match shifts
//! - `POST $Action` - only matches requests with the given method
//! - `feed.rss` - a literal may carry the URL extension

use std::collections::VecDeque;
use std::sync::LazyLock;

use regex::Regex;

use crate::params::Params;
use crate::request::Method;

/// Variable name whose captured value must name a known controller.
pub const CONTROLLER_PARAM: &str = "Controller";

static METHOD_GATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]+)\s+(.*)$").expect("Invalid method gate regex")
});

/// Decides whether a captured `$Controller` value names a known handler.
pub trait ControllerResolver {
    /// Returns true if `name` can be resolved to a handler.
    fn resolves(&self, name: &str) -> bool;
}

impl<F> ControllerResolver for F
where
    F: Fn(&str) -> bool,
{
    fn resolves(&self, name: &str) -> bool {
        self(name)
    }
}

/// Resolver that accepts every captured controller name.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyController;

impl ControllerResolver for AnyController {
    fn resolves(&self, _name: &str) -> bool {
        true
    }
}

/// A segment in a URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegment {
    /// A literal segment, compared verbatim.
    Literal(String),
    /// A `$Name` or `$Name!` variable.
    Capture { name: String, required: bool },
}

impl PatternSegment {
    fn parse(part: &str) -> Self {
        let part = part.trim();
        match part.strip_prefix('$') {
            Some(var) => match var.strip_suffix('!') {
                Some(name) => Self::Capture {
                    name: name.to_string(),
                    required: true,
                },
                None => Self::Capture {
                    name: var.to_string(),
                    required: false,
                },
            },
            None => Self::Literal(part.to_string()),
        }
    }
}

/// A parsed URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pattern: String,
    method: Option<String>,
    segments: Vec<PatternSegment>,
    shift_count: usize,
}

impl Pattern {
    /// Parses a pattern string.
    ///
    /// # Example
    ///
    /// ```
    /// use oxide_request::Pattern;
    ///
    /// let pattern = Pattern::parse("GET admin//crm/$Action!");
    /// assert_eq!(pattern.method(), Some("GET"));
    /// assert_eq!(pattern.len(), 3);
    /// assert_eq!(pattern.shift_count(), 1);
    /// ```
    pub fn parse(pattern: &str) -> Self {
        let (method, rest) = split_method_gate(pattern);

        if rest.is_empty() {
            return Self {
                pattern: pattern.to_string(),
                method: method.map(str::to_string),
                segments: Vec::new(),
                shift_count: 0,
            };
        }

        let (path, shift_count) = match rest.find("//") {
            Some(point) => {
                let shift = rest[..point].matches('/').count() + 1;
                (rest.replace("//", "/"), Some(shift))
            }
            None => (rest.to_string(), None),
        };

        let segments: Vec<_> = path.split('/').map(PatternSegment::parse).collect();
        let shift_count = shift_count.unwrap_or(segments.len());

        Self {
            pattern: pattern.to_string(),
            method: method.map(str::to_string),
            segments,
            shift_count,
        }
    }

    /// Returns the original pattern string.
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Returns the method this pattern is restricted to, if any.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// Number of URL segments inspected by this pattern.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root pattern, which only matches an empty URL.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments shifted off the URL on a successful match.
    pub fn shift_count(&self) -> usize {
        self.shift_count
    }

    /// Segments inspected but left in place by a shifting match.
    pub fn unshifted_count(&self) -> usize {
        self.segments.len().saturating_sub(self.shift_count)
    }

    /// Returns true if the method gate (if any) admits `method`.
    pub fn allows(&self, method: Method) -> bool {
        self.method.as_deref().is_none_or(|m| m == method.as_str())
    }

    /// Matches the pattern segments against a URL segment queue.
    ///
    /// Segments are compared strictly by position with no backtracking.
    /// The method gate and the root case are left to the caller.
    pub fn captures<R>(
        &self,
        url: &VecDeque<String>,
        extension: Option<&str>,
        resolver: &R,
    ) -> Option<Params>
    where
        R: ControllerResolver + ?Sized,
    {
        let mut params = Params::new();

        for (i, segment) in self.segments.iter().enumerate() {
            let value = url.get(i);
            match segment {
                PatternSegment::Capture { name, required } => {
                    if *required && value.is_none() {
                        return None;
                    }
                    if name == CONTROLLER_PARAM && !value.is_some_and(|v| resolver.resolves(v)) {
                        return None;
                    }
                    params.insert(name.clone(), value.cloned());
                }
                PatternSegment::Literal(literal) => {
                    if value.is_some_and(|v| literal_with_extension(literal, v, extension)) {
                        continue;
                    }
                    if value != Some(literal) {
                        return None;
                    }
                }
            }
        }

        Some(params)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Returns true if the pattern consumes nothing once its method gate is
/// removed.
pub fn is_empty_pattern(pattern: &str) -> bool {
    split_method_gate(pattern).1.trim().is_empty()
}

fn split_method_gate(pattern: &str) -> (Option<&str>, &str) {
    match METHOD_GATE.captures(pattern) {
        Some(caps) => {
            let method = caps.get(1).map(|m| m.as_str());
            let rest = caps.get(2).map_or("", |m| m.as_str());
            (method, rest)
        }
        None => (None, pattern),
    }
}

// `show.json` is satisfied by the segment `show` when the URL extension is `json`.
fn literal_with_extension(literal: &str, segment: &str, extension: Option<&str>) -> bool {
    let Some(ext) = extension else {
        return false;
    };
    literal
        .strip_prefix(segment)
        .and_then(|rest| rest.strip_prefix('.'))
        == Some(ext)
}
