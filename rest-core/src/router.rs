//! Path router: exact-match table for static patterns, segment-count buckets for
//! patterns with `:name` parameters and a trailing `*name` catch-all.
//!
//! A router is filled once at startup and then only read. `add` takes `&mut self`
//! and `lookup` takes `&self`, so a frozen router can be shared between worker
//! threads without locking. Registering routes after serving has started needs
//! external synchronization (an `RwLock` or swapping in a rebuilt router).

use std::collections::HashMap;

use thiserror::Error;

use crate::path;

/// Opaque route handle used by [`crate::Application`] as the router's handler value.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RouteId(pub u32);

/// Upper bound on segments in a single pattern.
pub const MAX_SEGMENTS: usize = 32767;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("path too long: {segments} segments (max {max})")]
    PathTooLong { segments: usize, max: usize },
    #[error("catch-all parameter must be last: {0}")]
    CatchAllNotLast(String),
    #[error("no handler registered for {method} {pattern}")]
    NilHandler { method: String, pattern: String },
}

/// One parsed pattern segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if let Some(name) = raw.strip_prefix(':') {
            Segment::Param(name.to_owned())
        } else if let Some(name) = raw.strip_prefix('*') {
            Segment::CatchAll(name.to_owned())
        } else {
            Segment::Literal(raw.to_owned())
        }
    }
}

/// Named path parameter bound during lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Parameters in pattern order. Duplicate keys are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    fn with_capacity(n: usize) -> Self {
        Self(Vec::with_capacity(n))
    }

    pub(crate) fn push(&mut self, key: &str, value: String) {
        self.0.push(Param {
            key: key.to_owned(),
            value,
        });
    }

    /// First value bound to `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Last value bound to `key`.
    pub fn get_last(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Param] {
        &self.0
    }
}

impl IntoIterator for Params {
    type Item = Param;
    type IntoIter = std::vec::IntoIter<Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug)]
struct StaticRoute<H> {
    pattern: String,
    handler: H,
}

/// Parameterized pattern filed under its segment count.
#[derive(Debug)]
struct Record<H> {
    pattern: String,
    segments: Vec<Segment>,
    param_count: usize,
    has_catch_all: bool,
    handler: H,
}

impl<H> Record<H> {
    /// Catch-all records sort after every other record of their tier.
    fn order_key(&self) -> (bool, usize) {
        (self.has_catch_all, self.param_count)
    }

    fn capture(&self, parts: &[String]) -> Option<Params> {
        let mut params = Params::with_capacity(self.param_count);
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if parts.get(i)? != literal {
                        return None;
                    }
                }
                Segment::Param(name) => params.push(name, parts.get(i)?.clone()),
                Segment::CatchAll(name) => {
                    params.push(name, path::join(parts.get(i..)?));
                    break;
                }
            }
        }
        Some(params)
    }
}

/// Successful lookup: the handler, the parameters it bound and the pattern it
/// was registered under.
#[derive(Debug)]
pub struct Match<'r, H> {
    pub handler: &'r H,
    pub params: Params,
    pub pattern: &'r str,
}

/// Maps request paths to handlers.
///
/// Lookup order: the static table first, then tiers of parameterized patterns
/// from the request's segment count downwards. Within a tier, patterns without a
/// catch-all come first, ordered by parameter count, then by registration order.
/// Tiers shorter than the request only consider catch-all patterns, so a short
/// catch-all pattern wins over anything that was never registered at the
/// request's own length.
#[derive(Debug)]
pub struct Router<H> {
    static_routes: HashMap<String, StaticRoute<H>>,
    dynamic: HashMap<usize, Vec<Record<H>>>,
    max_segments: usize,
    min_catch_all: Option<usize>,
    dynamic_count: usize,
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self {
            static_routes: HashMap::new(),
            dynamic: HashMap::new(),
            max_segments: 0,
            min_catch_all: None,
            dynamic_count: 0,
        }
    }

    /// Register `pattern`. Re-registering an identical static pattern replaces its
    /// handler. A failed registration leaves the router unchanged.
    pub fn add(&mut self, pattern: &str, handler: H) -> Result<(), RouterError> {
        let parts = path::split(pattern);
        let length = parts.len();
        if length > MAX_SEGMENTS {
            return Err(RouterError::PathTooLong {
                segments: length,
                max: MAX_SEGMENTS,
            });
        }

        let mut segments = Vec::with_capacity(length);
        let mut param_count = 0;
        let mut has_catch_all = false;
        for (i, part) in parts.iter().enumerate() {
            let segment = Segment::parse(part);
            match segment {
                Segment::Literal(_) => {}
                Segment::Param(_) => param_count += 1,
                Segment::CatchAll(_) => {
                    if i + 1 != length {
                        return Err(RouterError::CatchAllNotLast(pattern.to_owned()));
                    }
                    param_count += 1;
                    has_catch_all = true;
                }
            }
            segments.push(segment);
        }

        if param_count == 0 {
            self.static_routes.insert(
                path::join(&parts),
                StaticRoute {
                    pattern: pattern.to_owned(),
                    handler,
                },
            );
            return Ok(());
        }

        let record = Record {
            pattern: pattern.to_owned(),
            segments,
            param_count,
            has_catch_all,
            handler,
        };
        let key = record.order_key();
        let bucket = self.dynamic.entry(length).or_default();
        let at = bucket.partition_point(|r| r.order_key() <= key);
        bucket.insert(at, record);

        self.max_segments = self.max_segments.max(length);
        if has_catch_all {
            self.min_catch_all = Some(self.min_catch_all.map_or(length, |m| m.min(length)));
        }
        self.dynamic_count += 1;
        Ok(())
    }

    /// Resolve a request path. `None` means no registered pattern matches.
    pub fn lookup(&self, path: &str) -> Option<Match<'_, H>> {
        let parts = path::split(path);
        if let Some(route) = self.static_routes.get(&path::join(&parts)) {
            return Some(Match {
                handler: &route.handler,
                params: Params::new(),
                pattern: &route.pattern,
            });
        }
        if self.dynamic.is_empty() {
            return None;
        }

        let length = parts.len();
        let start = if length > self.max_segments {
            if self.min_catch_all.is_none() {
                return None;
            }
            self.max_segments
        } else {
            length
        };

        for tier in (1..=start).rev() {
            if tier < length {
                match self.min_catch_all {
                    Some(min) if tier >= min => {}
                    _ => break,
                }
            }
            let Some(records) = self.dynamic.get(&tier) else {
                continue;
            };
            for record in records {
                if tier < length && !record.has_catch_all {
                    continue;
                }
                if let Some(params) = record.capture(&parts) {
                    return Some(Match {
                        handler: &record.handler,
                        params,
                        pattern: &record.pattern,
                    });
                }
            }
        }
        None
    }

    /// Pattern a handler was registered under. When the same handler is
    /// registered under several patterns, which one is returned is unspecified.
    pub fn path_of(&self, handler: &H) -> Option<&str>
    where
        H: PartialEq,
    {
        self.static_routes
            .values()
            .find(|r| &r.handler == handler)
            .map(|r| r.pattern.as_str())
            .or_else(|| {
                self.dynamic
                    .values()
                    .flatten()
                    .find(|r| &r.handler == handler)
                    .map(|r| r.pattern.as_str())
            })
    }

    /// Largest segment count among parameterized patterns (0 if none).
    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn len(&self) -> usize {
        self.static_routes.len() + self.dynamic_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}
