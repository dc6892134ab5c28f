//! Method dispatch: one [`Router`] per HTTP method.

use std::collections::BTreeMap;

use crate::router::{Match, Router, RouterError};

/// Outcome of [`ServeMux::dispatch`].
#[derive(Debug)]
pub enum Dispatch<'r, H> {
    Found(Match<'r, H>),
    /// The path is routed, but only for these methods (sorted).
    MethodNotAllowed(Vec<String>),
    NotFound,
}

/// Maps (method, path) to a handler. Methods are upper-cased; an empty method
/// means GET.
#[derive(Debug)]
pub struct ServeMux<H> {
    routers: BTreeMap<String, Router<H>>,
}

/// Upper-cased method; empty means GET.
pub(crate) fn normalize_method(method: &str) -> String {
    if method.is_empty() {
        "GET".to_owned()
    } else {
        method.to_uppercase()
    }
}

impl<H> ServeMux<H> {
    pub fn new() -> Self {
        Self {
            routers: BTreeMap::new(),
        }
    }

    pub fn handle(&mut self, method: &str, pattern: &str, handler: H) -> Result<(), RouterError> {
        let method = normalize_method(method);
        // A rejected pattern must not leave an empty router behind for its method.
        match self.routers.get_mut(&method) {
            Some(router) => router.add(pattern, handler),
            None => {
                let mut router = Router::new();
                router.add(pattern, handler)?;
                self.routers.insert(method, router);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, method: &str, path: &str) -> Option<Match<'_, H>> {
        self.routers.get(&normalize_method(method))?.lookup(path)
    }

    pub fn dispatch(&self, method: &str, path: &str) -> Dispatch<'_, H> {
        let method = normalize_method(method);
        if let Some(found) = self.routers.get(&method).and_then(|r| r.lookup(path)) {
            return Dispatch::Found(found);
        }
        let allowed: Vec<String> = self
            .routers
            .iter()
            .filter(|(m, router)| **m != method && router.lookup(path).is_some())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            Dispatch::NotFound
        } else {
            Dispatch::MethodNotAllowed(allowed)
        }
    }

    pub fn router(&self, method: &str) -> Option<&Router<H>> {
        self.routers.get(&normalize_method(method))
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.routers.keys().map(String::as_str)
    }
}

impl<H> Default for ServeMux<H> {
    fn default() -> Self {
        Self::new()
    }
}
