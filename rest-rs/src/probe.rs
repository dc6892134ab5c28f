//! Offline route resolution: build a mux from "METHOD /pattern" specs and report
//! what a request would hit.

use rest_core::{Dispatch, RouterError, ServeMux};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouteSpecError {
    #[error("invalid route spec {0:?}: expected \"METHOD /pattern\"")]
    Malformed(String),
    #[error("route {spec:?}: {source}")]
    Router {
        spec: String,
        #[source]
        source: RouterError,
    },
}

/// Parse `"GET /user/:id"`. A spec without a method ("/user/:id") means GET.
pub fn parse_route_spec(spec: &str) -> Result<(String, String), RouteSpecError> {
    let spec = spec.trim();
    let mut it = spec.split_whitespace();
    match (it.next(), it.next(), it.next()) {
        (Some(pattern), None, None) if pattern.starts_with('/') => {
            Ok(("GET".to_owned(), pattern.to_owned()))
        }
        (Some(method), Some(pattern), None) => Ok((method.to_uppercase(), pattern.to_owned())),
        _ => Err(RouteSpecError::Malformed(spec.to_owned())),
    }
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Found {
        route: String,
        pattern: String,
        params: Vec<(String, String)>,
    },
    MethodNotAllowed {
        allowed: Vec<String>,
    },
    NotFound,
}

/// Register every spec, in order, then dispatch `method path`.
pub fn probe<S: AsRef<str>>(specs: &[S], method: &str, path: &str) -> Result<ProbeOutcome, RouteSpecError> {
    let mut mux: ServeMux<usize> = ServeMux::new();
    for (i, spec) in specs.iter().enumerate() {
        let spec = spec.as_ref();
        let (m, pattern) = parse_route_spec(spec)?;
        mux.handle(&m, &pattern, i).map_err(|source| RouteSpecError::Router {
            spec: spec.to_owned(),
            source,
        })?;
    }
    Ok(match mux.dispatch(method, path) {
        Dispatch::Found(found) => ProbeOutcome::Found {
            route: specs[*found.handler].as_ref().trim().to_owned(),
            pattern: found.pattern.to_owned(),
            params: found
                .params
                .into_iter()
                .map(|p| (p.key, p.value))
                .collect(),
        },
        Dispatch::MethodNotAllowed(allowed) => ProbeOutcome::MethodNotAllowed { allowed },
        Dispatch::NotFound => ProbeOutcome::NotFound,
    })
}
