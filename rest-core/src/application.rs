//! Application: registers routes, then freezes into a read-only dispatcher that
//! serves requests from any number of threads.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::http::{self, ServerConfig};
use crate::mux::{normalize_method, Dispatch, ServeMux};
use crate::{CoreError, RequestContext, Response, RouteId, RouterError};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, CoreError>> + Send>>;

/// Async route handler. Receives the request context with path parameters bound.
pub type Handler = Arc<dyn Fn(RequestContext) -> HandlerFuture + Send + Sync>;

pub type MiddlewareFuture = Pin<Box<dyn Future<Output = Option<Response>> + Send>>;

/// Async middleware: receives request context, returns Some(response) to short-circuit or None to continue.
pub type Middleware = Box<dyn Fn(&RequestContext) -> MiddlewareFuture + Send + Sync>;

/// Registered route: method and the pattern as given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub method: String,
    pub pattern: String,
}

/// Route table under construction. Call [`Application::freeze`] (or `run`) once
/// every route has its handler.
pub struct Application {
    mux: ServeMux<RouteId>,
    routes: Vec<Route>,
    handlers: HashMap<RouteId, Handler>,
    middlewares: Vec<Middleware>,
    headers: Vec<(String, String)>,
    next_route_id: u32,
}

impl Application {
    pub fn new() -> Self {
        Self {
            mux: ServeMux::new(),
            routes: Vec::new(),
            handlers: HashMap::new(),
            middlewares: Vec::new(),
            headers: Vec::new(),
            next_route_id: 0,
        }
    }

    /// Register a route without a handler. Pair with [`Application::set_route_handler`].
    pub fn register_route_only(&mut self, method: &str, pattern: &str) -> Result<RouteId, CoreError> {
        let id = RouteId(self.next_route_id);
        self.mux.handle(method, pattern, id)?;
        self.next_route_id += 1;
        let method = normalize_method(method);
        tracing::debug!(route_id = id.0, %method, pattern, "route registered");
        self.routes.push(Route {
            id,
            method,
            pattern: pattern.to_owned(),
        });
        Ok(id)
    }

    pub fn register_route(
        &mut self,
        method: &str,
        pattern: &str,
        handler: Handler,
    ) -> Result<RouteId, CoreError> {
        let id = self.register_route_only(method, pattern)?;
        self.handlers.insert(id, handler);
        Ok(id)
    }

    /// Register an async function as the handler for `method pattern`.
    pub fn route<F, Fut>(&mut self, method: &str, pattern: &str, f: F) -> Result<RouteId, CoreError>
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, CoreError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx: RequestContext| -> HandlerFuture { Box::pin(f(ctx)) });
        self.register_route(method, pattern, handler)
    }

    pub fn set_route_handler(&mut self, id: RouteId, handler: Handler) -> Result<(), CoreError> {
        if !self.routes.iter().any(|r| r.id == id) {
            return Err(CoreError::NotFound(format!("route_id {:?}", id)));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    pub fn add_middleware<F, Fut>(&mut self, mw: F) -> &mut Self
    where
        F: Fn(&RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Response>> + Send + 'static,
    {
        self.middlewares.push(Box::new(move |ctx| Box::pin(mw(ctx))));
        self
    }

    /// Header added to every response that does not already carry it.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Pattern that currently resolves to `id`. `None` once a later static
    /// registration of the same path has replaced it.
    pub fn path_of(&self, id: RouteId) -> Option<&str> {
        let route = self.routes.iter().find(|r| r.id == id)?;
        self.mux.router(&route.method)?.path_of(&id)
    }

    /// Stop accepting routes. Fails if any route is missing its handler.
    pub fn freeze(self) -> Result<Dispatcher, CoreError> {
        if let Some(route) = self.routes.iter().find(|r| !self.handlers.contains_key(&r.id)) {
            return Err(RouterError::NilHandler {
                method: route.method.clone(),
                pattern: route.pattern.clone(),
            }
            .into());
        }
        Ok(Dispatcher {
            mux: self.mux,
            routes: self.routes,
            handlers: self.handlers,
            middlewares: self.middlewares,
            headers: self.headers,
        })
    }

    /// Run HTTP server (blocks).
    pub fn run(self, config: &ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let dispatcher = Arc::new(self.freeze()?);
        http::run(dispatcher, config)
    }

    /// Run with host/port from HOST/PORT, falling back to the given defaults.
    pub fn run_from_env(
        self,
        default_host: &str,
        default_port: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.run(&ServerConfig::from_env(default_host, default_port))
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen route table with handlers. Shared read-only across connections.
pub struct Dispatcher {
    mux: ServeMux<RouteId>,
    routes: Vec<Route>,
    handlers: HashMap<RouteId, Handler>,
    middlewares: Vec<Middleware>,
    headers: Vec<(String, String)>,
}

impl Dispatcher {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Run middlewares, route the request and call its handler. Routing misses
    /// and handler errors become error responses.
    pub async fn handle(&self, ctx: RequestContext) -> Response {
        let mut response = self.respond(ctx).await;
        for (name, value) in &self.headers {
            if response.header(name).is_none() {
                response.headers.push((name.clone(), value.clone()));
            }
        }
        response
    }

    async fn respond(&self, mut ctx: RequestContext) -> Response {
        for mw in &self.middlewares {
            if let Some(resp) = mw(&ctx).await {
                return resp;
            }
        }

        let (route_id, params) = match self.mux.dispatch(&ctx.method, &ctx.path) {
            Dispatch::Found(found) => (*found.handler, found.params),
            Dispatch::MethodNotAllowed(allowed) => {
                let allow = allowed.join(", ");
                let err = CoreError::MethodNotAllowed(format!("{} {}", ctx.method, ctx.path));
                return Response::from_error(&err).with_header("Allow", &allow);
            }
            Dispatch::NotFound => {
                let err = CoreError::NotFound(format!("{} {}", ctx.method, ctx.path));
                return Response::from_error(&err);
            }
        };
        ctx.params = params;

        let Some(handler) = self.handlers.get(&route_id) else {
            let err = CoreError::NotFound(format!("route_id {:?}", route_id));
            return Response::from_error(&err);
        };
        match handler(ctx).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(route_id = route_id.0, error = %e, "handler failed");
                Response::from_error(&e)
            }
        }
    }
}

/// Handler answering every request with a 301 to `url`.
pub fn redirect(url: &str) -> Handler {
    let url = url.to_owned();
    Arc::new(move |_ctx: RequestContext| -> HandlerFuture {
        let resp = Response::empty(301).with_header("Location", &url);
        Box::pin(std::future::ready(Ok(resp)))
    })
}

/// Handler answering every request with the same body.
pub fn data(body: impl Into<Vec<u8>>, content_type: &str) -> Handler {
    let mut resp = Response::new(200, body);
    resp.content_type = Some(content_type.to_owned());
    Arc::new(move |_ctx: RequestContext| -> HandlerFuture {
        Box::pin(std::future::ready(Ok(resp.clone())))
    })
}

/// Placeholder handler that always fails with 501.
pub fn not_implemented() -> Handler {
    Arc::new(|_ctx: RequestContext| -> HandlerFuture {
        Box::pin(std::future::ready(Err(CoreError::NotImplemented)))
    })
}

/// Login and password from an `Authorization: Basic ...` header.
pub fn basic_credentials(ctx: &RequestContext) -> Option<(String, String)> {
    let (scheme, encoded) = ctx.header("Authorization")?.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (login, password) = decoded.split_once(':')?;
    Some((login.to_owned(), password.to_owned()))
}

/// HTTP Basic authentication. `auth` sees empty strings when no credentials were
/// sent. Rejected credentials get 403; missing ones get 401 with a
/// `WWW-Authenticate` challenge for `realm` ("Restricted" when empty).
pub fn basic_auth<F>(auth: F, realm: &str) -> Middleware
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    let realm = if realm.is_empty() { "Restricted" } else { realm };
    let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "\\\""));
    Box::new(move |ctx: &RequestContext| -> MiddlewareFuture {
        let credentials = basic_credentials(ctx);
        let (login, password) = credentials
            .as_ref()
            .map(|(l, p)| (l.as_str(), p.as_str()))
            .unwrap_or(("", ""));
        let response = if auth(login, password) {
            None
        } else if credentials.is_some() {
            let err = CoreError::Forbidden("invalid credentials".into());
            Some(Response::from_error(&err))
        } else {
            let err = CoreError::Unauthorized("credentials required".into());
            Some(Response::from_error(&err).with_header("WWW-Authenticate", &challenge))
        };
        Box::pin(std::future::ready(response))
    })
}
