//! Rest core: path routing, method dispatch, request context, HTTP server.

pub mod application;
pub mod context;
pub mod http;
pub mod mux;
pub mod path;
pub mod router;

pub use application::{Application, Dispatcher, Handler, Middleware, Route};
pub use context::{BindError, RequestContext, Response};
pub use crate::http::ServerConfig;
pub use mux::{Dispatch, ServeMux};
pub use router::{Match, Param, Params, RouteId, Router, RouterError, MAX_SEGMENTS};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("route not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("length required")]
    LengthRequired,
    #[error("request entity too large: limit {limit} bytes")]
    PayloadTooLarge { limit: usize },
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("internal server error: {0}")]
    Internal(String),
    #[error("not implemented")]
    NotImplemented,
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Arbitrary HTTP status with a message, for handlers.
    #[error("{message}")]
    Status { code: u16, message: String },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid form: {0}")]
    Form(#[from] serde_urlencoded::de::Error),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Router(#[from] RouterError),
}

impl CoreError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        CoreError::Status {
            code,
            message: message.into(),
        }
    }

    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::NotFound(_) => 404,
            CoreError::MethodNotAllowed(_) => 405,
            CoreError::BadRequest(_) | CoreError::Json(_) | CoreError::Form(_) => 400,
            CoreError::Unauthorized(_) => 401,
            CoreError::Forbidden(_) => 403,
            CoreError::LengthRequired => 411,
            CoreError::PayloadTooLarge { .. } => 413,
            CoreError::UnsupportedMediaType(_) => 415,
            CoreError::Bind(BindError::BadHttpMethod(_)) => 405,
            CoreError::Bind(_) => 415,
            CoreError::Internal(_) | CoreError::Router(_) => 500,
            CoreError::NotImplemented => 501,
            CoreError::ServiceUnavailable(_) => 503,
            CoreError::Status { code, .. } => *code,
        }
    }
}
