//! Async HTTP server: tokio + hyper, serving a frozen [`Dispatcher`].
//! Host/port come from [`ServerConfig`] (HOST/PORT env with defaults). Request
//! bodies larger than `max_body_size` are refused with 413.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response as HyperResponse, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::application::Dispatcher;
use crate::{CoreError, Params, RequestContext, Response};

/// Default request body ceiling: 32 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 32 << 20;

/// Listen address and request limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// HOST and PORT from the environment; unset or unparsable values fall back to the defaults.
    pub fn from_env(default_host: &str, default_port: u16) -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| default_host.to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default_port);
        Self {
            host,
            port,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 8000)
    }
}

/// Start a multi-thread runtime and serve until ctrl-c.
pub fn run(
    dispatcher: Arc<Dispatcher>,
    config: &ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = config.addr();
    let max_body_size = config.max_body_size;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(async move {
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, routes = dispatcher.routes().len(), "listening");
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        serve_with_shutdown(dispatcher, listener, max_body_size, shutdown).await;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    })
}

/// Accept connections on `listener` until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
    max_body_size: usize,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
            accept_result = listener.accept() => {
                let (stream, peer) = match accept_result {
                    Ok(x) => x,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept error");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let dispatcher = Arc::clone(&dispatcher);
                tokio::task::spawn(async move {
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let dispatcher = Arc::clone(&dispatcher);
                        async move { serve_request(dispatcher, req, max_body_size).await }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!(%peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }
}

async fn serve_request(
    dispatcher: Arc<Dispatcher>,
    req: Request<hyper::body::Incoming>,
    max_body_size: usize,
) -> Result<HyperResponse<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let method = req.method().to_string();
    let uri = req.uri().to_string();
    let response = match hyper_request_to_context(req, max_body_size).await {
        Ok(ctx) => dispatcher.handle(ctx).await,
        Err(e) => Response::from_error(&e),
    };
    let status = response.status_code;
    let elapsed = started.elapsed();
    if status < 400 {
        tracing::info!(%method, %uri, status, ?elapsed, "request");
    } else if status < 500 {
        tracing::warn!(%method, %uri, status, ?elapsed, "request");
    } else {
        tracing::error!(%method, %uri, status, ?elapsed, "request");
    }
    Ok(into_hyper_response(response))
}

async fn hyper_request_to_context(
    req: Request<hyper::body::Incoming>,
    max_body_size: usize,
) -> Result<RequestContext, CoreError> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query_string = req.uri().query().unwrap_or("").to_string();
    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or("").to_string(),
            )
        })
        .collect();
    let body = read_body(req.into_body(), max_body_size).await?;
    Ok(RequestContext {
        method,
        path,
        query_string,
        headers,
        body,
        params: Params::new(),
    })
}

/// Collect a request body of at most `limit` bytes. Larger bodies fail with
/// [`CoreError::PayloadTooLarge`]; transport errors become `BadRequest`.
pub async fn read_body<B>(body: B, limit: usize) -> Result<Vec<u8>, CoreError>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes().to_vec()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(CoreError::PayloadTooLarge { limit })
        }
        Err(e) => Err(CoreError::BadRequest(e.to_string())),
    }
}

/// Invalid status codes become 500; headers that are not valid HTTP are dropped.
fn into_hyper_response(response: Response) -> HyperResponse<Full<Bytes>> {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = HyperResponse::new(Full::new(Bytes::from(response.body)));
    *out.status_mut() = status;
    let headers = out.headers_mut();
    if let Some(ct) = response.content_type.as_deref() {
        if let Ok(value) = HeaderValue::from_str(ct) {
            headers.insert(CONTENT_TYPE, value);
        }
    }
    for (k, v) in &response.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(v)) {
            headers.append(name, value);
        }
    }
    out
}
