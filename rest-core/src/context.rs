//! Request context handed to handlers and the response they produce.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::router::Params;
use crate::CoreError;

/// Rejections from [`RequestContext::bind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("unsupported charset: {0}")]
    BadCharset(String),
    #[error("empty content type")]
    EmptyContentType,
    #[error("unsupported content type: {0}")]
    BadContentType(String),
    #[error("unsupported http method: {0}")]
    BadHttpMethod(String),
}

/// Media type (lower-cased) and charset parameter of a Content-Type value.
fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let media_type = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let charset = parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, v)| v.trim().trim_matches('"').to_owned());
    (media_type, charset)
}

/// Incoming request after routing: raw parts plus the path parameters bound by
/// the router.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub params: Params,
}

impl RequestContext {
    pub fn new(method: &str, path: &str) -> Self {
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p, q),
            None => (path, ""),
        };
        Self {
            method: method.to_owned(),
            path: path.to_owned(),
            query_string: query_string.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// First path parameter named `name`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Request header, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query string pairs in order.
    pub fn query(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query_string.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }

    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the request into `T`. GET and HEAD read the query string; POST, PUT
    /// and PATCH decode the body as JSON or a urlencoded form, chosen by
    /// Content-Type. Only UTF-8 bodies are accepted.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        match self.method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" => Ok(serde_urlencoded::from_str(&self.query_string)?),
            "POST" | "PUT" | "PATCH" => {
                let (media_type, charset) =
                    parse_content_type(self.header("Content-Type").unwrap_or(""));
                if let Some(charset) = charset {
                    if !charset.eq_ignore_ascii_case("utf-8") {
                        return Err(BindError::BadCharset(charset).into());
                    }
                }
                match media_type.as_str() {
                    "application/json" => self.json(),
                    "application/x-www-form-urlencoded" => {
                        Ok(serde_urlencoded::from_bytes(&self.body)?)
                    }
                    "" => Err(BindError::EmptyContentType.into()),
                    other => Err(BindError::BadContentType(other.to_owned()).into()),
                }
            }
            other => Err(BindError::BadHttpMethod(other.to_owned()).into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl Response {
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: body.into(),
            content_type: None,
        }
    }

    pub fn empty(status_code: u16) -> Self {
        Self::new(status_code, Vec::new())
    }

    pub fn text(status_code: u16, text: impl Into<String>) -> Self {
        let mut r = Self::new(status_code, text.into().into_bytes());
        r.content_type = Some("text/plain; charset=utf-8".into());
        r
    }

    pub fn json<T: Serialize + ?Sized>(status_code: u16, value: &T) -> Result<Self, CoreError> {
        let mut r = Self::new(status_code, serde_json::to_vec(value)?);
        r.content_type = Some("application/json; charset=utf-8".into());
        Ok(r)
    }

    /// `{"code": status, "error": message}` body.
    pub fn error(status_code: u16, message: &str) -> Self {
        let body = serde_json::json!({ "code": status_code, "error": message });
        let mut r = Self::new(status_code, body.to_string().into_bytes());
        r.content_type = Some("application/json; charset=utf-8".into());
        r
    }

    pub fn from_error(err: &CoreError) -> Self {
        Self::error(err.status_code(), &err.to_string())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
