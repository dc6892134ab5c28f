//! Application: registration, freeze, dispatch to handlers.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::Full;
use rest_core::application::{self, HandlerFuture};
use rest_core::http::read_body;
use rest_core::{
    Application, BindError, CoreError, Handler, RequestContext, Response, RouterError,
};
use serde::Deserialize;
use serde_json::{json, Value};

fn body_json(resp: &Response) -> Value {
    serde_json::from_slice(&resp.body).unwrap()
}

async fn show_user(ctx: RequestContext) -> Result<Response, CoreError> {
    let id = ctx.param("id").unwrap_or_default().to_owned();
    Response::json(200, &json!({ "id": id }))
}

#[tokio::test]
async fn routes_to_handler_with_params() {
    let mut app = Application::new();
    app.route("GET", "/user/:id", show_user).unwrap();
    app.route("GET", "/user/test", |_ctx| async {
        Response::json(200, &json!({ "static": true }))
    })
    .unwrap();
    let d = app.freeze().unwrap();

    let resp = d.handle(RequestContext::new("GET", "/user/42")).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body_json(&resp), json!({ "id": "42" }));

    let resp = d.handle(RequestContext::new("GET", "/user/test")).await;
    assert_eq!(body_json(&resp), json!({ "static": true }));
}

#[tokio::test]
async fn misses_become_error_responses() {
    let mut app = Application::new();
    app.route("GET", "/items/:id", show_user).unwrap();
    app.route("DELETE", "/items/:id", show_user).unwrap();
    let d = app.freeze().unwrap();

    let resp = d.handle(RequestContext::new("POST", "/items/1")).await;
    assert_eq!(resp.status_code, 405);
    assert_eq!(resp.header("allow"), Some("DELETE, GET"));
    assert_eq!(body_json(&resp)["code"], json!(405));

    let resp = d.handle(RequestContext::new("GET", "/missing")).await;
    assert_eq!(resp.status_code, 404);
    assert_eq!(body_json(&resp)["code"], json!(404));
}

#[tokio::test]
async fn handler_errors_map_to_status() {
    let mut app = Application::new();
    app.route("POST", "/echo", |ctx: RequestContext| async move {
        let v: Value = ctx.json()?;
        Response::json(200, &v)
    })
    .unwrap();
    app.route("GET", "/teapot", |_ctx| async {
        Err::<Response, _>(CoreError::status(418, "short and stout"))
    })
    .unwrap();
    let d = app.freeze().unwrap();

    let resp = d
        .handle(RequestContext::new("POST", "/echo").with_body(&b"{\"a\":1}"[..]))
        .await;
    assert_eq!(body_json(&resp), json!({ "a": 1 }));

    let resp = d
        .handle(RequestContext::new("POST", "/echo").with_body(&b"not json"[..]))
        .await;
    assert_eq!(resp.status_code, 400);

    let resp = d.handle(RequestContext::new("GET", "/teapot")).await;
    assert_eq!(resp.status_code, 418);
    assert_eq!(body_json(&resp), json!({ "code": 418, "error": "short and stout" }));
}

#[test]
fn route_without_handler_fails_freeze() {
    let mut app = Application::new();
    app.register_route_only("GET", "/orders/:id").unwrap();
    match app.freeze() {
        Err(CoreError::Router(RouterError::NilHandler { method, pattern })) => {
            assert_eq!(method, "GET");
            assert_eq!(pattern, "/orders/:id");
        }
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("expected NilHandler"),
    }
}

#[tokio::test]
async fn late_handler_completes_route() {
    let mut app = Application::new();
    let id = app.register_route_only("get", "/orders/:id").unwrap();
    let handler: Handler = Arc::new(|ctx: RequestContext| -> HandlerFuture {
        Box::pin(async move {
            let id = ctx.param("id").unwrap_or_default().to_owned();
            Ok(Response::text(200, id))
        })
    });
    app.set_route_handler(id, handler).unwrap();
    assert_eq!(app.path_of(id), Some("/orders/:id"));
    assert_eq!(app.routes()[0].method, "GET");

    let d = app.freeze().unwrap();
    let resp = d.handle(RequestContext::new("GET", "/orders/o1")).await;
    assert_eq!(resp.body, b"o1");
}

#[test]
fn bad_pattern_is_rejected_and_isolated() {
    let mut app = Application::new();
    app.route("GET", "/ok/:id", show_user).unwrap();
    let err = app.route("GET", "/bad/*rest/x", show_user).unwrap_err();
    assert!(matches!(err, CoreError::Router(RouterError::CatchAllNotLast(_))));
    assert_eq!(app.routes().len(), 1);
    assert!(app.freeze().is_ok());
}

#[test]
fn overridden_static_route_has_no_path() {
    let mut app = Application::new();
    let first = app.route("GET", "/a", show_user).unwrap();
    let second = app.route("GET", "/a/", show_user).unwrap();
    assert_eq!(app.path_of(first), None);
    assert_eq!(app.path_of(second), Some("/a/"));
}

#[tokio::test]
async fn middleware_short_circuits_and_headers_apply() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&seen);

    let mut app = Application::new();
    app.set_header("Server", "rest");
    app.add_middleware(move |ctx: &RequestContext| {
        log.lock().unwrap().push(ctx.path.clone());
        let denied = ctx.header("Authorization").is_none();
        async move {
            if denied {
                Some(Response::error(401, "unauthorized"))
            } else {
                None
            }
        }
    });
    app.route("GET", "/user/:id", show_user).unwrap();
    let d = app.freeze().unwrap();

    let resp = d.handle(RequestContext::new("GET", "/user/1")).await;
    assert_eq!(resp.status_code, 401);
    assert_eq!(resp.header("server"), Some("rest"));

    let resp = d
        .handle(RequestContext::new("GET", "/user/1").with_header("authorization", "token"))
        .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.header("Server"), Some("rest"));
    assert_eq!(*seen.lock().unwrap(), vec!["/user/1", "/user/1"]);
}

#[test]
fn request_context_helpers() {
    let ctx = RequestContext::new("GET", "/search?q=rust+router&tag=a%2Fb&&tag=c")
        .with_header("Content-Type", "application/json");
    assert_eq!(ctx.path, "/search");
    assert_eq!(ctx.query_value("q").as_deref(), Some("rust router"));
    assert_eq!(ctx.query_value("tag").as_deref(), Some("a/b"));
    assert_eq!(ctx.query().len(), 3);
    assert_eq!(ctx.header("content-type"), Some("application/json"));
    assert_eq!(ctx.param("missing"), None);
}

#[derive(Debug, Deserialize, PartialEq)]
struct Login {
    name: String,
    age: u32,
}

#[test]
fn bind_get_reads_query_string() {
    let ctx = RequestContext::new("GET", "/login?name=ann+lee&age=31");
    let login: Login = ctx.bind().unwrap();
    assert_eq!(login, Login { name: "ann lee".into(), age: 31 });

    let ctx = RequestContext::new("HEAD", "/login?name=bo&age=2");
    assert_eq!(ctx.bind::<Login>().unwrap().name, "bo");
}

#[test]
fn bind_form_post() {
    let ctx = RequestContext::new("POST", "/login")
        .with_header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
        .with_body("name=ann%20lee&age=31");
    let login: Login = ctx.bind().unwrap();
    assert_eq!(login, Login { name: "ann lee".into(), age: 31 });
}

#[test]
fn bind_json_post() {
    let ctx = RequestContext::new("PUT", "/login")
        .with_header("content-type", "Application/JSON")
        .with_body(r#"{"name":"ann","age":31}"#);
    let login: Login = ctx.bind().unwrap();
    assert_eq!(login, Login { name: "ann".into(), age: 31 });

    let ctx = RequestContext::new("PATCH", "/login")
        .with_header("Content-Type", "application/json")
        .with_body("{");
    let err = ctx.bind::<Login>().unwrap_err();
    assert!(matches!(err, CoreError::Json(_)));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn bind_rejects_empty_content_type() {
    let ctx = RequestContext::new("POST", "/login").with_body("name=ann&age=1");
    let err = ctx.bind::<Login>().unwrap_err();
    assert!(matches!(err, CoreError::Bind(BindError::EmptyContentType)));
    assert_eq!(err.status_code(), 415);
}

#[test]
fn bind_rejects_unsupported_content_type() {
    let ctx = RequestContext::new("POST", "/login")
        .with_header("Content-Type", "text/plain")
        .with_body("ann");
    let err = ctx.bind::<Login>().unwrap_err();
    assert!(matches!(err, CoreError::Bind(BindError::BadContentType(ref t)) if t == "text/plain"));
    assert_eq!(err.status_code(), 415);
}

#[test]
fn bind_rejects_other_charsets_and_methods() {
    let ctx = RequestContext::new("POST", "/login")
        .with_header("Content-Type", "application/json; charset=latin1")
        .with_body(r#"{"name":"ann","age":31}"#);
    let err = ctx.bind::<Login>().unwrap_err();
    assert!(matches!(err, CoreError::Bind(BindError::BadCharset(ref c)) if c == "latin1"));

    let err = RequestContext::new("DELETE", "/login?name=a&age=1")
        .bind::<Login>()
        .unwrap_err();
    assert!(matches!(err, CoreError::Bind(BindError::BadHttpMethod(_))));
    assert_eq!(err.status_code(), 405);
}

#[test]
fn error_status_table() {
    let cases = [
        (CoreError::Unauthorized("x".into()), 401),
        (CoreError::Forbidden("x".into()), 403),
        (CoreError::LengthRequired, 411),
        (CoreError::PayloadTooLarge { limit: 1 }, 413),
        (CoreError::UnsupportedMediaType("x".into()), 415),
        (CoreError::Internal("x".into()), 500),
        (CoreError::NotImplemented, 501),
        (CoreError::ServiceUnavailable("x".into()), 503),
        (CoreError::status(418, "teapot"), 418),
    ];
    for (err, code) in cases {
        assert_eq!(err.status_code(), code, "{err}");
        let resp = Response::from_error(&err);
        assert_eq!(resp.status_code, code);
        assert_eq!(body_json(&resp)["code"], json!(code));
    }
}

#[tokio::test]
async fn canned_handlers() {
    let mut app = Application::new();
    app.register_route("GET", "/old", application::redirect("/new")).unwrap();
    app.register_route("GET", "/logo", application::data(vec![0x89, b'P'], "image/png"))
        .unwrap();
    app.register_route("DELETE", "/old", application::not_implemented())
        .unwrap();
    let d = app.freeze().unwrap();

    let resp = d.handle(RequestContext::new("GET", "/old")).await;
    assert_eq!(resp.status_code, 301);
    assert_eq!(resp.header("location"), Some("/new"));

    let resp = d.handle(RequestContext::new("GET", "/logo")).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, vec![0x89, b'P']);
    assert_eq!(resp.content_type.as_deref(), Some("image/png"));

    let resp = d.handle(RequestContext::new("DELETE", "/old")).await;
    assert_eq!(resp.status_code, 501);
}

#[tokio::test]
async fn basic_auth_challenges_and_rejects() {
    let mut app = Application::new();
    app.add_middleware(application::basic_auth(
        |login, password| login == "admin" && password == "secret",
        "",
    ));
    app.route("GET", "/user/:id", show_user).unwrap();
    let d = app.freeze().unwrap();

    let resp = d.handle(RequestContext::new("GET", "/user/1")).await;
    assert_eq!(resp.status_code, 401);
    assert_eq!(resp.header("WWW-Authenticate"), Some("Basic realm=\"Restricted\""));

    let resp = d
        .handle(
            RequestContext::new("GET", "/user/1")
                .with_header("Authorization", "Basic YWRtaW46d3Jvbmc="),
        )
        .await;
    assert_eq!(resp.status_code, 403);
    assert_eq!(resp.header("WWW-Authenticate"), None);

    let resp = d
        .handle(
            RequestContext::new("GET", "/user/1")
                .with_header("Authorization", "Basic YWRtaW46c2VjcmV0"),
        )
        .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body_json(&resp), json!({ "id": "1" }));
}

#[tokio::test]
async fn basic_auth_uses_given_realm() {
    let mut app = Application::new();
    app.add_middleware(application::basic_auth(|_, _| false, "admin area"));
    app.route("GET", "/", show_user).unwrap();
    let d = app.freeze().unwrap();

    let resp = d
        .handle(RequestContext::new("GET", "/").with_header("Authorization", "Bearer abc"))
        .await;
    assert_eq!(resp.status_code, 401);
    assert_eq!(resp.header("www-authenticate"), Some("Basic realm=\"admin area\""));
}

#[test]
fn empty_method_registers_as_get() {
    let mut app = Application::new();
    app.route("", "/a", show_user).unwrap();
    app.route("post", "/a", show_user).unwrap();
    let methods: Vec<&str> = app.routes().iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods, vec!["GET", "POST"]);
}

#[tokio::test]
async fn body_over_limit_is_rejected() {
    let body = Full::new(Bytes::from(vec![b'x'; 64]));
    let err = read_body(body, 16).await.unwrap_err();
    assert!(matches!(err, CoreError::PayloadTooLarge { limit: 16 }));
    assert_eq!(err.status_code(), 413);

    let body = Full::new(Bytes::from_static(b"small"));
    assert_eq!(read_body(body, 16).await.unwrap(), b"small".to_vec());
}
