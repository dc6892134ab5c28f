//! CLI for rest-rs: run a demo server or probe a route table offline.

use clap::{Parser, Subcommand};
use rest_rs::{application, probe, Application, CoreError, RequestContext, Response, ServerConfig};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rest")]
#[command(about = "Rest Rust CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo routes. HOST/PORT env vars apply unless overridden here.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Largest accepted request body in bytes.
        #[arg(long)]
        max_body_size: Option<usize>,
    },
    /// Resolve METHOD PATH against a route table and print the result as JSON.
    Match {
        /// Route spec, e.g. "GET /user/:id". Repeat for each route; order is registration order.
        #[arg(long = "route", short = 'r', required = true)]
        routes: Vec<String>,
        method: String,
        path: String,
    },
}

async fn index(_ctx: RequestContext) -> Result<Response, CoreError> {
    Ok(Response::text(200, "rest"))
}

async fn user(ctx: RequestContext) -> Result<Response, CoreError> {
    let id = ctx.param("id").unwrap_or_default();
    Response::json(200, &json!({ "id": id }))
}

async fn user_test(_ctx: RequestContext) -> Result<Response, CoreError> {
    Response::json(200, &json!({ "id": "test", "static": true }))
}

async fn files(ctx: RequestContext) -> Result<Response, CoreError> {
    let name = ctx.param("name").unwrap_or_default();
    Response::json(200, &json!({ "name": name }))
}

async fn echo(ctx: RequestContext) -> Result<Response, CoreError> {
    let body: Value = ctx.json()?;
    Response::json(200, &body)
}

fn demo_app() -> Result<Application, CoreError> {
    let mut app = Application::new();
    app.set_header("Server", "rest");
    app.route("GET", "/", index)?;
    app.route("GET", "/user/:id", user)?;
    app.route("GET", "/user/test", user_test)?;
    app.route("GET", "/files/*name", files)?;
    app.route("POST", "/echo", echo)?;
    app.register_route("GET", "/home", application::redirect("/"))?;
    app.register_route("DELETE", "/user/:id", application::not_implemented())?;
    Ok(app)
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rest=info,rest_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            host,
            port,
            max_body_size,
        } => {
            let env = ServerConfig::from_env("127.0.0.1", 8000);
            let config = ServerConfig {
                host: host.unwrap_or(env.host),
                port: port.unwrap_or(env.port),
                max_body_size: max_body_size.unwrap_or(env.max_body_size),
            };
            let app = demo_app()?;
            for route in app.routes() {
                tracing::info!(method = %route.method, pattern = %route.pattern, "route");
            }
            app.run(&config)
        }
        Commands::Match {
            routes,
            method,
            path,
        } => {
            let outcome = probe(&routes, &method, &path)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}
