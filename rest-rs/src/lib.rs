//! Rest for Rust: re-exports rest-core plus route-table probing used by the `rest` CLI.

pub mod probe;

pub use probe::{parse_route_spec, probe, ProbeOutcome, RouteSpecError};
pub use rest_core::application;
pub use rest_core::{
    Application, CoreError, Dispatcher, Handler, Match, Param, Params, RequestContext, Response,
    RouteId, Router, RouterError, ServeMux, ServerConfig,
};
