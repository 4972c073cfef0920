//! metrix collector: merges pushed counters and gauges into storage and
//! serves them over HTTP and gRPC.

pub mod api;
pub mod app;
pub mod backend;
pub mod config;
pub mod grpc;
pub mod logging;
pub mod metric_service;
pub mod middleware;
pub mod server;
pub mod state;
