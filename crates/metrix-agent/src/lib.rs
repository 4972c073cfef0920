//! The metrix agent: samples process and OS statistics on one interval and
//! pushes them to the server on another.
//!
//! Each report cycle goes through a [`dispatcher::Dispatcher`], which fans
//! the flattened snapshot out to `rate_limit` concurrent senders over a
//! [`transport::Transport`] (HTTP or gRPC).

pub mod agent;
pub mod config;
pub mod dispatcher;
pub mod flatten;
pub mod transport;
