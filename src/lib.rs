//! Mock backend for the club mini-app: a JSON document store, an in-process
//! service over it, and a request-routing shim that answers the mini-app's
//! REST calls without a real server.

pub mod config;
pub mod error;
pub mod http_client;
pub mod logging;
pub mod server;
pub mod service;
pub mod shim;
pub mod store;
