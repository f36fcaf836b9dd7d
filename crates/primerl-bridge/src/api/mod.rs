//! HTTP/WebSocket surface adapter over the three PrimeRL RPCs.

mod handlers;
mod middleware;
mod routes;
mod ws;

pub use routes::build_router;
