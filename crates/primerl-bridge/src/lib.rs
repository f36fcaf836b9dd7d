//! PrimeRL inference-serving control bridge library.
//!
//! Exposes the modules needed for the `primerl-bridged` binary, for OpenAPI
//! generation, and for integration tests.

pub mod api;
pub mod batcher;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod kv;
pub mod observability;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod speculator;
