//! vetrina: a cached explore/list API over a document store.
//!
//! The crate is organized in four layers:
//!
//! - [`domain`] — wire/request types (explore specification, filter
//!   tree, identifier tokens);
//! - [`query`] — the filter compilers, pipeline builder, and the
//!   deadline-bounded executor;
//! - [`cache`] — cache policy, key derivation, freshness headers, the
//!   store interface, and the conditional caching gate;
//! - [`infra`] — collaborator interfaces and reference implementations,
//!   telemetry, and the HTTP surface.

pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod query;
