#![forbid(unsafe_code)]

//! Library side of the vidshare backend.
//!
//! Documents live in a SQLite-backed [`store`]; every derived view (channel
//! statistics, liked videos, watch history, ...) is an aggregation
//! [`pipeline`] composed in [`queries`]. The [`api`] module exposes both over
//! HTTP so the `backend` binary only wires configuration and logging.

pub mod api;
pub mod config;
pub mod envelope;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queries;
pub mod security;
pub mod store;
