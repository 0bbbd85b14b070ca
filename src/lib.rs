//! Schema Tightener
//!
//! Decides which columns can become NOT NULL, which unique indexes can be
//! enforced and which foreign keys can be created, based on profiling
//! evidence gathered from the live database. Also orders entities for safe
//! loading and caches the evidence inputs between runs.

pub mod config;
pub mod error;
pub mod models;
pub mod ordering;
pub mod pipeline;
pub mod policy;
pub mod routes;
pub mod snapshot;
pub mod state;
