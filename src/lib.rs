//! Risk Compass: institutional risk register backend.
//!
//! Sled-backed document storage for users, risks and quarterly submissions, DataFusion
//! analytics over an Arrow projection of the submissions, and an Axum REST API with
//! JWT bearer auth.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
// SQL aggregates (DataFusion) over the Arrow projection of submissions
pub mod query;
// REST API: Axum handlers, auth middleware, OpenAPI docs
pub mod rest;
pub mod scoring;
pub mod storage;
