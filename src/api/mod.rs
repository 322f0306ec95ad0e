//! HTTP API for the workout importer
//!
//! Exposes the pipeline to app clients: process a shared link, search the
//! exercise catalog, and apply manual match corrections.

pub mod models;
pub mod server;

pub use server::{start_http_server, AppState};
