// src/admin/mod.rs
//
// Runtime settings management for the extraction and crawl services

pub mod handlers;
pub mod routes;

pub use routes::admin_routes;
