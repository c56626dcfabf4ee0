// src/schedules/mod.rs

pub mod deadlines;
pub mod extraction;
pub mod grouping;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod regions;
pub mod repository;
pub mod routes;
pub mod validators;

#[cfg(test)]
mod tests;

pub use routes::schedules_routes;
