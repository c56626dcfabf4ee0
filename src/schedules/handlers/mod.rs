// src/schedules/handlers/mod.rs

pub mod forms;
pub mod reconcile;
pub mod sources;

pub use reconcile::*;
pub use sources::*;
