//! Light state restoration engine
//!
//! Restores saved light states when occupancy resumes inside a configured
//! time window and darkness condition, and turns the lights off again once
//! every motion sensor has been quiet for the configured delay.

pub mod admin;
pub mod controller;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod host;
pub mod model;
pub mod occupancy;
pub mod persistence;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use controller::RestorationController;
pub use engine::{RestorationEngine, RestorationEvent};
pub use error::RestorationError;
pub use host::LightHost;
pub use model::*;
