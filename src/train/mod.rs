//! Training orchestration: configuration → plan → dataset → engine.
//!
//! The network, optimizer loop and checkpoint contents belong to the engine
//! behind [`engine::TrainingEngine`]; this module only wires it up.

pub mod dataset;
pub mod engine;
pub mod plan;
pub mod run;

pub use run::run;
