//! Motion-capture preprocessing and VAE training orchestration.
//!
//! [`data`] turns per-frame joint tables into hip-centered, distance-annotated
//! feature vectors; [`train`] resolves a run from the YAML [`config`] and
//! drives a [`train::engine::TrainingEngine`].

pub mod config;
pub mod data;
pub mod error;
pub mod train;
