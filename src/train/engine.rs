use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::data::writer::write_features;

use super::dataset::VaeDataset;
use super::plan::TrainingPlan;

pub const FEATURES_FILE: &str = "features.parquet";
pub const MANIFEST_FILE: &str = "run.json";

/// The deep-learning engine that owns the optimizer loop, checkpoints and
/// learning-rate search.
pub trait TrainingEngine {
    /// Prepare hyper-parameters (learning-rate search) before fitting.
    fn tune(&mut self, plan: &TrainingPlan, data: &VaeDataset) -> Result<()>;

    /// Fit the model described by `plan` on `data`.
    fn fit(&mut self, plan: &TrainingPlan, data: &VaeDataset) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Hand-off engine
// ---------------------------------------------------------------------------

/// What an external trainer reads from the log directory.
#[derive(Debug, Serialize)]
pub struct RunManifest<'a> {
    pub plan: &'a TrainingPlan,
    pub features: PathBuf,
    pub frames: usize,
    pub feature_width: usize,
}

/// Materializes the run for an external trainer: the feature matrix on `tune`,
/// the manifest on `fit`.
#[derive(Debug, Default)]
pub struct HandoffEngine {
    features: Option<PathBuf>,
}

impl TrainingEngine for HandoffEngine {
    fn tune(&mut self, plan: &TrainingPlan, data: &VaeDataset) -> Result<()> {
        let path = plan.log_dir.join(FEATURES_FILE);
        write_features(&data.features, &path)?;
        log::info!(
            "wrote {} frames to {}; learning-rate search runs in the trainer",
            data.features.len(),
            path.display()
        );
        self.features = Some(path);
        Ok(())
    }

    fn fit(&mut self, plan: &TrainingPlan, data: &VaeDataset) -> Result<()> {
        let features = match &self.features {
            Some(path) => path.clone(),
            None => {
                self.tune(plan, data)?;
                plan.log_dir.join(FEATURES_FILE)
            }
        };

        let manifest = RunManifest {
            plan,
            features,
            frames: data.features.len(),
            feature_width: data.features.width(),
        };
        let path = plan.log_dir.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(&manifest).context("serializing run manifest")?;
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        log::info!("run manifest written to {}", path.display());
        Ok(())
    }
}
