//! YAML run configuration.
//!
//! Every section is required and a missing key fails the load with the key's
//! name. Keys the orchestrator does not interpret (`data` options,
//! `trainer_params`) are kept and handed to the training engine unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::filter::ComparisonMode;
use crate::data::model::Column;
use crate::data::pipeline::{OutlierFilter, PreprocessOptions};
use crate::data::skeleton::SkeletonConfig;
use crate::error::TrainError;

/// Used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub tensorboard: TensorboardConfig,
    pub plots: PlotsConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
    pub train: TrainConfig,
    pub trainer_params: TrainerParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorboardConfig {
    pub logdir: PathBuf,
    /// Experiment name; `no_landmarks` selects the landmark-free layout.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotsConfig {
    pub label_path: PathBuf,
    pub min_cluster_size: usize,
    pub umap_interval: usize,
    pub umap_input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub in_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub beta: f64,
    pub latent_dim: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory of joint tables.
    pub dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier_threshold: Option<f64>,
    #[serde(default = "default_outlier_columns")]
    pub outlier_columns: Vec<String>,
    #[serde(default)]
    pub outlier_mode: ComparisonMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<usize>,
    /// Dataset options for the engine (batch sizes, splits, workers...).
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

fn default_outlier_columns() -> Vec<String> {
    Column::coordinates().iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Resume from `retrieve_path` instead of starting fresh.
    #[serde(alias = "retrive")]
    pub retrieve: bool,
    #[serde(default, alias = "retrive_path", skip_serializing_if = "Option::is_none")]
    pub retrieve_path: Option<PathBuf>,
}

/// Either a device count or an explicit list of device ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Gpus {
    Count(usize),
    Devices(Vec<usize>),
}

impl Gpus {
    pub fn count(&self) -> usize {
        match self {
            Gpus::Count(n) => *n,
            Gpus::Devices(ids) => ids.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerParams {
    pub gpus: Gpus,
    /// Engine options passed through verbatim (`max_epochs`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Config {
    /// Read and parse a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Cross-field checks serde cannot express.
    ///
    /// Every frame must carry each joint exactly once, so the row count per
    /// frame can only equal the size of the joint vocabulary.
    pub fn validate(&self) -> Result<(), TrainError> {
        let joints = SkeletonConfig::default().joints.len();
        match self.data.expected_count {
            Some(expected_count) if expected_count != joints => {
                Err(TrainError::ExpectedCountMismatch {
                    expected_count,
                    joints,
                })
            }
            _ => Ok(()),
        }
    }

    /// Write the configuration as YAML, e.g. next to the training logs.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self).context("serializing config")?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// Dataset constants, with the per-frame row count overridden when configured.
    pub fn skeleton(&self) -> SkeletonConfig {
        let skeleton = SkeletonConfig::default();
        match self.data.expected_count {
            Some(n) => skeleton.with_expected_count(n),
            None => skeleton,
        }
    }

    /// Pipeline options from the `data` section.
    pub fn preprocess_options(&self, landmarks: bool) -> Result<PreprocessOptions> {
        let outliers = match self.data.outlier_threshold {
            Some(threshold) => Some(OutlierFilter {
                threshold,
                columns: self
                    .data
                    .outlier_columns
                    .iter()
                    .map(|c| c.parse::<Column>())
                    .collect::<Result<_, _>>()
                    .context("data.outlier_columns")?,
                mode: self.data.outlier_mode,
            }),
            None => None,
        };
        Ok(PreprocessOptions {
            landmarks,
            outliers,
        })
    }
}
