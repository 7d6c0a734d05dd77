use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{Config, PlotsConfig};
use crate::data::features::FeatureLayout;
use crate::data::skeleton::SkeletonConfig;
use crate::error::TrainError;

/// Metric watched by checkpointing and early stopping.
pub const MONITOR_METRIC: &str = "validation/loss_epoch";

const VERSION_PREFIX: &str = "version_";

// ---------------------------------------------------------------------------
// Plots
// ---------------------------------------------------------------------------

/// Latent-space plot family. The experiment name picks it, and it fixes the
/// feature layout: 52 inputs without landmarks, 156 with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    NoLandmarks,
    Landmarks,
}

impl PlotKind {
    pub fn from_experiment_name(name: &str) -> Self {
        if name == "no_landmarks" {
            PlotKind::NoLandmarks
        } else {
            PlotKind::Landmarks
        }
    }

    pub fn layout(self) -> FeatureLayout {
        match self {
            PlotKind::NoLandmarks => FeatureLayout::NoLandmarks,
            PlotKind::Landmarks => FeatureLayout::Landmarks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSetup {
    pub kind: PlotKind,
    /// Plots are written under the log root.
    pub data_path: PathBuf,
    #[serde(flatten)]
    pub settings: PlotsConfig,
}

// ---------------------------------------------------------------------------
// Model and callbacks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub in_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub beta: f64,
    pub latent_dim: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EarlyStopping {
    pub monitor: String,
    pub min_delta: f64,
    pub patience: usize,
    pub mode: MonitorMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCheckpoint {
    pub dirpath: PathBuf,
    pub save_top_k: usize,
    pub monitor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Callbacks {
    /// Learning rate is logged once per epoch.
    pub lr_monitor_interval: String,
    pub checkpoint: ModelCheckpoint,
    pub early_stopping: EarlyStopping,
}

impl Callbacks {
    fn new(checkpoint_dir: PathBuf) -> Self {
        Self {
            lr_monitor_interval: "epoch".to_string(),
            checkpoint: ModelCheckpoint {
                dirpath: checkpoint_dir,
                save_top_k: 10,
                monitor: MONITOR_METRIC.to_string(),
            },
            early_stopping: EarlyStopping {
                monitor: MONITOR_METRIC.to_string(),
                min_delta: 0.0,
                patience: 10,
                mode: MonitorMode::Min,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainerSpec {
    pub auto_lr_find: bool,
    pub profiler: String,
    pub matmul_precision: String,
    pub gpus: usize,
    pub pin_memory: bool,
    /// Remaining `trainer_params`, passed through.
    pub params: BTreeMap<String, serde_yaml::Value>,
}

// ---------------------------------------------------------------------------
// TrainingPlan
// ---------------------------------------------------------------------------

/// Everything the training engine needs, resolved from the configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingPlan {
    pub log_dir: PathBuf,
    pub version: u32,
    pub plot: PlotSetup,
    pub model: ModelSpec,
    pub checkpoint_dir: PathBuf,
    /// Checkpoint to resume from.
    pub resume_from: Option<PathBuf>,
    pub callbacks: Callbacks,
    pub trainer: TrainerSpec,
    pub data_options: BTreeMap<String, serde_yaml::Value>,
}

impl TrainingPlan {
    /// Build the plan for log version `version` without touching the filesystem.
    pub fn new(cfg: &Config, skeleton: &SkeletonConfig, version: u32) -> Result<Self, TrainError> {
        let log_dir = cfg
            .tensorboard
            .logdir
            .join(format!("{VERSION_PREFIX}{version}"))
            .join(&cfg.tensorboard.name);

        let kind = PlotKind::from_experiment_name(&cfg.tensorboard.name);
        let expected = kind.layout().width(skeleton);
        if cfg.model.in_dim != expected {
            return Err(TrainError::InDimMismatch {
                in_dim: cfg.model.in_dim,
                expected,
                layout: kind.layout().name(),
            });
        }

        let (checkpoint_dir, resume_from) = if cfg.train.retrieve {
            let path = cfg
                .train
                .retrieve_path
                .clone()
                .ok_or(TrainError::MissingConfigKey("train.retrieve_path"))?;
            (path.clone(), Some(path))
        } else {
            (log_dir.join("checkpoint"), None)
        };

        let gpus = cfg.trainer_params.gpus.count();

        Ok(Self {
            plot: PlotSetup {
                kind,
                data_path: cfg.tensorboard.logdir.clone(),
                settings: cfg.plots.clone(),
            },
            model: ModelSpec {
                in_dim: cfg.model.in_dim,
                hidden_dims: cfg.model.hidden_dims.clone(),
                beta: cfg.model.beta,
                latent_dim: cfg.model.latent_dim,
            },
            callbacks: Callbacks::new(checkpoint_dir.clone()),
            checkpoint_dir,
            resume_from,
            trainer: TrainerSpec {
                auto_lr_find: true,
                profiler: "simple".to_string(),
                matmul_precision: "medium".to_string(),
                gpus,
                pin_memory: gpus != 0,
                params: cfg.trainer_params.extra.clone(),
            },
            data_options: cfg.data.options.clone(),
            log_dir,
            version,
        })
    }

    /// Build the plan for the next free log version under `tensorboard.logdir`.
    pub fn resolve(cfg: &Config, skeleton: &SkeletonConfig) -> Result<Self> {
        let version = next_version(&cfg.tensorboard.logdir)?;
        Ok(Self::new(cfg, skeleton, version)?)
    }

    pub fn layout(&self) -> FeatureLayout {
        self.plot.kind.layout()
    }
}

/// One past the highest `version_<n>` directory under `root`; 0 when none exist.
pub fn next_version(root: &Path) -> Result<u32> {
    if !root.exists() {
        return Ok(0);
    }
    let mut next = 0;
    for entry in std::fs::read_dir(root).with_context(|| format!("listing {}", root.display()))? {
        let entry = entry.with_context(|| format!("listing {}", root.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let version = name
            .to_str()
            .and_then(|n| n.strip_prefix(VERSION_PREFIX))
            .and_then(|v| v.parse::<u32>().ok());
        if let Some(v) = version {
            next = next.max(v.saturating_add(1));
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SAMPLE;

    fn config(text: &str) -> Config {
        Config::from_yaml(text).unwrap()
    }

    #[test]
    fn fresh_run_checkpoints_under_the_log_dir() {
        let plan = TrainingPlan::new(&config(SAMPLE), &SkeletonConfig::default(), 3).unwrap();

        assert_eq!(plan.log_dir, PathBuf::from("logs/version_3/landmarks"));
        assert_eq!(plan.checkpoint_dir, PathBuf::from("logs/version_3/landmarks/checkpoint"));
        assert_eq!(plan.callbacks.checkpoint.dirpath, plan.checkpoint_dir);
        assert_eq!(plan.resume_from, None);
        assert_eq!(plan.plot.kind, PlotKind::Landmarks);
        assert_eq!(plan.plot.data_path, PathBuf::from("logs"));
        assert!(plan.trainer.pin_memory);
        assert_eq!(plan.trainer.gpus, 2);
        assert_eq!(plan.callbacks.early_stopping.patience, 10);
        assert_eq!(plan.callbacks.early_stopping.mode, MonitorMode::Min);
        assert_eq!(plan.callbacks.checkpoint.save_top_k, 10);
    }

    #[test]
    fn retrieval_resumes_from_the_configured_checkpoint() {
        let text = SAMPLE.replace(
            "  retrive: false\n",
            "  retrive: true\n  retrive_path: ckpt/best.ckpt\n",
        );
        let plan = TrainingPlan::new(&config(&text), &SkeletonConfig::default(), 0).unwrap();

        assert_eq!(plan.checkpoint_dir, PathBuf::from("ckpt/best.ckpt"));
        assert_eq!(plan.resume_from, Some(PathBuf::from("ckpt/best.ckpt")));
    }

    #[test]
    fn retrieval_without_a_path_is_a_missing_key() {
        let text = SAMPLE.replace("  retrive: false\n", "  retrive: true\n");
        let err = TrainingPlan::new(&config(&text), &SkeletonConfig::default(), 0).unwrap_err();
        assert!(matches!(err, TrainError::MissingConfigKey("train.retrieve_path")));
    }

    #[test]
    fn experiment_name_selects_the_layout() {
        let text = SAMPLE
            .replace("  name: landmarks\n", "  name: no_landmarks\n")
            .replace("  in_dim: 156\n", "  in_dim: 52\n")
            .replace("  gpus: [0, 1]\n", "  gpus: []\n");
        let plan = TrainingPlan::new(&config(&text), &SkeletonConfig::default(), 0).unwrap();

        assert_eq!(plan.plot.kind, PlotKind::NoLandmarks);
        assert_eq!(plan.layout(), FeatureLayout::NoLandmarks);
        assert!(!plan.trainer.pin_memory);
    }

    #[test]
    fn in_dim_must_match_the_layout() {
        let text = SAMPLE.replace("  in_dim: 156\n", "  in_dim: 52\n");
        let err = TrainingPlan::new(&config(&text), &SkeletonConfig::default(), 0).unwrap_err();
        assert!(matches!(
            err,
            TrainError::InDimMismatch {
                in_dim: 52,
                expected: 156,
                ..
            }
        ));
    }

    #[test]
    fn next_version_skips_existing_runs() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_version(&dir.path().join("absent")).unwrap(), 0);
        assert_eq!(next_version(dir.path()).unwrap(), 0);

        std::fs::create_dir(dir.path().join("version_0")).unwrap();
        std::fs::create_dir(dir.path().join("version_4")).unwrap();
        std::fs::create_dir(dir.path().join("scratch")).unwrap();
        std::fs::write(dir.path().join("version_9"), "not a dir").unwrap();

        assert_eq!(next_version(dir.path()).unwrap(), 5);
    }

    #[test]
    fn next_version_saturates_at_the_largest_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(format!("version_{}", u32::MAX))).unwrap();

        assert_eq!(next_version(dir.path()).unwrap(), u32::MAX);
    }
}
