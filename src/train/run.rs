use anyhow::{Context, Result};

use crate::config::Config;
use crate::data::features::FeatureLayout;

use super::dataset::VaeDataset;
use super::engine::TrainingEngine;
use super::plan::{PlotKind, TrainingPlan};

/// Name of the configuration snapshot saved into the log directory.
pub const CONFIG_SNAPSHOT: &str = "config.yml";

/// Set up plots, model, data and trainer from `cfg`, then tune and fit.
///
/// The configuration is saved next to the logs after tuning, before fitting.
pub fn run(cfg: &Config, engine: &mut dyn TrainingEngine) -> Result<TrainingPlan> {
    let skeleton = cfg.skeleton();

    match cfg.trainer_params.gpus.count() {
        0 => log::warn!("no GPUs requested; training runs on the CPU"),
        n => log::info!("{n} GPUs requested"),
    }

    log::info!("Setting up plots...");
    let plan = TrainingPlan::resolve(cfg, &skeleton)?;
    std::fs::create_dir_all(&plan.log_dir)
        .with_context(|| format!("creating {}", plan.log_dir.display()))?;
    log::info!(
        "logging to {} ({} plots)",
        plan.log_dir.display(),
        match plan.plot.kind {
            PlotKind::NoLandmarks => "no-landmark",
            PlotKind::Landmarks => "landmark",
        }
    );

    log::info!("Setting up model...");
    log::debug!("model: {:?}", plan.model);

    log::info!("Setting up data...");
    let options = cfg.preprocess_options(plan.layout() == FeatureLayout::Landmarks)?;
    let dataset = VaeDataset::setup(&cfg.data, &skeleton, options, plan.layout())?;

    if plan.resume_from.is_none() {
        std::fs::create_dir_all(&plan.checkpoint_dir)
            .with_context(|| format!("creating {}", plan.checkpoint_dir.display()))?;
    }

    log::info!("Setting up trainer...");
    if let Some(checkpoint) = &plan.resume_from {
        log::info!("Retrieving model from {}", checkpoint.display());
    }

    log::info!("Starting tuning...");
    engine.tune(&plan, &dataset).context("tuning")?;

    cfg.save(&plan.log_dir.join(CONFIG_SNAPSHOT))?;

    log::info!("Starting training...");
    engine.fit(&plan, &dataset).context("training")?;

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::config::tests::SAMPLE;
    use crate::data::model::{JointObservation, JointTable};
    use crate::data::skeleton::SkeletonConfig;
    use crate::data::writer::write_file;
    use crate::train::engine::{FEATURES_FILE, HandoffEngine, MANIFEST_FILE};

    /// Records calls and whether the config snapshot existed at each one.
    #[derive(Default)]
    struct RecordingEngine {
        calls: Vec<(&'static str, bool)>,
        frames: usize,
    }

    impl TrainingEngine for RecordingEngine {
        fn tune(&mut self, plan: &TrainingPlan, data: &VaeDataset) -> Result<()> {
            self.calls.push(("tune", plan.log_dir.join(CONFIG_SNAPSHOT).exists()));
            self.frames = data.features.len();
            Ok(())
        }

        fn fit(&mut self, plan: &TrainingPlan, _data: &VaeDataset) -> Result<()> {
            self.calls.push(("fit", plan.log_dir.join(CONFIG_SNAPSHOT).exists()));
            Ok(())
        }
    }

    fn write_frames(dir: &Path, frames: i64) {
        let skeleton = SkeletonConfig::default();
        let rows = (0..frames)
            .flat_map(|f| {
                skeleton.joints.iter().enumerate().map(move |(i, j)| {
                    JointObservation::new(f, j.as_str(), f as f64 + i as f64 * 0.1, 1.0, 0.5)
                })
            })
            .collect();
        std::fs::create_dir_all(dir).unwrap();
        write_file(&JointTable::from_rows(rows), &dir.join("session.parquet")).unwrap();
    }

    fn config_in(root: &Path) -> Config {
        let mut cfg = Config::from_yaml(SAMPLE).unwrap();
        cfg.tensorboard.logdir = root.join("logs");
        cfg.data.dir = root.join("data");
        cfg
    }

    #[test]
    fn tunes_then_saves_config_then_fits() {
        let root = tempfile::tempdir().unwrap();
        write_frames(&root.path().join("data"), 3);
        let cfg = config_in(root.path());

        let mut engine = RecordingEngine::default();
        let plan = run(&cfg, &mut engine).unwrap();

        assert_eq!(engine.calls, vec![("tune", false), ("fit", true)]);
        assert_eq!(engine.frames, 3);
        assert!(plan.checkpoint_dir.is_dir());
        assert_eq!(Config::load(&plan.log_dir.join(CONFIG_SNAPSHOT)).unwrap(), cfg);
    }

    #[test]
    fn each_run_gets_a_new_version() {
        let root = tempfile::tempdir().unwrap();
        write_frames(&root.path().join("data"), 2);
        let cfg = config_in(root.path());

        let first = run(&cfg, &mut RecordingEngine::default()).unwrap();
        let second = run(&cfg, &mut RecordingEngine::default()).unwrap();

        assert_eq!(first.version, 0);
        assert_eq!(second.version, 1);
    }

    #[test]
    fn handoff_engine_writes_features_and_manifest() {
        let root = tempfile::tempdir().unwrap();
        write_frames(&root.path().join("data"), 2);
        let cfg = config_in(root.path());

        let plan = run(&cfg, &mut HandoffEngine::default()).unwrap();

        assert!(plan.log_dir.join(FEATURES_FILE).is_file());
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(plan.log_dir.join(MANIFEST_FILE)).unwrap())
                .unwrap();
        assert_eq!(manifest["frames"], 2);
        assert_eq!(manifest["feature_width"], 156);
        assert_eq!(manifest["plan"]["model"]["latent_dim"], 8);
        assert_eq!(
            manifest["plan"]["callbacks"]["early_stopping"]["monitor"],
            "validation/loss_epoch"
        );
    }

    #[test]
    fn preprocessing_errors_stop_before_tuning() {
        let root = tempfile::tempdir().unwrap();
        let data = root.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("bad.csv"), "frame,label,x,y,z\n0,nose,1,2,3\n").unwrap();
        let cfg = config_in(root.path());

        let mut engine = RecordingEngine::default();
        let err = run(&cfg, &mut engine).unwrap_err();

        assert!(format!("{err:#}").contains("no 'hip' group"));
        assert!(engine.calls.is_empty());
    }
}
