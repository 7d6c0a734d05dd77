use std::path::Path;

use anyhow::{Context, Result};

use crate::config::DataConfig;
use crate::data::features::{FeatureLayout, FeatureMatrix};
use crate::data::loader::load_dir;
use crate::data::model::JointTable;
use crate::data::pipeline::{Pipeline, PreprocessOptions};
use crate::data::skeleton::SkeletonConfig;
use crate::error::TrainError;

/// Preprocessed training data: the cleaned joint table and its frame vectors.
#[derive(Debug, Clone)]
pub struct VaeDataset {
    pub table: JointTable,
    pub features: FeatureMatrix,
}

impl VaeDataset {
    /// Load every table under `data.dir`, run the pipeline, and flatten frames.
    pub fn setup(
        data: &DataConfig,
        skeleton: &SkeletonConfig,
        options: PreprocessOptions,
        layout: FeatureLayout,
    ) -> Result<Self> {
        let raw = load_dir(&data.dir)?;
        Self::from_table(&raw, &data.dir, skeleton, options, layout)
    }

    pub fn from_table(
        raw: &JointTable,
        source: &Path,
        skeleton: &SkeletonConfig,
        options: PreprocessOptions,
        layout: FeatureLayout,
    ) -> Result<Self> {
        if raw.is_empty() {
            return Err(TrainError::EmptyDataset(source.to_path_buf()).into());
        }

        let table = Pipeline::new(skeleton, options)
            .run(raw)
            .with_context(|| format!("preprocessing {}", source.display()))?;
        let features = FeatureMatrix::from_table(&table, skeleton, layout)
            .context("extracting frame features")?;
        if features.is_empty() {
            return Err(TrainError::NoFramesLeft(source.to_path_buf()).into());
        }

        log::info!(
            "dataset ready: {} frames × {} features ({layout})",
            features.len(),
            features.width()
        );
        Ok(Self { table, features })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::ComparisonMode;
    use crate::data::model::{Column, JointObservation};
    use crate::data::pipeline::OutlierFilter;

    fn one_frame(skeleton: &SkeletonConfig) -> JointTable {
        JointTable::from_rows(
            skeleton
                .joints
                .iter()
                .enumerate()
                .map(|(i, j)| JointObservation::new(0, j.as_str(), i as f64, 1.0, -1.0))
                .collect(),
        )
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataConfig {
            dir: dir.path().to_path_buf(),
            outlier_threshold: None,
            outlier_columns: vec![],
            outlier_mode: Default::default(),
            expected_count: None,
            options: Default::default(),
        };

        let err = VaeDataset::setup(
            &data,
            &SkeletonConfig::default(),
            PreprocessOptions::default(),
            FeatureLayout::NoLandmarks,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::EmptyDataset(_))
        ));
    }

    #[test]
    fn features_follow_the_layout() {
        let skeleton = SkeletonConfig::default();

        let dataset = VaeDataset::from_table(
            &one_frame(&skeleton),
            Path::new("memory"),
            &skeleton,
            PreprocessOptions {
                landmarks: true,
                outliers: None,
            },
            FeatureLayout::Landmarks,
        )
        .unwrap();

        assert_eq!(dataset.features.len(), 1);
        assert_eq!(dataset.features.width(), 156);
        assert_eq!(dataset.table.len(), 13);
    }

    #[test]
    fn filtering_out_every_frame_is_an_error() {
        let skeleton = SkeletonConfig::default();
        let options = PreprocessOptions {
            landmarks: false,
            outliers: Some(OutlierFilter {
                threshold: 0.5,
                columns: Column::coordinates(),
                mode: ComparisonMode::Greater,
            }),
        };

        let err = VaeDataset::from_table(
            &one_frame(&skeleton),
            Path::new("memory"),
            &skeleton,
            options,
            FeatureLayout::NoLandmarks,
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::NoFramesLeft(_))
        ));
    }
}
