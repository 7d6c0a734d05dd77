use crate::error::PipelineError;

use super::filter::{ComparisonMode, check_index_row_count, remove_rows};
use super::model::{Column, JointTable};
use super::skeleton::SkeletonConfig;
use super::transform::{add_landmark_location, calculate_distance, center_hip, check_hip_centered};

/// Frame-level outlier filter applied after the distance columns exist.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierFilter {
    pub threshold: f64,
    pub columns: Vec<Column>,
    pub mode: ComparisonMode,
}

/// Which optional stages run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessOptions {
    pub landmarks: bool,
    pub outliers: Option<OutlierFilter>,
}

/// The preprocessing stages in their fixed order:
///
/// ```text
///  center_hip ─► check_hip_centered ─► calculate_distance
///       ─► [add_landmark_location] ─► [remove_rows] ─► check_index_row_count
/// ```
pub struct Pipeline<'a> {
    skeleton: &'a SkeletonConfig,
    options: PreprocessOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(skeleton: &'a SkeletonConfig, options: PreprocessOptions) -> Self {
        Self { skeleton, options }
    }

    pub fn run(&self, table: &JointTable) -> Result<JointTable, PipelineError> {
        let skeleton = self.skeleton;
        log::info!(
            "preprocessing {} rows over {} frames",
            table.len(),
            table.frames().len()
        );

        let centered = center_hip(table, skeleton)?;
        if !check_hip_centered(&centered, skeleton)? {
            return Err(PipelineError::NotCentered {
                label: skeleton.reference_joint.clone(),
            });
        }

        let mut out = calculate_distance(&centered);

        if self.options.landmarks {
            out = add_landmark_location(&out, skeleton);
            log::debug!("annotated {} landmark distances", skeleton.landmarks.len());
        }

        if let Some(filter) = &self.options.outliers {
            let before = out.frames().len();
            out = remove_rows(&out, filter.threshold, &filter.columns, filter.mode)?;
            log::info!("{} of {before} frames kept after outlier removal", out.frames().len());
        }

        check_index_row_count(&out, skeleton.expected_count)?;
        Ok(out)
    }
}
