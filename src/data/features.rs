use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

use super::model::{Column, FrameId, JointTable};
use super::skeleton::SkeletonConfig;

// ---------------------------------------------------------------------------
// FeatureLayout – what each joint contributes to a frame vector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLayout {
    /// x, y, z, distance
    NoLandmarks,
    /// x, y, z, distance, then one distance per landmark
    Landmarks,
}

impl FeatureLayout {
    /// Columns read from each joint row, in feature order.
    pub fn columns(self, skeleton: &SkeletonConfig) -> Vec<Column> {
        let mut columns = vec![Column::X, Column::Y, Column::Z, Column::Distance];
        if self == FeatureLayout::Landmarks {
            columns.extend(skeleton.landmarks.iter().map(|l| l.column()));
        }
        columns
    }

    /// Feature vector length for one frame: 52 or 156 with the default skeleton.
    pub fn width(self, skeleton: &SkeletonConfig) -> usize {
        skeleton.joints.len() * self.columns(skeleton).len()
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureLayout::NoLandmarks => "no_landmarks",
            FeatureLayout::Landmarks => "landmarks",
        }
    }
}

impl fmt::Display for FeatureLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// FeatureMatrix – one flattened vector per frame
// ---------------------------------------------------------------------------

/// Frame-major feature matrix handed to the training engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub layout: FeatureLayout,
    pub frames: Vec<FrameId>,
    /// `<joint>_<column>` for every position of a row vector.
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Flatten each frame into a vector ordered by the joint vocabulary.
    ///
    /// Every frame must hold each vocabulary joint exactly once.
    pub fn from_table(
        table: &JointTable,
        skeleton: &SkeletonConfig,
        layout: FeatureLayout,
    ) -> Result<Self, PipelineError> {
        let columns = layout.columns(skeleton);
        let per_joint = columns.len();

        let column_names = skeleton
            .joints
            .iter()
            .flat_map(|joint| columns.iter().map(move |c| format!("{joint}_{c}")))
            .collect();

        let groups = table.group_by_frame();
        let mut frames = Vec::with_capacity(groups.len());
        let mut rows = Vec::with_capacity(groups.len());

        for (frame, observations) in groups {
            let mut seen = vec![false; skeleton.joints.len()];
            let mut values = vec![0.0; skeleton.joints.len() * per_joint];

            for obs in observations {
                let joint = skeleton
                    .joint_index(&obs.label)
                    .ok_or_else(|| PipelineError::UnknownLabel {
                        label: obs.label.clone(),
                        frame,
                    })?;
                if seen[joint] {
                    return Err(PipelineError::DuplicateLabel {
                        label: obs.label.clone(),
                        frame,
                    });
                }
                let start = joint * per_joint;
                for (offset, column) in columns.iter().enumerate() {
                    values[start + offset] = obs.value(column).ok_or_else(|| {
                        PipelineError::SchemaMismatch {
                            column: column.to_string(),
                        }
                    })?;
                }
                seen[joint] = true;
            }

            if let Some(missing) = seen.iter().position(|s| !s) {
                return Err(PipelineError::MissingGroup {
                    label: skeleton.joints[missing].clone(),
                    frame: Some(frame),
                });
            }

            frames.push(frame);
            rows.push(values);
        }

        Ok(Self {
            layout,
            frames,
            column_names,
            rows,
        })
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.column_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::JointObservation;
    use crate::data::transform::{add_landmark_location, calculate_distance};

    fn skeleton() -> SkeletonConfig {
        SkeletonConfig {
            joints: vec!["hip".into(), "nose".into()],
            expected_count: 2,
            ..SkeletonConfig::default()
        }
    }

    #[test]
    fn default_widths() {
        let skeleton = SkeletonConfig::default();
        assert_eq!(FeatureLayout::NoLandmarks.width(&skeleton), 52);
        assert_eq!(FeatureLayout::Landmarks.width(&skeleton), 156);
    }

    #[test]
    fn frames_flatten_in_vocabulary_order() {
        let table = calculate_distance(&JointTable::from_rows(vec![
            JointObservation::new(4, "nose", 3.0, 4.0, 0.0),
            JointObservation::new(4, "hip", 0.0, 0.0, 0.0),
        ]));

        let matrix = FeatureMatrix::from_table(&table, &skeleton(), FeatureLayout::NoLandmarks).unwrap();

        assert_eq!(matrix.frames, vec![4]);
        assert_eq!(matrix.width(), 8);
        assert_eq!(matrix.rows[0], vec![0.0, 0.0, 0.0, 0.0, 3.0, 4.0, 0.0, 5.0]);
        assert_eq!(matrix.column_names[4], "nose_x");
        assert_eq!(matrix.column_names[7], "nose_distance");
    }

    #[test]
    fn landmark_layout_includes_landmark_columns() {
        let skeleton = skeleton();
        let table = add_landmark_location(
            &calculate_distance(&JointTable::from_rows(vec![
                JointObservation::new(0, "hip", 0.0, 0.0, 0.0),
                JointObservation::new(0, "nose", 1.0, 0.0, 0.0),
            ])),
            &skeleton,
        );

        let matrix = FeatureMatrix::from_table(&table, &skeleton, FeatureLayout::Landmarks).unwrap();
        assert_eq!(matrix.width(), 24);
        assert_eq!(matrix.rows[0].len(), 24);
        assert_eq!(matrix.column_names[4], "hip_distance_to_coord_b1");
    }

    #[test]
    fn missing_derived_columns_are_reported() {
        let table = JointTable::from_rows(vec![
            JointObservation::new(0, "hip", 0.0, 0.0, 0.0),
            JointObservation::new(0, "nose", 1.0, 0.0, 0.0),
        ]);
        assert_eq!(
            FeatureMatrix::from_table(&table, &skeleton(), FeatureLayout::NoLandmarks),
            Err(PipelineError::SchemaMismatch {
                column: "distance".into()
            })
        );
    }

    #[test]
    fn unknown_and_missing_joints_are_reported() {
        let table = calculate_distance(&JointTable::from_rows(vec![
            JointObservation::new(0, "hip", 0.0, 0.0, 0.0),
            JointObservation::new(0, "wing", 1.0, 0.0, 0.0),
        ]));
        assert!(matches!(
            FeatureMatrix::from_table(&table, &skeleton(), FeatureLayout::NoLandmarks),
            Err(PipelineError::UnknownLabel { frame: 0, .. })
        ));

        let table = calculate_distance(&JointTable::from_rows(vec![JointObservation::new(
            9, "hip", 0.0, 0.0, 0.0,
        )]));
        assert_eq!(
            FeatureMatrix::from_table(&table, &skeleton(), FeatureLayout::NoLandmarks),
            Err(PipelineError::MissingGroup {
                label: "nose".into(),
                frame: Some(9)
            })
        );
    }
}
