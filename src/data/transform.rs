use std::collections::BTreeMap;

use crate::error::PipelineError;

use super::model::{FrameId, JointObservation, JointTable};
use super::skeleton::SkeletonConfig;

// ---------------------------------------------------------------------------
// Reference-joint lookup
// ---------------------------------------------------------------------------

/// Map each frame to the coordinates of its reference joint.
///
/// Fails when the table has no reference row at all, or when a frame holds
/// more than one.
fn reference_origins(
    table: &JointTable,
    skeleton: &SkeletonConfig,
) -> Result<BTreeMap<FrameId, [f64; 3]>, PipelineError> {
    let mut origins = BTreeMap::new();
    for row in table.rows.iter().filter(|r| skeleton.is_reference(&r.label)) {
        if origins.insert(row.frame, row.coords()).is_some() {
            return Err(PipelineError::DuplicateLabel {
                label: skeleton.reference_joint.clone(),
                frame: row.frame,
            });
        }
    }
    if origins.is_empty() {
        return Err(skeleton.missing_reference(None));
    }
    Ok(origins)
}

// ---------------------------------------------------------------------------
// Centering
// ---------------------------------------------------------------------------

/// Re-express every joint relative to the reference joint of its frame.
///
/// The reference row itself becomes (0, 0, 0). Row order and labels are kept.
/// A frame with joints but no reference row is an error, never skipped.
pub fn center_hip(table: &JointTable, skeleton: &SkeletonConfig) -> Result<JointTable, PipelineError> {
    let origins = reference_origins(table, skeleton)?;

    let rows = table
        .rows
        .iter()
        .map(|row| -> Result<JointObservation, PipelineError> {
            if skeleton.is_reference(&row.label) {
                return Ok(row.with_coords([0.0; 3]));
            }
            let [ox, oy, oz] = origins
                .get(&row.frame)
                .ok_or_else(|| skeleton.missing_reference(Some(row.frame)))?;
            Ok(row.with_coords([row.x - ox, row.y - oy, row.z - oz]))
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!(
        "centered {} rows on '{}' across {} frames",
        rows.len(),
        skeleton.reference_joint,
        origins.len()
    );
    Ok(JointTable::from_rows(rows))
}

/// Whether every reference row sits exactly at the origin.
pub fn check_hip_centered(table: &JointTable, skeleton: &SkeletonConfig) -> Result<bool, PipelineError> {
    check_hip_centered_within(table, skeleton, 0.0)
}

/// Whether every reference row lies within `tolerance` of the origin on each axis.
///
/// NaN coordinates never count as centered.
pub fn check_hip_centered_within(
    table: &JointTable,
    skeleton: &SkeletonConfig,
    tolerance: f64,
) -> Result<bool, PipelineError> {
    let mut reference_rows = table
        .rows
        .iter()
        .filter(|r| skeleton.is_reference(&r.label))
        .peekable();

    if reference_rows.peek().is_none() {
        return Err(skeleton.missing_reference(None));
    }

    Ok(reference_rows.all(|r| r.coords().iter().all(|v| v.abs() <= tolerance)))
}

// ---------------------------------------------------------------------------
// Distances
// ---------------------------------------------------------------------------

fn euclidean(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Fill the `distance` column with each row's norm.
pub fn calculate_distance(table: &JointTable) -> JointTable {
    let rows = table
        .rows
        .iter()
        .map(|row| JointObservation {
            distance: Some(euclidean(row.coords(), [0.0; 3])),
            ..row.clone()
        })
        .collect();
    JointTable::from_rows(rows)
}

/// N×M matrix of distances between `points` and `anchors`.
pub fn pairwise_distances(points: &[[f64; 3]], anchors: &[[f64; 3]]) -> Vec<Vec<f64>> {
    points
        .iter()
        .map(|&p| anchors.iter().map(|&a| euclidean(p, a)).collect())
        .collect()
}

/// Append one `distance_to_coord_<name>` column per landmark, then sort rows by frame.
///
/// The sort is stable, so rows keep their relative order inside a frame.
pub fn add_landmark_location(table: &JointTable, skeleton: &SkeletonConfig) -> JointTable {
    let points: Vec<[f64; 3]> = table.rows.iter().map(JointObservation::coords).collect();
    let anchors: Vec<[f64; 3]> = skeleton.landmarks.iter().map(|l| l.coords).collect();
    let distances = pairwise_distances(&points, &anchors);

    let mut rows: Vec<JointObservation> = table
        .rows
        .iter()
        .zip(distances)
        .map(|(row, row_distances)| JointObservation {
            landmark_distances: skeleton
                .landmarks
                .iter()
                .map(|l| l.name.clone())
                .zip(row_distances)
                .collect(),
            ..row.clone()
        })
        .collect();

    rows.sort_by_key(|r| r.frame);
    JointTable::from_rows(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::skeleton::Landmark;

    fn frame(frame: FrameId, hip: [f64; 3], nose: [f64; 3]) -> Vec<JointObservation> {
        vec![
            JointObservation::new(frame, "nose", nose[0], nose[1], nose[2]),
            JointObservation::new(frame, "hip", hip[0], hip[1], hip[2]),
        ]
    }

    #[test]
    fn centering_subtracts_the_hip_of_the_same_frame() {
        let mut rows = frame(0, [1.0, 2.0, 3.0], [2.0, 2.0, 2.0]);
        rows.extend(frame(1, [-1.0, 0.5, 0.0], [0.0, 0.0, 0.0]));
        let table = JointTable::from_rows(rows);

        let centered = center_hip(&table, &SkeletonConfig::default()).unwrap();

        assert_eq!(centered.len(), table.len());
        assert_eq!(centered.rows[0].coords(), [1.0, 0.0, -1.0]);
        assert_eq!(centered.rows[1].coords(), [0.0, 0.0, 0.0]);
        assert_eq!(centered.rows[2].coords(), [1.0, -0.5, 0.0]);
        assert_eq!(centered.rows[3].coords(), [0.0, 0.0, 0.0]);
        assert_eq!(centered.rows[0].label, "nose");
        assert!(check_hip_centered(&centered, &SkeletonConfig::default()).unwrap());
    }

    #[test]
    fn centering_without_any_hip_fails() {
        let table = JointTable::from_rows(vec![JointObservation::new(0, "nose", 1.0, 1.0, 1.0)]);
        assert_eq!(
            center_hip(&table, &SkeletonConfig::default()),
            Err(PipelineError::MissingGroup {
                label: "hip".into(),
                frame: None
            })
        );
    }

    #[test]
    fn centering_reports_the_frame_missing_its_hip() {
        let mut rows = frame(0, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
        rows.push(JointObservation::new(5, "nose", 1.0, 1.0, 1.0));
        let table = JointTable::from_rows(rows);

        assert_eq!(
            center_hip(&table, &SkeletonConfig::default()),
            Err(PipelineError::MissingGroup {
                label: "hip".into(),
                frame: Some(5)
            })
        );
    }

    #[test]
    fn centering_rejects_two_hips_in_one_frame() {
        let mut rows = frame(3, [1.0, 1.0, 1.0], [0.0, 0.0, 0.0]);
        rows.push(JointObservation::new(3, "hip", 2.0, 2.0, 2.0));
        let table = JointTable::from_rows(rows);

        assert_eq!(
            center_hip(&table, &SkeletonConfig::default()),
            Err(PipelineError::DuplicateLabel {
                label: "hip".into(),
                frame: 3
            })
        );
    }

    #[test]
    fn centered_check_uses_numeric_equality() {
        let skeleton = SkeletonConfig::default();
        // A negative value is "truthy" but not zero.
        let table = JointTable::from_rows(frame(0, [-1.0, 0.0, 0.0], [0.0, 0.0, 0.0]));
        assert!(!check_hip_centered(&table, &skeleton).unwrap());

        let table = JointTable::from_rows(frame(0, [-0.0, 0.0, 0.0], [5.0, 0.0, 0.0]));
        assert!(check_hip_centered(&table, &skeleton).unwrap());

        let table = JointTable::from_rows(frame(0, [f64::NAN, 0.0, 0.0], [0.0, 0.0, 0.0]));
        assert!(!check_hip_centered(&table, &skeleton).unwrap());
    }

    #[test]
    fn centered_check_with_tolerance() {
        let skeleton = SkeletonConfig::default();
        let table = JointTable::from_rows(frame(0, [1e-9, -1e-9, 0.0], [0.0, 0.0, 0.0]));
        assert!(!check_hip_centered(&table, &skeleton).unwrap());
        assert!(check_hip_centered_within(&table, &skeleton, 1e-6).unwrap());
    }

    #[test]
    fn centered_check_without_hip_fails() {
        let table = JointTable::from_rows(vec![JointObservation::new(0, "nose", 0.0, 0.0, 0.0)]);
        assert!(check_hip_centered(&table, &SkeletonConfig::default()).is_err());
    }

    #[test]
    fn distance_is_the_norm_and_idempotent() {
        let table = JointTable::from_rows(vec![
            JointObservation::new(0, "nose", 3.0, 4.0, 0.0),
            JointObservation::new(0, "tail", f64::NAN, 0.0, 0.0),
        ]);
        let once = calculate_distance(&table);
        assert_eq!(once.rows[0].distance, Some(5.0));
        assert!(once.rows[1].distance.unwrap().is_nan());

        let twice = calculate_distance(&once);
        assert_eq!(twice.rows[0].distance, once.rows[0].distance);
    }

    #[test]
    fn landmark_distance_matches_hand_computed_value() {
        let skeleton = SkeletonConfig::default();
        let table = JointTable::from_rows(vec![JointObservation::new(0, "hip", 0.0, 0.0, 0.0)]);

        let annotated = add_landmark_location(&table, &skeleton);
        let row = &annotated.rows[0];

        assert_eq!(row.landmark_distances.len(), 8);
        let b1 = row.landmark_distance("b1").unwrap();
        let expected = (1.8831099474237765f64.powi(2)
            + 2.2504857710896258f64.powi(2)
            + 3.1104950213839317f64.powi(2))
        .sqrt();
        assert!((b1 - expected).abs() < 1e-12);
        assert!((b1 - 4.276).abs() < 1e-3);
    }

    #[test]
    fn landmark_annotation_sorts_by_frame_and_keeps_row_count() {
        let skeleton = SkeletonConfig {
            landmarks: vec![Landmark::new("a", [1.0, 0.0, 0.0]), Landmark::new("o", [0.0; 3])],
            ..SkeletonConfig::default()
        };
        let table = JointTable::from_rows(vec![
            JointObservation::new(2, "nose", 0.0, 0.0, 0.0),
            JointObservation::new(1, "nose", 0.0, 3.0, 4.0),
            JointObservation::new(2, "hip", 1.0, 0.0, 0.0),
        ]);

        let annotated = add_landmark_location(&table, &skeleton);

        assert_eq!(annotated.len(), 3);
        let frames: Vec<FrameId> = annotated.rows.iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![1, 2, 2]);
        assert_eq!(annotated.rows[1].label, "nose");
        assert_eq!(annotated.rows[2].label, "hip");
        assert_eq!(annotated.rows[0].landmark_distance("o"), Some(5.0));
        assert_eq!(annotated.rows[2].landmark_distance("a"), Some(0.0));
        assert_eq!(annotated.landmark_names(), vec!["a", "o"]);
    }

    #[test]
    fn pairwise_distances_shape() {
        let m = pairwise_distances(&[[0.0; 3], [1.0, 0.0, 0.0]], &[[0.0; 3], [0.0, 2.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(m.len(), 2);
        assert!(m.iter().all(|row| row.len() == 3));
        assert_eq!(m[1][2], 0.0);
        assert_eq!(m[0][1], 2.0);
    }
}
