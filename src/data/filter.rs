use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

use super::model::{Column, FrameId, JointTable};

// ---------------------------------------------------------------------------
// Outlier removal
// ---------------------------------------------------------------------------

/// Which side of the threshold marks a value as an outlier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// `value > threshold`
    #[default]
    Greater,
    /// `value < threshold`
    Less,
}

impl ComparisonMode {
    fn exceeds(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonMode::Greater => value > threshold,
            ComparisonMode::Less => value < threshold,
        }
    }
}

/// Frames holding at least one row with a checked column beyond `threshold`.
pub fn outlier_frames(
    table: &JointTable,
    threshold: f64,
    columns: &[Column],
    mode: ComparisonMode,
) -> Result<BTreeSet<FrameId>, PipelineError> {
    let mut frames = BTreeSet::new();
    for row in &table.rows {
        let mut flagged = false;
        // Every column is read, so a missing one is reported even on flagged rows.
        for column in columns {
            let value = row.value(column).ok_or_else(|| PipelineError::SchemaMismatch {
                column: column.to_string(),
            })?;
            // NaN compares false either way and never flags a frame.
            flagged |= mode.exceeds(value, threshold);
        }
        if flagged {
            frames.insert(row.frame);
        }
    }
    Ok(frames)
}

/// Drop every frame in which any row has any of `columns` beyond `threshold`.
///
/// Filtering is per frame, not per row: one bad joint removes all joints of
/// that frame, so surviving frames keep their full row count.
pub fn remove_rows(
    table: &JointTable,
    threshold: f64,
    columns: &[Column],
    mode: ComparisonMode,
) -> Result<JointTable, PipelineError> {
    let dropped = outlier_frames(table, threshold, columns, mode)?;
    if !dropped.is_empty() {
        log::info!(
            "dropping {} frames with {mode:?} {threshold} on {:?}",
            dropped.len(),
            columns.iter().map(|c| c.to_string()).collect::<Vec<_>>()
        );
    }

    Ok(JointTable::from_rows(
        table
            .rows
            .iter()
            .filter(|r| !dropped.contains(&r.frame))
            .cloned()
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// Row-count gate
// ---------------------------------------------------------------------------

/// Fail unless every frame has exactly `expected_count` rows.
///
/// The error lists every non-conforming frame, ascending.
pub fn check_index_row_count(table: &JointTable, expected_count: usize) -> Result<(), PipelineError> {
    let incorrect: Vec<FrameId> = table
        .frame_counts()
        .into_iter()
        .filter(|(_, count)| *count != expected_count)
        .map(|(frame, _)| frame)
        .collect();

    if incorrect.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::RowCountMismatch {
            expected: expected_count,
            frames: incorrect,
        })
    }
}
