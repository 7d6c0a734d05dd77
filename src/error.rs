use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::FrameId;

// ---------------------------------------------------------------------------
// Preprocessing errors
// ---------------------------------------------------------------------------

/// Failures raised by the table transforms and validation gates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A required label (the reference joint) has no row.
    #[error("no '{label}' group{}", in_frame(.frame))]
    MissingGroup { label: String, frame: Option<FrameId> },

    #[error("frame {frame} has more than one '{label}' row")]
    DuplicateLabel { label: String, frame: FrameId },

    /// A required column is absent or not a known column.
    #[error("missing column '{column}'")]
    SchemaMismatch { column: String },

    #[error("the following frames don't have {expected} rows: {frames:?}")]
    RowCountMismatch {
        expected: usize,
        frames: Vec<FrameId>,
    },

    #[error("'{label}' rows are not centered at the origin")]
    NotCentered { label: String },

    #[error("frame {frame}: label '{label}' is not part of the joint vocabulary")]
    UnknownLabel { label: String, frame: FrameId },
}

fn in_frame(frame: &Option<FrameId>) -> String {
    match frame {
        Some(f) => format!(" in frame {f}"),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Orchestration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("missing configuration key '{0}'")]
    MissingConfigKey(&'static str),

    #[error("model.in_dim is {in_dim} but the {layout} layout produces {expected} features per frame")]
    InDimMismatch {
        in_dim: usize,
        expected: usize,
        layout: &'static str,
    },

    #[error("no joint observations found under {}", .0.display())]
    EmptyDataset(PathBuf),

    #[error("preprocessing removed every frame loaded from {}", .0.display())]
    NoFramesLeft(PathBuf),

    #[error("data.expected_count is {expected_count} but the skeleton tracks {joints} joints")]
    ExpectedCountMismatch { expected_count: usize, joints: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_group_names_the_frame_when_known() {
        let global = PipelineError::MissingGroup {
            label: "hip".into(),
            frame: None,
        };
        assert_eq!(global.to_string(), "no 'hip' group");

        let local = PipelineError::MissingGroup {
            label: "hip".into(),
            frame: Some(7),
        };
        assert_eq!(local.to_string(), "no 'hip' group in frame 7");
    }

    #[test]
    fn row_count_mismatch_lists_frames() {
        let err = PipelineError::RowCountMismatch {
            expected: 13,
            frames: vec![4, 9],
        };
        assert_eq!(
            err.to_string(),
            "the following frames don't have 13 rows: [4, 9]"
        );
    }
}
