use crate::error::PipelineError;

use super::model::{Column, FrameId};

/// Rows expected per frame: one per tracked joint.
pub const DEFAULT_EXPECTED_COUNT: usize = 13;

/// Joint all other joints are expressed relative to.
pub const REFERENCE_JOINT: &str = "hip";

const JOINTS: [&str; 13] = [
    "nose", "head", "neck", "rshoulder", "rhand", "lshoulder", "lhand", "hip", "rknee", "rfoot",
    "lknee", "lfoot", "tail",
];

// Barrels b1..b4 and feeders f1..f4 of the enclosure, in dataset units.
const LANDMARKS: [(&str, [f64; 3]); 8] = [
    ("b1", [1.8831099474237765, 2.2504857710896258, 3.1104950213839317]),
    ("b2", [3.2684966975634477, 2.3323177565826185, 3.0727974914230116]),
    ("b3", [-2.740061407095278, 3.0620530012108063, -2.0537183009440745]),
    ("b4", [-3.090940351965614, 3.0070227700837804, -0.8690008794238412]),
    ("f1", [-2.161960556268887, 2.428982849819521, 3.5207878102359627]),
    ("f2", [3.868664285069503, -0.19594825889453213, 2.5292130833751956]),
    ("f3", [2.5104482176851417, 3.281142061125232, -2.044059905334382]),
    ("f4", [-3.5609489140305444, 1.7744324668075677, -1.8620419355950952]),
];

// ---------------------------------------------------------------------------
// Landmark – a fixed point of the enclosure
// ---------------------------------------------------------------------------

/// A named, non-moving 3D coordinate used as a distance anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub name: String,
    pub coords: [f64; 3],
}

impl Landmark {
    pub fn new(name: impl Into<String>, coords: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            coords,
        }
    }

    /// The derived column this landmark produces.
    pub fn column(&self) -> Column {
        Column::Landmark(self.name.clone())
    }
}

// ---------------------------------------------------------------------------
// SkeletonConfig – dataset constants
// ---------------------------------------------------------------------------

/// Immutable description of the tracked skeleton and its surroundings.
///
/// `Default` yields the constants of the NHP enclosure dataset. Tests and
/// other datasets build their own.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonConfig {
    pub reference_joint: String,
    /// Joint vocabulary; also the joint order of extracted features.
    pub joints: Vec<String>,
    pub landmarks: Vec<Landmark>,
    pub expected_count: usize,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            reference_joint: REFERENCE_JOINT.to_string(),
            joints: JOINTS.iter().map(|j| j.to_string()).collect(),
            landmarks: LANDMARKS
                .iter()
                .map(|(name, coords)| Landmark::new(*name, *coords))
                .collect(),
            expected_count: DEFAULT_EXPECTED_COUNT,
        }
    }
}

impl SkeletonConfig {
    pub fn with_expected_count(mut self, expected_count: usize) -> Self {
        self.expected_count = expected_count;
        self
    }

    /// Position of `label` in the joint vocabulary.
    pub fn joint_index(&self, label: &str) -> Option<usize> {
        self.joints.iter().position(|j| j == label)
    }

    pub fn is_reference(&self, label: &str) -> bool {
        self.reference_joint == label
    }

    pub(crate) fn missing_reference(&self, frame: Option<FrameId>) -> PipelineError {
        PipelineError::MissingGroup {
            label: self.reference_joint.clone(),
            frame,
        }
    }
}
