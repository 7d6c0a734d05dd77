use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Frame identifier: the index value shared by every joint captured at one moment.
pub type FrameId = i64;

/// Prefix of the per-landmark distance columns (`distance_to_coord_b1`, ...).
pub const LANDMARK_COLUMN_PREFIX: &str = "distance_to_coord_";

// ---------------------------------------------------------------------------
// Column – a numeric column of the joint table
// ---------------------------------------------------------------------------

/// A numeric column that can be inspected by the row filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    X,
    Y,
    Z,
    Distance,
    /// `distance_to_coord_<name>`
    Landmark(String),
}

impl Column {
    /// The coordinate columns checked by default.
    pub fn coordinates() -> Vec<Column> {
        vec![Column::X, Column::Y, Column::Z]
    }
}

impl FromStr for Column {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(Column::X),
            "y" => Ok(Column::Y),
            "z" => Ok(Column::Z),
            "distance" => Ok(Column::Distance),
            other => match other.strip_prefix(LANDMARK_COLUMN_PREFIX) {
                Some(name) if !name.is_empty() => Ok(Column::Landmark(name.to_string())),
                _ => Err(PipelineError::SchemaMismatch {
                    column: other.to_string(),
                }),
            },
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::X => write!(f, "x"),
            Column::Y => write!(f, "y"),
            Column::Z => write!(f, "z"),
            Column::Distance => write!(f, "distance"),
            Column::Landmark(name) => write!(f, "{LANDMARK_COLUMN_PREFIX}{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// JointObservation – one row of the table
// ---------------------------------------------------------------------------

/// A named 3D point observed in one frame, plus the columns derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct JointObservation {
    pub frame: FrameId,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Euclidean norm of (x, y, z), once computed.
    pub distance: Option<f64>,
    /// Landmark name → distance, in landmark order.
    pub landmark_distances: Vec<(String, f64)>,
}

impl JointObservation {
    pub fn new(frame: FrameId, label: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            frame,
            label: label.into(),
            x,
            y,
            z,
            distance: None,
            landmark_distances: Vec::new(),
        }
    }

    pub fn coords(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Copy of this row moved to `coords`.
    ///
    /// Derived columns describe the old position, so they are dropped.
    pub fn with_coords(&self, [x, y, z]: [f64; 3]) -> Self {
        Self {
            frame: self.frame,
            label: self.label.clone(),
            x,
            y,
            z,
            distance: None,
            landmark_distances: Vec::new(),
        }
    }

    /// Distance to the named landmark, if that column has been computed.
    pub fn landmark_distance(&self, name: &str) -> Option<f64> {
        self.landmark_distances
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| *d)
    }

    /// Value of a numeric column, `None` when a derived column is absent.
    pub fn value(&self, column: &Column) -> Option<f64> {
        match column {
            Column::X => Some(self.x),
            Column::Y => Some(self.y),
            Column::Z => Some(self.z),
            Column::Distance => self.distance,
            Column::Landmark(name) => self.landmark_distance(name),
        }
    }
}

// ---------------------------------------------------------------------------
// JointTable – the complete per-frame, per-joint table
// ---------------------------------------------------------------------------

/// Ordered rows keyed by frame. Several rows share a frame, one per joint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointTable {
    pub rows: Vec<JointObservation>,
}

impl JointTable {
    pub fn from_rows(rows: Vec<JointObservation>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct frame identifiers, ascending.
    pub fn frames(&self) -> BTreeSet<FrameId> {
        self.rows.iter().map(|r| r.frame).collect()
    }

    /// Row count per frame.
    pub fn frame_counts(&self) -> BTreeMap<FrameId, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.frame).or_insert(0) += 1;
        }
        counts
    }

    /// Rows grouped by frame, keeping their relative order.
    pub fn group_by_frame(&self) -> BTreeMap<FrameId, Vec<&JointObservation>> {
        let mut groups: BTreeMap<FrameId, Vec<&JointObservation>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.frame).or_default().push(row);
        }
        groups
    }

    /// Landmark column names in order of first appearance.
    pub fn landmark_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for row in &self.rows {
            for (name, _) in &row.landmark_distances {
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Column names in output order: `label, x, y, z` then derived columns.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns: Vec<String> = ["label", "x", "y", "z"].iter().map(|c| c.to_string()).collect();
        if self.rows.iter().any(|r| r.distance.is_some()) {
            columns.push(Column::Distance.to_string());
        }
        columns.extend(
            self.landmark_names()
                .into_iter()
                .map(|name| Column::Landmark(name).to_string()),
        );
        columns
    }

    /// Append the rows of `other`.
    pub fn extend(&mut self, other: JointTable) {
        self.rows.extend(other.rows);
    }
}
