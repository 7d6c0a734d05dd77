/// Data layer: joint tables, loading, preprocessing, and feature extraction.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → JointTable
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ transform  │  center on hip, distances, landmark distances
///   └───────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  drop outlier frames, row-count gate
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ features  │  one flattened vector per frame → writer
///   └──────────┘
/// ```
/// `pipeline` runs the middle stages in order; `skeleton` holds the
/// dataset constants they share.

pub mod features;
pub mod filter;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod skeleton;
pub mod transform;
pub mod writer;
