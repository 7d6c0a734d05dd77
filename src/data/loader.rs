use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use crate::error::PipelineError;

use super::model::{FrameId, JointObservation, JointTable, LANDMARK_COLUMN_PREFIX};

/// Column names accepted as the frame index, in order of preference.
///
/// Pandas writes an unnamed index as `__index_level_0__` in parquet, and
/// `reset_index()` turns it into `index`. In CSV (`df.to_csv()`) the unnamed
/// index is a leading column with an empty header, which is accepted too.
const FRAME_COLUMNS: [&str; 3] = ["frame", "__index_level_0__", "index"];

/// File extensions [`load_dir`] picks up.
pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["parquet", "pq", "csv", "json"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a joint table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per observation, scalar columns (recommended)
/// * `.json`    – `[{ "frame": 0, "label": "hip", "x": .., "y": .., "z": .. }, ...]`
/// * `.csv`     – header row, same columns as the JSON records
///
/// Required columns are `label`, `x`, `y`, `z` and a frame index. `distance`
/// and `distance_to_coord_*` columns are read back when present.
pub fn load_file(path: &Path) -> Result<JointTable> {
    match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Load and concatenate every supported file in `dir`, in file-name order.
pub fn load_dir(dir: &Path) -> Result<JointTable> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("listing {}", dir.display()))?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && SUPPORTED_EXTENSIONS.contains(&extension(p).as_str()))
        .collect();
    paths.sort();

    let mut table = JointTable::default();
    for path in &paths {
        let part = load_file(path).with_context(|| format!("loading {}", path.display()))?;
        log::info!("loaded {} rows from {}", part.len(), path.display());
        table.extend(part);
    }
    Ok(table)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn missing(column: &str) -> PipelineError {
    PipelineError::SchemaMismatch {
        column: column.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Column layout shared by the loaders
// ---------------------------------------------------------------------------

/// Positions of the known columns inside a header.
struct ColumnLayout {
    frame: usize,
    label: usize,
    x: usize,
    y: usize,
    z: usize,
    distance: Option<usize>,
    landmarks: Vec<(usize, String)>,
}

impl ColumnLayout {
    fn from_headers<S: AsRef<str>>(headers: &[S]) -> Result<Self, PipelineError> {
        let find = |name: &str| headers.iter().position(|h| h.as_ref() == name);
        let require = |name: &str| find(name).ok_or_else(|| missing(name));

        let frame = FRAME_COLUMNS
            .iter()
            .find_map(|&name| find(name))
            .or_else(|| find("").filter(|&i| i == 0))
            .ok_or_else(|| missing(FRAME_COLUMNS[0]))?;

        let landmarks = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| {
                h.as_ref()
                    .strip_prefix(LANDMARK_COLUMN_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (i, name.to_string()))
            })
            .collect();

        Ok(Self {
            frame,
            label: require("label")?,
            x: require("x")?,
            y: require("y")?,
            z: require("z")?,
            distance: find("distance"),
            landmarks,
        })
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.reset_index().to_json(orient='records')`):
///
/// ```json
/// [
///   { "frame": 0, "label": "hip",  "x": 0.12, "y": 1.02, "z": -0.33 },
///   { "frame": 0, "label": "nose", "x": 0.40, "y": 1.31, "z": -0.10 },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<JointTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root
        .as_array()
        .context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        let layout = ColumnLayout::from_headers(&keys)?;
        let field = |idx: usize| &obj[keys[idx]];

        let frame = field(layout.frame)
            .as_i64()
            .with_context(|| format!("Row {i}: frame index is not an integer"))?;
        let label = field(layout.label)
            .as_str()
            .with_context(|| format!("Row {i}: label is not a string"))?;

        let mut row = JointObservation::new(
            frame,
            label,
            json_f64(field(layout.x), i, "x")?,
            json_f64(field(layout.y), i, "y")?,
            json_f64(field(layout.z), i, "z")?,
        );
        row.distance = layout.distance.and_then(|idx| field(idx).as_f64());
        for (idx, name) in &layout.landmarks {
            if let Some(d) = field(*idx).as_f64() {
                row.landmark_distances.push((name.clone(), d));
            }
        }

        rows.push(row);
    }

    Ok(JointTable::from_rows(rows))
}

fn json_f64(val: &JsonValue, row: usize, col: &str) -> Result<f64> {
    match val {
        // `to_json` writes NaN as null.
        JsonValue::Null => Ok(f64::NAN),
        other => other
            .as_f64()
            .with_context(|| format!("Row {row}, {col}: not a number")),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one observation per line.
/// Empty cells in derived columns mean "not computed".
fn load_csv(path: &Path) -> Result<JointTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let layout = ColumnLayout::from_headers(&headers)?;
    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

        let frame: FrameId = cell(layout.frame)
            .parse()
            .with_context(|| format!("CSV row {row_no}: frame index is not an integer"))?;

        let mut row = JointObservation::new(
            frame,
            cell(layout.label),
            parse_float(cell(layout.x), row_no, "x")?,
            parse_float(cell(layout.y), row_no, "y")?,
            parse_float(cell(layout.z), row_no, "z")?,
        );
        if let Some(idx) = layout.distance {
            row.distance = parse_optional_float(cell(idx), row_no, "distance")?;
        }
        for (idx, name) in &layout.landmarks {
            if let Some(d) = parse_optional_float(cell(*idx), row_no, name)? {
                row.landmark_distances.push((name.clone(), d));
            }
        }

        rows.push(row);
    }

    Ok(JointTable::from_rows(rows))
}

fn parse_float(s: &str, row: usize, col: &str) -> Result<f64> {
    s.parse::<f64>()
        .with_context(|| format!("Row {row}, {col}: '{s}' is not a number"))
}

fn parse_optional_float(s: &str, row: usize, col: &str) -> Result<Option<f64>> {
    if s.is_empty() {
        return Ok(None);
    }
    parse_float(s, row, col).map(Some)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file of joint observations.
///
/// Expected schema:
/// - frame index: Int64/Int32 (`frame`, `__index_level_0__` or `index`)
/// - `label`: Utf8 or LargeUtf8
/// - `x`, `y`, `z`: Float64/Float32 (integers are widened)
/// - optional `distance`, `distance_to_coord_*`: nullable floats
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<JointTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let layout = layout_of(&batch.schema())?;

        let frame_col = batch.column(layout.frame);
        let label_col = batch.column(layout.label);
        let (x_col, y_col, z_col) = (
            batch.column(layout.x),
            batch.column(layout.y),
            batch.column(layout.z),
        );

        for row in 0..batch.num_rows() {
            let frame = extract_i64(frame_col, row)
                .with_context(|| format!("Row {row}: failed to read frame index"))?;
            let label = extract_string(label_col, row)
                .with_context(|| format!("Row {row}: failed to read 'label'"))?;

            let mut obs = JointObservation::new(
                frame,
                label,
                extract_f64(x_col, row)?.unwrap_or(f64::NAN),
                extract_f64(y_col, row)?.unwrap_or(f64::NAN),
                extract_f64(z_col, row)?.unwrap_or(f64::NAN),
            );
            if let Some(idx) = layout.distance {
                obs.distance = extract_f64(batch.column(idx), row)?;
            }
            for (idx, name) in &layout.landmarks {
                if let Some(d) = extract_f64(batch.column(*idx), row)? {
                    obs.landmark_distances.push((name.clone(), d));
                }
            }

            rows.push(obs);
        }
    }

    Ok(JointTable::from_rows(rows))
}

fn layout_of(schema: &Arc<Schema>) -> Result<ColumnLayout, PipelineError> {
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
    ColumnLayout::from_headers(&names)
}

// -- Parquet / Arrow helpers --

/// Extract a nullable float from a numeric column at the given row.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<Option<f64>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let value = match col.data_type() {
        DataType::Float64 => downcast::<Float64Array>(col)?.value(row),
        DataType::Float32 => downcast::<Float32Array>(col)?.value(row) as f64,
        DataType::Int64 => downcast::<Int64Array>(col)?.value(row) as f64,
        DataType::Int32 => downcast::<Int32Array>(col)?.value(row) as f64,
        other => bail!("Expected a numeric column, got {other:?}"),
    };
    Ok(Some(value))
}

fn extract_i64(col: &Arc<dyn Array>, row: usize) -> Result<i64> {
    if col.is_null(row) {
        bail!("null frame index");
    }
    match col.data_type() {
        DataType::Int64 => Ok(downcast::<Int64Array>(col)?.value(row)),
        DataType::Int32 => Ok(downcast::<Int32Array>(col)?.value(row) as i64),
        other => bail!("Expected an integer column, got {other:?}"),
    }
}

fn extract_string(col: &Arc<dyn Array>, row: usize) -> Result<String> {
    if col.is_null(row) {
        bail!("null label");
    }
    match col.data_type() {
        DataType::Utf8 => Ok(downcast::<StringArray>(col)?.value(row).to_string()),
        DataType::LargeUtf8 => Ok(col.as_string::<i64>().value(row).to_string()),
        other => bail!("Expected a string column, got {other:?}"),
    }
}

fn downcast<T: 'static>(col: &Arc<dyn Array>) -> Result<&T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("unexpected array type {:?}", col.data_type()))
}
