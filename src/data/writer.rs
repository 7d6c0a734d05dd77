use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::features::FeatureMatrix;
use super::model::{Column, JointTable};

// ---------------------------------------------------------------------------
// Joint tables
// ---------------------------------------------------------------------------

/// Write a joint table, dispatching by extension (`.parquet`/`.pq` or `.csv`).
///
/// The frame index is written as a `frame` column so [`super::loader::load_file`]
/// reads it back. Derived columns a row lacks are left null (empty in CSV).
pub fn write_file(table: &JointTable, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => write_parquet(&table_batch(table)?, path),
        "csv" => write_csv(table, path),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

fn derived_columns(table: &JointTable) -> Vec<Column> {
    let mut columns = Vec::new();
    if table.rows.iter().any(|r| r.distance.is_some()) {
        columns.push(Column::Distance);
    }
    columns.extend(table.landmark_names().into_iter().map(Column::Landmark));
    columns
}

fn table_batch(table: &JointTable) -> Result<RecordBatch> {
    let derived = derived_columns(table);

    let mut fields = vec![
        Field::new("frame", DataType::Int64, false),
        Field::new("label", DataType::Utf8, false),
        Field::new("x", DataType::Float64, false),
        Field::new("y", DataType::Float64, false),
        Field::new("z", DataType::Float64, false),
    ];
    fields.extend(
        derived
            .iter()
            .map(|c| Field::new(c.to_string(), DataType::Float64, true)),
    );

    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(table.rows.iter().map(|r| r.frame))),
        Arc::new(StringArray::from_iter_values(table.rows.iter().map(|r| r.label.as_str()))),
        Arc::new(Float64Array::from_iter_values(table.rows.iter().map(|r| r.x))),
        Arc::new(Float64Array::from_iter_values(table.rows.iter().map(|r| r.y))),
        Arc::new(Float64Array::from_iter_values(table.rows.iter().map(|r| r.z))),
    ];
    for column in &derived {
        arrays.push(Arc::new(Float64Array::from(
            table.rows.iter().map(|r| r.value(column)).collect::<Vec<_>>(),
        )));
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context("building record batch")
}

fn write_csv(table: &JointTable, path: &Path) -> Result<()> {
    let derived = derived_columns(table);
    let mut writer = csv::Writer::from_path(path).context("creating CSV")?;

    let mut header = vec!["frame".to_string()];
    header.extend(table.column_names());
    writer.write_record(&header).context("writing CSV header")?;

    for row in &table.rows {
        let mut record = vec![
            row.frame.to_string(),
            row.label.clone(),
            row.x.to_string(),
            row.y.to_string(),
            row.z.to_string(),
        ];
        record.extend(
            derived
                .iter()
                .map(|c| row.value(c).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record).context("writing CSV row")?;
    }

    writer.flush().context("flushing CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Feature matrices
// ---------------------------------------------------------------------------

/// Write a feature matrix as Parquet: a `frame` column then one column per feature.
pub fn write_features(matrix: &FeatureMatrix, path: &Path) -> Result<()> {
    let mut fields = vec![Field::new("frame", DataType::Int64, false)];
    fields.extend(
        matrix
            .column_names
            .iter()
            .map(|name| Field::new(name.as_str(), DataType::Float64, false)),
    );

    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(matrix.frames.clone()))];
    for col in 0..matrix.width() {
        arrays.push(Arc::new(Float64Array::from_iter_values(
            matrix.rows.iter().map(|row| row[col]),
        )));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .context("building feature batch")?;
    write_parquet(&batch, path)
}

fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
    writer.write(batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}
