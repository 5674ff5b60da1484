//! Converts query rows into a columnar Arrow record and serializes it
//! as Parquet or CSV, matching `exportASArrowRecord` in the original:
//! infer each column's type from its first non-null value, then build
//! a typed array for it.

use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use manager_api::query::{Response, Row};
use manager_api::{Error, Result};
use serde_json::Value as Json;
use std::io::Write;
use std::sync::Arc;

/// The export formats this store can produce (spec §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    ArrowParquet,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "parquet" => Ok(ExportFormat::ArrowParquet),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::data_store(format!("unsupported export format: {other}"))),
        }
    }
}

fn infer_column_type(column: &str, rows: &[Row]) -> DataType {
    for row in rows {
        match row.get(column) {
            None | Some(Json::Null) => continue,
            Some(Json::Bool(_)) => return DataType::Boolean,
            Some(Json::Number(_)) => return DataType::Float64,
            Some(Json::String(s)) => {
                return if s.parse::<f64>().is_ok() {
                    DataType::Float64
                } else {
                    DataType::Utf8
                };
            }
            Some(_) => return DataType::Utf8,
        }
    }
    // An all-null column has no values to infer from; default to a
    // string column the way an empty string-array still round-trips.
    DataType::Utf8
}

fn build_column(data_type: &DataType, column: &str, rows: &[Row]) -> ArrayRef {
    match data_type {
        DataType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(rows.len());
            for row in rows {
                match row.get(column) {
                    Some(Json::Bool(v)) => b.append_value(*v),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(rows.len());
            for row in rows {
                match row.get(column) {
                    Some(Json::Number(n)) => b.append_option(n.as_f64()),
                    Some(Json::String(s)) => b.append_option(s.parse::<f64>().ok()),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Int64 => {
            let mut b = Int64Builder::with_capacity(rows.len());
            for row in rows {
                match row.get(column) {
                    Some(Json::Number(n)) => b.append_option(n.as_i64()),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        _ => {
            let mut b = StringBuilder::with_capacity(rows.len(), rows.len() * 8);
            for row in rows {
                match row.get(column) {
                    Some(Json::String(s)) => b.append_value(s),
                    Some(other @ (Json::Bool(_) | Json::Number(_))) => b.append_value(other.to_string()),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
    }
}

/// Every row is expected to carry the same columns; the column order
/// is taken from the first row, matching InfluxDB's own series shape
/// (one fixed column list per series).
pub fn to_record_batch(response: &Response) -> Result<RecordBatch> {
    let Some(first) = response.rows.first() else {
        return RecordBatch::try_new(Arc::new(Schema::empty()), Vec::new())
            .map_err(|e| Error::data_store(format!("building empty export record: {e}")));
    };

    let columns: Vec<String> = first.keys().cloned().collect();
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(c, infer_column_type(c, &response.rows), true))
        .collect();

    let arrays: Vec<ArrayRef> = fields
        .iter()
        .map(|f| build_column(f.data_type(), f.name(), &response.rows))
        .collect();

    let schema = Arc::new(Schema::new(fields));
    RecordBatch::try_new(schema, arrays).map_err(|e| Error::data_store(format!("building export record: {e}")))
}

pub fn write_parquet(batch: &RecordBatch, sink: &mut (dyn Write + Send)) -> Result<()> {
    let props = parquet::file::properties::WriterProperties::builder()
        .set_dictionary_enabled(false)
        .build();

    let mut writer = parquet::arrow::ArrowWriter::try_new(sink, batch.schema(), Some(props))
        .map_err(|e| Error::data_store(format!("opening parquet writer: {e}")))?;
    writer
        .write(batch)
        .map_err(|e| Error::data_store(format!("writing parquet record: {e}")))?;
    writer
        .close()
        .map_err(|e| Error::data_store(format!("closing parquet writer: {e}")))?;
    Ok(())
}

pub fn write_csv(batch: &RecordBatch, sink: &mut (dyn Write + Send)) -> Result<()> {
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .with_delimiter(b';')
        .with_null(String::from("null"))
        .build(sink);
    writer
        .write(batch)
        .map_err(|e| Error::data_store(format!("writing csv record: {e}")))
}

pub fn export(response: &Response, format: ExportFormat, sink: &mut (dyn Write + Send)) -> Result<()> {
    if response.rows.is_empty() {
        return Ok(());
    }
    let batch = to_record_batch(response)?;
    match format {
        ExportFormat::ArrowParquet => write_parquet(&batch, sink),
        ExportFormat::Csv => write_csv(&batch, sink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, Json)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<HashMap<_, _>>()
    }

    #[test]
    fn numeric_string_columns_promote_to_float64() {
        let rows = vec![row(&[("temp", Json::String("21.5".into()))])];
        assert_eq!(infer_column_type("temp", &rows), DataType::Float64);
    }

    #[test]
    fn non_numeric_string_columns_stay_utf8() {
        let rows = vec![row(&[("state", Json::String("ok".into()))])];
        assert_eq!(infer_column_type("state", &rows), DataType::Utf8);
    }

    #[test]
    fn type_is_inferred_from_first_non_null_value() {
        let rows = vec![row(&[("v", Json::Null)]), row(&[("v", Json::Bool(true))])];
        assert_eq!(infer_column_type("v", &rows), DataType::Boolean);
    }

    #[test]
    fn empty_response_exports_nothing() {
        let response = Response { rows: Vec::new() };
        let mut buf = Vec::new();
        export(&response, ExportFormat::Csv, &mut buf).unwrap();
        assert!(buf.is_empty());
    }
}
