//! Source file reader.
//!
//! Accepts CSV with a header row (by `.csv` extension), a JSON array of
//! objects, or JSON Lines. Rows are passed through untouched. A row that
//! cannot be parsed becomes a record holding only [`MALFORMED_FIELD`]; the
//! loaders fail its key normalisation and report it per record.

use std::path::Path;

use anyhow::Context as _;
use dv_core::model::{MALFORMED_FIELD, Record};
use serde_json::Value;

pub fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
  let text = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  let is_csv = path
    .extension()
    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
  let records = if is_csv { parse_csv(&text) } else { parse_json(&text) };
  records.with_context(|| format!("failed to parse {}", path.display()))
}

/// Parse CSV. Every cell is a string; an empty cell is null.
pub fn parse_csv(text: &str) -> anyhow::Result<Vec<Record>> {
  let mut reader = csv::Reader::from_reader(text.as_bytes());
  let headers = reader.headers().context("missing CSV header row")?.clone();

  Ok(
    reader
      .records()
      .map(|row| match row {
        Ok(row) => headers
          .iter()
          .zip(row.iter())
          .map(|(name, cell)| {
            let value = if cell.is_empty() {
              Value::Null
            } else {
              Value::String(cell.to_owned())
            };
            (name.to_owned(), value)
          })
          .collect(),
        Err(err) => malformed(Value::String(err.to_string())),
      })
      .collect(),
  )
}

/// Parse a JSON array of objects or JSON Lines.
pub fn parse_json(text: &str) -> anyhow::Result<Vec<Record>> {
  if text.trim_start().starts_with('[') {
    let rows: Vec<Value> = serde_json::from_str(text)?;
    return Ok(rows.into_iter().map(into_record).collect());
  }

  Ok(
    text
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(|line| match serde_json::from_str(line) {
        Ok(value) => into_record(value),
        Err(_) => malformed(Value::String(line.to_owned())),
      })
      .collect(),
  )
}

fn into_record(value: Value) -> Record {
  match value {
    Value::Object(fields) => fields.into_iter().collect(),
    other => malformed(other),
  }
}

fn malformed(raw: Value) -> Record {
  tracing::warn!(%raw, "malformed source row");
  Record::from([(MALFORMED_FIELD.to_owned(), raw)])
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn reads_json_array() {
    let records = parse_json(r#"[{"customer_id": "C1"}, {"customer_id": "C2"}]"#).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["customer_id"], json!("C2"));
  }

  #[test]
  fn reads_json_lines() {
    let text = "{\"order_id\": \"O1\"}\n\n{\"order_id\": \"O2\", \"amount\": 3.5}\n";
    let records = parse_json(text).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["amount"], json!(3.5));
  }

  #[test]
  fn malformed_rows_are_kept() {
    let text = "{\"order_id\": \"O1\"}\nnot json\n42\n";
    let records = parse_json(text).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1][MALFORMED_FIELD], json!("not json"));
    assert_eq!(records[2][MALFORMED_FIELD], json!(42));
  }

  #[test]
  fn broken_array_is_an_error() {
    assert!(parse_json("[{\"a\": 1},").is_err());
  }

  #[test]
  fn reads_csv_with_empty_cells_as_null() {
    let text = "order_id,product_id,quantity\nORD-1,PROD-1,2\nORD-2,,1\n";
    let records = parse_csv(text).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["quantity"], json!("2"));
    assert_eq!(records[1]["product_id"], Value::Null);
  }

  #[test]
  fn ragged_csv_row_is_malformed() {
    let text = "payment_id,order_ref\nPAY-1,ORD-1\nPAY-2\n";
    let records = parse_csv(text).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[1].contains_key(MALFORMED_FIELD));
  }
}
