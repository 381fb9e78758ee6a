//! Dataset export as JSON or CSV

use crate::types::ConsolidatedDataset;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format '{}', expected json or csv", other)),
        }
    }
}

/// Dataset as a JSON document: stats plus an array of row objects whose
/// keys follow the column union order.
pub fn to_json(dataset: &ConsolidatedDataset) -> Value {
    let rows: Vec<Value> = dataset
        .rows
        .iter()
        .map(|row| {
            let mut object = Map::new();
            for column in &dataset.columns {
                let value = row.get(column).unwrap_or_default();
                object.insert(column.clone(), Value::String(value.to_string()));
            }
            Value::Object(object)
        })
        .collect();

    json!({
        "campaign_id": dataset.campaign_id,
        "created_at": dataset.created_at,
        "total_records": dataset.total_records,
        "duplicates_removed": dataset.duplicates_removed,
        "total_pages": dataset.total_pages,
        "iterations_merged": dataset.iterations_merged,
        "columns": dataset.columns,
        "rows": rows,
    })
}

/// Write the dataset as CSV with the column union as header
pub fn write_csv<W: Write>(dataset: &ConsolidatedDataset, writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        wtr.write_record(dataset.columns.iter().map(|c| row.get(c).unwrap_or_default()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv(dataset: &ConsolidatedDataset) -> csv::Result<String> {
    let mut buf = Vec::new();
    write_csv(dataset, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Row;
    use chrono::Utc;

    fn dataset() -> ConsolidatedDataset {
        ConsolidatedDataset {
            campaign_id: 7,
            columns: vec!["name".to_string(), "price".to_string()],
            rows: vec![
                Row::from_pairs([("name", "Widget, large"), ("price", "9.99")]),
                Row::from_pairs([("name", "Gadget")]),
            ],
            total_records: 2,
            duplicates_removed: 1,
            total_pages: 4,
            iterations_merged: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_csv_export_quotes_and_blanks() {
        let csv = to_csv(&dataset()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,price");
        assert_eq!(lines[1], "\"Widget, large\",9.99");
        assert_eq!(lines[2], "Gadget,");
    }

    #[test]
    fn test_json_export() {
        let value = to_json(&dataset());
        assert_eq!(value["total_records"], 2);
        assert_eq!(value["duplicates_removed"], 1);
        assert_eq!(value["rows"][1]["price"], "");
        assert_eq!(value["rows"][0]["name"], "Widget, large");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }
}
