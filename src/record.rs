//! Output types: extracted records and extraction statistics.
//!
//! A [`Record`] is one table row as a header-keyed mapping. Key order is the
//! header order of the table the row came from — `serde_json` is built with
//! `preserve_order` so that order survives serialization into the
//! `output.json` interchange artifact. Record order across the whole
//! document is page-order then row-order; downstream consumers treat it as
//! chronological transaction order, so nothing in this crate may reorder it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One extracted table row: column header → cell text.
///
/// Values are always strings (a blank cell is the empty string), matching
/// the flat-object shape of the interchange artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: serde_json::Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell under `header`. A repeated header overwrites the
    /// earlier cell, mirroring how a flat JSON object would collapse it.
    pub fn insert(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(header.into(), Value::String(value.into()));
    }

    /// Cell text for `header`, if present and a string.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).and_then(Value::as_str)
    }

    /// Column headers in insertion (header) order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (header, value) in iter {
            record.insert(header, value);
        }
        record
    }
}

/// Counters describing one extraction pass over a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages scanned, including pages that held no table.
    pub pages: usize,
    /// Tables detected across all pages.
    pub tables: usize,
    /// Records produced.
    pub records: usize,
    /// Rows dropped because their cell count did not match their header row.
    pub skipped_rows: usize,
    /// Wall-clock duration of the extraction stage.
    pub duration_ms: u64,
}

/// Finalized result of the extraction stage: the full record sequence in
/// page-then-row order, plus counters for logging and job snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub records: Vec<Record>,
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_header_order() {
        let mut r = Record::new();
        r.insert("Receipt No.", "ABC123");
        r.insert("Completion Time", "2024-01-05 10:22:01");
        r.insert("Paid In", "");
        r.insert("Withdrawn", "1,200.00");

        let headers: Vec<&str> = r.headers().collect();
        assert_eq!(
            headers,
            vec!["Receipt No.", "Completion Time", "Paid In", "Withdrawn"]
        );
    }

    #[test]
    fn serializes_as_flat_object_in_order() {
        let r: Record = [
            ("Date".to_string(), "2024-02-01".to_string()),
            ("Amount".to_string(), "42.50".to_string()),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"Date":"2024-02-01","Amount":"42.50"}"#);
    }

    #[test]
    fn duplicate_header_keeps_last_cell() {
        let mut r = Record::new();
        r.insert("Amount", "1.00");
        r.insert("Amount", "2.00");
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("Amount"), Some("2.00"));
    }

    #[test]
    fn deserializes_from_interchange_shape() {
        let r: Record =
            serde_json::from_str(r#"{"Details":"KPLC PREPAID","Paid In":""}"#).unwrap();
        assert_eq!(r.get("Details"), Some("KPLC PREPAID"));
        assert_eq!(r.get("Paid In"), Some(""));
        assert_eq!(r.get("Withdrawn"), None);
    }
}
