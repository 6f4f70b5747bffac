use std::fs::File;
use std::path::Path;

use crate::error::{Result, TriageError};
use crate::model::SymptomRecord;

/// Normalized in-memory symptom table. Row order is load order; the index of
/// a record is the row id used by the embedding matrix and the matcher.
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Vec<SymptomRecord>,
}

impl Dataset {
    /// Loads a CSV with `text` and `label` columns. Header names are matched
    /// case-insensitively after trimming. Rows whose `text` is missing or
    /// blank are dropped; everything else keeps its relative order.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        let text_col = find_column(&headers, "text").ok_or(TriageError::MissingColumn("text"))?;
        let label_col =
            find_column(&headers, "label").ok_or(TriageError::MissingColumn("label"))?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let text = row.get(text_col).unwrap_or("").trim();
            if text.is_empty() {
                continue;
            }
            let label = row.get(label_col).unwrap_or("").trim();
            records.push(SymptomRecord {
                text: text.to_string(),
                label: label.to_string(),
            });
        }

        Ok(Self { records })
    }

    pub fn records(&self) -> &[SymptomRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.label.clone()).collect()
    }
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}
