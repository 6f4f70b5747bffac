use serde::{Deserialize, Serialize};

/// One row of the symptom corpus. The position of a record in the dataset is
/// its row id; embedding matrix rows are aligned to it 1:1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomRecord {
    pub text: String,
    pub label: String,
}

/// Best corpus row for a query, before any confidence gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    pub score: f32,
    pub index: usize,
    pub label: String,
}

/// Composed reply plus the raw confidence for the caller to interpret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub reply: String,
    pub confidence: f32,
    pub label: String,
}
