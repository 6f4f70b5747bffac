use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::engine::MatchEngine;
use crate::error::Result;

/// One scripted query with its expectation. `expected_label: None` means
/// the case expects the matcher to stay below the reply threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub query: String,
    pub expected_label: Option<String>,
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    /// Label the matcher settled on, `None` when the score stayed below the
    /// threshold.
    pub matched_label: Option<String>,
    pub score: f32,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

fn case_passes(case: &EvalCase, matched_label: Option<&str>, score: f32) -> bool {
    match (&case.expected_label, matched_label) {
        (Some(expected), Some(actual)) if expected == actual => {
            case.min_score.is_none_or(|min| score >= min)
        }
        (None, None) => true,
        _ => false,
    }
}

/// Runs every case through the engine with the caller's reply threshold and
/// tallies a pass rate.
pub fn evaluate_cases(
    engine: &MatchEngine,
    cases: &[EvalCase],
    threshold: f32,
) -> Result<EvalSummary> {
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let start = Instant::now();
        let matched = engine.match_query(&case.query)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let matched_label = (matched.score >= threshold).then_some(matched.label);
        let passed = case_passes(case, matched_label.as_deref(), matched.score);

        outcomes.push(EvalOutcome {
            case_id: case.case_id.clone(),
            passed,
            matched_label,
            score: matched.score,
            latency_ms,
        });
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total.saturating_sub(passed);
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    Ok(EvalSummary {
        total,
        passed,
        failed,
        pass_rate,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use std::io::Write;

    fn engine() -> MatchEngine {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("symptoms.csv");
        let mut file = std::fs::File::create(&csv_path).expect("create csv");
        file.write_all(b"text,label\nfever and chills,Flu\nitchy rash,Allergy\n")
            .expect("write csv");

        MatchEngine::bootstrap(
            Box::new(HashEmbeddingProvider::new(128)),
            &csv_path,
            &dir.path().join("cache"),
        )
        .expect("bootstrap")
    }

    fn case(id: &str, query: &str, expected: Option<&str>) -> EvalCase {
        EvalCase {
            case_id: id.to_string(),
            query: query.to_string(),
            expected_label: expected.map(str::to_string),
            min_score: None,
        }
    }

    #[test]
    fn expected_label_passes_on_confident_match() {
        let summary = evaluate_cases(
            &engine(),
            &[case("c1", "fever and chills", Some("Flu"))],
            0.55,
        )
        .unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.passed, 1);
        assert!((summary.pass_rate - 1.0).abs() < 1e-6);
    }

    #[test]
    fn below_threshold_matches_a_none_expectation() {
        let summary = evaluate_cases(
            &engine(),
            &[case("c1", "completely unrelated nonsense", None)],
            0.55,
        )
        .unwrap();

        assert_eq!(summary.passed, 1);
        assert!(summary.outcomes[0].matched_label.is_none());
    }

    #[test]
    fn wrong_label_fails_the_case() {
        let summary = evaluate_cases(
            &engine(),
            &[case("c1", "fever and chills", Some("Allergy"))],
            0.55,
        )
        .unwrap();

        assert_eq!(summary.failed, 1);
        assert!(!summary.outcomes[0].passed);
    }

    #[test]
    fn min_score_is_enforced() {
        let mut strict = case("c1", "fever and chills", Some("Flu"));
        strict.min_score = Some(0.999);
        let summary = evaluate_cases(&engine(), &[strict], 0.55).unwrap();
        assert_eq!(summary.passed, 1);

        let mut too_strict = case("c2", "fever and aches", Some("Flu"));
        too_strict.min_score = Some(0.999);
        let summary = evaluate_cases(&engine(), &[too_strict], 0.0).unwrap();
        assert_eq!(summary.failed, 1);
    }
}
