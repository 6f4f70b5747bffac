/// Inclusive lower bound of the high-confidence tier.
pub const HIGH_CONFIDENCE: f32 = 0.85;
/// Inclusive lower bound of the medium-confidence tier.
pub const MEDIUM_CONFIDENCE: f32 = 0.65;
/// Below this score the interactive loop does not compose a reply at all.
/// The HTTP API ignores it and always composes; callers own the cutoff.
pub const DEFAULT_REPLY_THRESHOLD: f32 = 0.55;

pub const CONSULT_DISCLAIMER: &str = "Please consult a doctor for confirmation.";

/// Templated reply for a matched label. Pure; the tier only changes the tone
/// of the first sentence, and the disclaimer is always appended.
pub fn compose(label: &str, score: f32) -> String {
    let lead = if score >= HIGH_CONFIDENCE {
        format!("That closely matches {label} based on your description.")
    } else if score >= MEDIUM_CONFIDENCE {
        format!("It sounds similar to {label} from what you described.")
    } else {
        format!("It may be {label}, but I'm not very confident about this match.")
    };

    format!("{lead}\n\n{CONSULT_DISCLAIMER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_tier_names_the_label_and_disclaims() {
        let reply = compose("Flu", 0.9);
        assert!(reply.contains("Flu"));
        assert!(reply.contains("closely matches"));
        assert!(reply.contains(CONSULT_DISCLAIMER));
    }

    #[test]
    fn low_tier_hedges_and_still_disclaims() {
        let reply = compose("Allergy", 0.3);
        assert!(reply.contains("Allergy"));
        assert!(reply.contains("not very confident"));
        assert!(reply.contains(CONSULT_DISCLAIMER));
    }

    #[test]
    fn tier_boundaries_are_inclusive() {
        assert!(compose("Flu", HIGH_CONFIDENCE).contains("closely matches"));
        assert!(compose("Flu", MEDIUM_CONFIDENCE).contains("sounds similar"));
    }

    #[test]
    fn just_below_a_boundary_drops_a_tier() {
        assert!(compose("Flu", 0.8499).contains("sounds similar"));
        assert!(compose("Flu", 0.6499).contains("not very confident"));
    }
}
