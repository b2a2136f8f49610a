//! Confidence scoring for skill selection.
//!
//! Pure over `(descriptor, query)`: no I/O, no state, so the planner's
//! selection is deterministic and testable in isolation.

use regex::Regex;
use tracing::debug;

use crate::skill::SkillDescriptor;

/// Confidence for an exact keyword substring match.
pub const KEYWORD_CONFIDENCE: f64 = 0.9;
/// Confidence for a regex pattern match.
pub const PATTERN_CONFIDENCE: f64 = 0.8;
/// Confidence when nothing matches.
pub const NO_MATCH: f64 = 0.0;

/// Score a query against a skill's keywords and patterns.
///
/// Keyword containment is checked case-insensitively; patterns are
/// applied as written, so authors control their own case handling.
/// Invalid patterns are skipped rather than scored.
pub fn keyword_confidence(descriptor: &SkillDescriptor, query: &str) -> f64 {
    let query_lower = query.to_lowercase();
    for keyword in &descriptor.keywords {
        if !keyword.is_empty() && query_lower.contains(&keyword.to_lowercase()) {
            return KEYWORD_CONFIDENCE;
        }
    }

    for pattern in &descriptor.patterns {
        match Regex::new(pattern) {
            Ok(re) => {
                if re.is_match(query) {
                    return PATTERN_CONFIDENCE;
                }
            }
            Err(e) => {
                debug!(
                    skill = %descriptor.name,
                    pattern = %pattern,
                    error = %e,
                    "Skipping invalid skill pattern"
                );
            }
        }
    }

    NO_MATCH
}
