//! Deterministic skill selection.
//!
//! The selector scores every registered skill against a query and picks
//! the winner by a fixed ordering. No randomness, no LLM: the same
//! query against the same registry always selects the same skill, which
//! is what keeps the planner's keyword pass reproducible.

use std::sync::Arc;

use skillet_skills::SkillRegistry;

/// One skill's score for a query.
#[derive(Debug, Clone)]
pub struct SkillScore {
    /// Skill name.
    pub name: String,
    /// Confidence in `[0, 1]` from the skill's own scoring.
    pub confidence: f64,
    /// Tie-break priority from the descriptor.
    pub priority: i32,
}

/// Scores skills and picks the best candidate for a query.
pub struct SkillSelector {
    registry: Arc<SkillRegistry>,
}

impl SkillSelector {
    /// Create a selector over a registry.
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        Self { registry }
    }

    /// Score every registered skill, in skill-name order.
    pub fn scores(&self, query: &str) -> Vec<SkillScore> {
        self.registry
            .iter()
            .map(|skill| {
                let descriptor = skill.descriptor();
                SkillScore {
                    confidence: skill.can_handle(query),
                    priority: descriptor.priority,
                    name: descriptor.name,
                }
            })
            .collect()
    }

    /// The winning candidate for a query.
    ///
    /// Ordering: highest confidence, then highest priority, then
    /// lexically smallest name. Returns `None` only for an empty
    /// registry; a zero-confidence winner is still returned and left
    /// for the caller to threshold.
    pub fn best(&self, query: &str) -> Option<SkillScore> {
        // scores() iterates in name order and the fold replaces only on
        // a strictly better candidate, so full ties keep the lexically
        // first name.
        self.scores(query).into_iter().reduce(|best, candidate| {
            let better = candidate.confidence > best.confidence
                || (candidate.confidence == best.confidence && candidate.priority > best.priority);
            if better {
                candidate
            } else {
                best
            }
        })
    }
}
