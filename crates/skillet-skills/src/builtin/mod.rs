//! Built-in skills.
//!
//! Registration is explicit: [`standard`] lists the catalog in a fixed
//! order and callers feed it to a `SkillRegistryBuilder` at startup.

use std::sync::Arc;

use crate::skill::Skill;

mod direct_answer;
mod knowledge;
mod summarize;
mod travel;
mod weather;

pub use direct_answer::DirectAnswerSkill;
pub use knowledge::KnowledgeSkill;
pub use summarize::SummarizeSkill;
pub use travel::TravelSkill;
pub use weather::WeatherSkill;

/// The full built-in catalog, in registration order.
pub fn standard() -> Vec<Arc<dyn Skill>> {
    vec![
        Arc::new(WeatherSkill::new()),
        Arc::new(TravelSkill::new()),
        Arc::new(KnowledgeSkill::new()),
        Arc::new(SummarizeSkill::new()),
        Arc::new(DirectAnswerSkill::new()),
    ]
}
