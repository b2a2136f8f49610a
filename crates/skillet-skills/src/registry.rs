//! Write-once skill registry.
//!
//! Skills are registered through an explicit builder at startup and the
//! resulting registry is immutable, so concurrent sessions can read it
//! without synchronization and registration order never surprises.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use skillet_core::Error;

use crate::skill::{Skill, SkillDescriptor};

/// Builder collecting the startup skill list.
#[derive(Default)]
pub struct SkillRegistryBuilder {
    skills: Vec<Arc<dyn Skill>>,
}

impl SkillRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one skill.
    pub fn register(mut self, skill: Arc<dyn Skill>) -> Self {
        self.skills.push(skill);
        self
    }

    /// Add a batch of skills, preserving order.
    pub fn register_all<I>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Skill>>,
    {
        self.skills.extend(skills);
        self
    }

    /// Finalize the registry. Duplicate names are a configuration error.
    pub fn build(self) -> Result<SkillRegistry, Error> {
        let mut skills = HashMap::with_capacity(self.skills.len());
        let mut names = Vec::with_capacity(self.skills.len());

        for skill in self.skills {
            let name = skill.descriptor().name;
            if skills.insert(name.clone(), skill).is_some() {
                return Err(Error::config(format!("duplicate skill name: {name}")));
            }
            debug!(skill = %name, "Registered skill");
            names.push(name);
        }
        names.sort();

        info!(count = names.len(), "Skill registry built");
        Ok(SkillRegistry { skills, names })
    }
}

/// Immutable mapping from skill name to skill.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    /// Sorted names, fixing the iteration order.
    names: Vec<String>,
}

impl SkillRegistry {
    /// Start building a registry.
    pub fn builder() -> SkillRegistryBuilder {
        SkillRegistryBuilder::new()
    }

    /// Look up a skill by exact name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.skills.get(name).cloned()
    }

    /// Whether a skill with this exact name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// Look up a skill by exact name, then by case-insensitive
    /// containment in either direction.
    ///
    /// Planning LLMs occasionally return near-miss names like
    /// `"weather_query"` for `"weather"`; fuzzy resolution keeps those
    /// plans usable. Ties go to the lexically first name.
    pub fn resolve(&self, requested: &str) -> Option<Arc<dyn Skill>> {
        if let Some(skill) = self.get(requested) {
            return Some(skill);
        }

        let requested_lower = requested.to_lowercase();
        for name in &self.names {
            let name_lower = name.to_lowercase();
            if name_lower.contains(&requested_lower) || requested_lower.contains(&name_lower) {
                debug!(requested = %requested, resolved = %name, "Fuzzy-matched skill name");
                return self.skills.get(name).cloned();
            }
        }
        None
    }

    /// Registered names, sorted.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Descriptors of every skill, in name order.
    pub fn descriptors(&self) -> Vec<SkillDescriptor> {
        self.names
            .iter()
            .filter_map(|name| self.skills.get(name))
            .map(|skill| skill.descriptor())
            .collect()
    }

    /// Iterate over the skills in name order.
    pub fn iter(&self) -> impl Iterator<Item = Arc<dyn Skill>> + '_ {
        self.names
            .iter()
            .filter_map(|name| self.skills.get(name).cloned())
    }

    /// Number of registered skills.
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// Whether no skills are registered.
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Map;
    use skillet_core::ErrorKind;

    use crate::context::SkillContext;
    use crate::skill::SkillOutput;

    struct NamedSkill {
        name: &'static str,
    }

    #[async_trait]
    impl Skill for NamedSkill {
        fn descriptor(&self) -> SkillDescriptor {
            SkillDescriptor::new(self.name, "test skill")
        }

        async fn execute(
            &self,
            _query: &str,
            _args: &Map<String, serde_json::Value>,
            _ctx: &SkillContext,
        ) -> Result<SkillOutput, Error> {
            Ok(SkillOutput::text(self.name))
        }
    }

    fn registry_of(names: &[&'static str]) -> SkillRegistry {
        let mut builder = SkillRegistry::builder();
        for name in names {
            builder = builder.register(Arc::new(NamedSkill { name }));
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_build_and_lookup() {
        let registry = registry_of(&["weather", "travel", "direct_answer"]);

        assert_eq!(registry.len(), 3);
        assert!(registry.contains("weather"));
        assert!(registry.get("weather").is_some());
        assert!(registry.get("missing").is_none());
        // Sorted name order.
        assert_eq!(registry.names(), &["direct_answer", "travel", "weather"]);
    }

    #[test]
    fn test_duplicate_name_is_config_error() {
        let result = SkillRegistry::builder()
            .register(Arc::new(NamedSkill { name: "weather" }))
            .register(Arc::new(NamedSkill { name: "weather" }))
            .build();

        let err = result.err().unwrap();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_resolve_exact_then_fuzzy() {
        let registry = registry_of(&["weather", "travel"]);

        // Exact match first.
        assert_eq!(
            registry.resolve("weather").unwrap().descriptor().name,
            "weather"
        );
        // LLM-style near misses.
        assert_eq!(
            registry.resolve("weather_query").unwrap().descriptor().name,
            "weather"
        );
        assert_eq!(registry.resolve("Travel").unwrap().descriptor().name, "travel");
        assert!(registry.resolve("geocode").is_none());
    }

    #[test]
    fn test_descriptors_follow_name_order() {
        let registry = registry_of(&["travel", "weather", "knowledge"]);
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["knowledge", "travel", "weather"]);
    }
}
