//! Topic resolution: learner text to concept id.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::concept_graph::{ConceptGraph, ConceptId};
use crate::config::Config;
use crate::error::{Result, TutorError};

/// Maps free text naming a topic to a concept.
pub trait TopicResolver: Send + Sync {
    /// Resolves `raw` to a concept id in `graph`.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownTopic` with suggestions when nothing matches.
    fn resolve(&self, raw: &str, graph: &ConceptGraph) -> Result<ConceptId>;
}

/// Resolver scoring concept ids and names with skim fuzzy matching.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyTopicResolver {
    min_score: i64,
    suggestion_count: usize,
}

impl Default for FuzzyTopicResolver {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl FuzzyTopicResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new(min_score: i64, suggestion_count: usize) -> Self {
        Self {
            min_score,
            suggestion_count,
        }
    }

    /// Creates a resolver from `topicMinScore` and `suggestionCount`.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self::new(config.topic_min_score, config.suggestion_count)
    }

    /// Concepts ranked by match score, best first. Zero-score concepts are dropped.
    fn rank(query: &str, graph: &ConceptGraph) -> Vec<(i64, ConceptId)> {
        let matcher = SkimMatcherV2::default();
        let score = |candidate: &str| {
            let candidate = candidate.to_lowercase();
            let forward = matcher.fuzzy_match(&candidate, query).unwrap_or(0);
            let backward = matcher.fuzzy_match(query, &candidate).unwrap_or(0);
            forward.max(backward)
        };

        let mut ranked: Vec<(i64, ConceptId)> = graph
            .topological_order()
            .map(|c| (score(&c.id).max(score(&c.name)), c.id.clone()))
            .filter(|(s, _)| *s > 0)
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked
    }
}

impl TopicResolver for FuzzyTopicResolver {
    fn resolve(&self, raw: &str, graph: &ConceptGraph) -> Result<ConceptId> {
        let query = raw.trim().to_lowercase();
        if query.is_empty() {
            return Err(TutorError::unknown_topic(
                raw,
                graph.suggestions(&crate::mastery::MasteryMap::new(), self.suggestion_count),
            ));
        }

        if let Some(concept) = graph
            .concepts()
            .find(|c| c.id.to_lowercase() == query || c.name.to_lowercase() == query)
        {
            return Ok(concept.id.clone());
        }

        let ranked = Self::rank(&query, graph);
        match ranked.first() {
            Some((score, id)) if *score >= self.min_score => {
                tracing::debug!(input = %raw, concept = %id, score, "Resolved topic");
                Ok(id.clone())
            }
            _ => {
                let suggestions = ranked
                    .into_iter()
                    .take(self.suggestion_count)
                    .map(|(_, id)| id)
                    .collect();
                Err(TutorError::unknown_topic(raw, suggestions))
            }
        }
    }
}
