//! Concept bank loading and the prerequisite graph.
//!
//! The concept graph is static curriculum data: concepts, their ordered
//! prerequisites, and the teaching steps inside each concept. It is validated
//! once at construction (acyclic, no dangling edges, sane thresholds) and is
//! read-only afterwards.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::mastery::{score_of, MasteryMap};

/// Maximum allowed concept bank file size in bytes (1MB).
pub const MAX_CONCEPT_BANK_SIZE: u64 = 1024 * 1024;

/// Mastery threshold used when a concept does not declare one.
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.7;

/// Identifier of a concept within the graph.
pub type ConceptId = String;

/// Identifier of a step; unique across the whole graph.
pub type StepId = String;

const fn default_mastery_threshold() -> f64 {
    DEFAULT_MASTERY_THRESHOLD
}

// ============================================================================
// Step
// ============================================================================

/// The pedagogical role of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Introduces or re-explains an idea.
    Explain,
    /// Works through a concrete example.
    Example,
    /// Asks the learner something; the only kind that is evaluated.
    CheckQuestion,
}

impl StepKind {
    /// Returns `true` if the learner's reply to this step is evaluated.
    #[must_use]
    pub const fn is_evaluated(&self) -> bool {
        matches!(self, Self::CheckQuestion)
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explain => write!(f, "explain"),
            Self::Example => write!(f, "example"),
            Self::CheckQuestion => write!(f, "check_question"),
        }
    }
}

/// One atomic teaching action inside a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step identifier.
    pub id: StepId,

    /// Owning concept. May be omitted in the bank; it is filled from the parent.
    #[serde(default)]
    pub concept_id: ConceptId,

    /// What kind of move this step is.
    pub kind: StepKind,

    /// Difficulty rank, ascending within the concept.
    pub difficulty: u32,

    /// Opaque payload handed to the rendering collaborator.
    #[serde(default)]
    pub content: serde_json::Value,

    /// Answer signature used only by response classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
}

// ============================================================================
// Concept
// ============================================================================

/// A teachable unit of knowledge with prerequisites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    /// Concept identifier.
    pub id: ConceptId,

    /// Display name shown to learners.
    pub name: String,

    /// Concepts that must be mastered first, in teaching order.
    #[serde(default)]
    pub prerequisites: Vec<ConceptId>,

    /// Teaching steps, sorted by difficulty once the graph is built.
    pub steps: Vec<Step>,

    /// Score at which the concept counts as understood.
    #[serde(default = "default_mastery_threshold")]
    pub mastery_threshold: f64,
}

impl Concept {
    /// Looks up a step of this concept by id.
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Returns the position of a step in difficulty order.
    #[must_use]
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    /// Returns the easiest step.
    #[must_use]
    pub fn first_step(&self) -> Option<&Step> {
        self.steps.first()
    }

    /// Returns the highest difficulty rank in the concept.
    #[must_use]
    pub fn max_difficulty(&self) -> u32 {
        self.steps.iter().map(|s| s.difficulty).max().unwrap_or(0)
    }
}

/// On-disk layout of a concept bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptBank {
    /// All concepts, in authoring order.
    pub concepts: Vec<Concept>,
}

// ============================================================================
// ConceptGraph
// ============================================================================

/// Validated, read-only prerequisite graph.
#[derive(Debug, Clone)]
pub struct ConceptGraph {
    concepts: Vec<Concept>,
    index: HashMap<ConceptId, usize>,
    topo: Vec<usize>,
}

impl ConceptGraph {
    /// Builds a graph from concepts, validating its structure.
    ///
    /// Steps are stably sorted by difficulty; a step with an empty
    /// `concept_id` inherits its parent's id.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidConceptGraph` if the bank is empty, ids are
    /// duplicated, a prerequisite is unknown, prerequisites form a cycle, a
    /// threshold is outside `[0, 1)`, or a concept has no check question.
    pub fn new(mut concepts: Vec<Concept>) -> Result<Self> {
        if concepts.is_empty() {
            return Err(TutorError::invalid_graph("concept bank has no concepts"));
        }

        let mut index = HashMap::with_capacity(concepts.len());
        for (i, concept) in concepts.iter().enumerate() {
            if index.insert(concept.id.clone(), i).is_some() {
                return Err(TutorError::invalid_graph(format!(
                    "duplicate concept id '{}'",
                    concept.id
                )));
            }
        }

        let mut step_ids = HashSet::new();
        for concept in &mut concepts {
            validate_concept(concept, &index, &mut step_ids)?;
            concept.steps.sort_by_key(|s| s.difficulty);
        }

        let topo = topological_sort(&concepts, &index)?;

        Ok(Self {
            concepts,
            index,
            topo,
        })
    }

    /// Parses a concept bank from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Json` for malformed JSON, or any error from [`ConceptGraph::new`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let bank: ConceptBank = serde_json::from_str(json)?;
        Self::new(bank.concepts)
    }

    /// Loads and validates a concept bank file.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConceptBankNotFound` if the file doesn't exist.
    /// Returns `TutorError::ConceptBankTooLarge` if the file exceeds 1MB.
    /// Returns `TutorError::ConceptBankEncodingError` if the file is not valid UTF-8.
    /// Returns `TutorError::Json` or `TutorError::InvalidConceptGraph` for bad content.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TutorError::concept_bank_not_found(path)
            } else {
                TutorError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_CONCEPT_BANK_SIZE {
            return Err(TutorError::concept_bank_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                TutorError::concept_bank_encoding(path)
            } else {
                TutorError::Io(e)
            }
        })?;

        let graph = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            concepts = graph.len(),
            "Loaded concept bank"
        );
        Ok(graph)
    }

    /// Replaces per-concept thresholds with configured overrides.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if an override names a missing
    /// concept, or `TutorError::InvalidConceptGraph` if a value is out of range.
    pub fn with_threshold_overrides(mut self, overrides: &HashMap<String, f64>) -> Result<Self> {
        for (concept_id, &threshold) in overrides {
            let i = *self
                .index
                .get(concept_id)
                .ok_or_else(|| TutorError::unknown_concept(concept_id))?;
            if !(0.0..1.0).contains(&threshold) {
                return Err(TutorError::invalid_graph(format!(
                    "threshold override for '{concept_id}' must be within [0, 1), got {threshold}"
                )));
            }
            self.concepts[i].mastery_threshold = threshold;
        }
        Ok(self)
    }

    /// Number of concepts in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Returns `true` if the graph has no concepts (never true once built).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Returns `true` if the concept exists.
    #[must_use]
    pub fn contains(&self, concept_id: &str) -> bool {
        self.index.contains_key(concept_id)
    }

    /// Looks up a concept.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn get(&self, concept_id: &str) -> Result<&Concept> {
        self.index
            .get(concept_id)
            .map(|&i| &self.concepts[i])
            .ok_or_else(|| TutorError::unknown_concept(concept_id))
    }

    /// Concepts in authoring order.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.iter()
    }

    /// Concepts ordered so that every prerequisite precedes its dependents.
    ///
    /// Ties are broken by authoring order.
    pub fn topological_order(&self) -> impl Iterator<Item = &Concept> {
        self.topo.iter().map(|&i| &self.concepts[i])
    }

    /// Ordered prerequisites of a concept.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn prerequisites_of(&self, concept_id: &str) -> Result<&[ConceptId]> {
        self.get(concept_id).map(|c| c.prerequisites.as_slice())
    }

    /// Concepts that list `concept_id` as a prerequisite, in topological order.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn dependents_of(&self, concept_id: &str) -> Result<Vec<&Concept>> {
        self.get(concept_id)?;
        Ok(self
            .topological_order()
            .filter(|c| c.prerequisites.iter().any(|p| p == concept_id))
            .collect())
    }

    /// Mastery threshold of a concept.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn threshold_of(&self, concept_id: &str) -> Result<f64> {
        self.get(concept_id).map(|c| c.mastery_threshold)
    }

    /// Returns `true` iff every prerequisite's score reaches that
    /// prerequisite's own threshold. Unvisited concepts count as 0.0.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn is_ready(&self, concept_id: &str, mastery: &MasteryMap) -> Result<bool> {
        for prerequisite in self.prerequisites_of(concept_id)? {
            if !self.is_mastered(prerequisite, mastery)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns `true` if the learner's score reaches the concept's threshold.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn is_mastered(&self, concept_id: &str, mastery: &MasteryMap) -> Result<bool> {
        let threshold = self.threshold_of(concept_id)?;
        Ok(score_of(mastery, concept_id) >= threshold)
    }

    /// Path from `concept_id` down to the concept that must be taught first.
    ///
    /// The first element is `concept_id`; each following element is the first
    /// unmet prerequisite of the previous one. The last element is ready. A
    /// ready concept yields a single-element path.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn entry_path(&self, concept_id: &str, mastery: &MasteryMap) -> Result<Vec<ConceptId>> {
        let mut path = vec![self.get(concept_id)?.id.clone()];
        loop {
            let current = path.last().map_or(concept_id, String::as_str);
            let mut unmet = None;
            for prerequisite in self.prerequisites_of(current)? {
                if !self.is_mastered(prerequisite, mastery)? {
                    unmet = Some(prerequisite.clone());
                    break;
                }
            }
            match unmet {
                Some(next) => path.push(next),
                None => return Ok(path),
            }
        }
    }

    /// The deepest unmet prerequisite of `concept_id`, or the concept itself
    /// when it is ready.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the id is absent.
    pub fn entry_point(&self, concept_id: &str, mastery: &MasteryMap) -> Result<ConceptId> {
        let mut path = self.entry_path(concept_id, mastery)?;
        Ok(path.pop().unwrap_or_else(|| concept_id.to_string()))
    }

    /// Next unlocked concept the learner has not mastered yet.
    ///
    /// Dependents of `current` are preferred, then the rest of the graph in
    /// topological order. `current` itself is never returned.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if `current` is absent.
    pub fn next_ready(&self, current: &str, mastery: &MasteryMap) -> Result<Option<&Concept>> {
        let dependents = self.dependents_of(current)?;
        let candidates = dependents
            .into_iter()
            .chain(self.topological_order())
            .filter(|c| c.id != current);

        for concept in candidates {
            if !self.is_mastered(&concept.id, mastery)? && self.is_ready(&concept.id, mastery)? {
                return Ok(Some(concept));
            }
        }
        Ok(None)
    }

    /// Topic suggestions: ready, unmastered concepts first, in topological order.
    #[must_use]
    pub fn suggestions(&self, mastery: &MasteryMap, limit: usize) -> Vec<ConceptId> {
        let (ready, rest): (Vec<&Concept>, Vec<&Concept>) =
            self.topological_order().partition(|c| {
                self.is_ready(&c.id, mastery).unwrap_or(false)
                    && !self.is_mastered(&c.id, mastery).unwrap_or(true)
            });
        ready
            .into_iter()
            .chain(rest)
            .take(limit)
            .map(|c| c.id.clone())
            .collect()
    }
}

fn validate_concept(
    concept: &mut Concept,
    index: &HashMap<ConceptId, usize>,
    step_ids: &mut HashSet<StepId>,
) -> Result<()> {
    // Scores never reach 1.0, so a threshold of 1.0 could never be met.
    if !(0.0..1.0).contains(&concept.mastery_threshold) {
        return Err(TutorError::invalid_graph(format!(
            "concept '{}' has threshold {} outside [0, 1)",
            concept.id, concept.mastery_threshold
        )));
    }

    for prerequisite in &concept.prerequisites {
        if !index.contains_key(prerequisite) {
            return Err(TutorError::invalid_graph(format!(
                "concept '{}' requires unknown concept '{prerequisite}'",
                concept.id
            )));
        }
    }

    for step in &mut concept.steps {
        if step.concept_id.is_empty() {
            step.concept_id.clone_from(&concept.id);
        } else if step.concept_id != concept.id {
            return Err(TutorError::invalid_graph(format!(
                "step '{}' declares concept '{}' but is listed under '{}'",
                step.id, step.concept_id, concept.id
            )));
        }
        if !step_ids.insert(step.id.clone()) {
            return Err(TutorError::invalid_graph(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
    }

    if !concept.steps.iter().any(|s| s.kind.is_evaluated()) {
        return Err(TutorError::invalid_graph(format!(
            "concept '{}' has no check question",
            concept.id
        )));
    }

    Ok(())
}

/// Kahn's algorithm, preferring the lowest authoring index among ready nodes.
fn topological_sort(concepts: &[Concept], index: &HashMap<ConceptId, usize>) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; concepts.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); concepts.len()];

    for (i, concept) in concepts.iter().enumerate() {
        for prerequisite in &concept.prerequisites {
            if let Some(&p) = index.get(prerequisite) {
                in_degree[i] += 1;
                dependents[p].push(i);
            }
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(concepts.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < concepts.len() {
        let cycle: Vec<&str> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d > 0)
            .map(|(i, _)| concepts[i].id.as_str())
            .collect();
        return Err(TutorError::invalid_graph(format!(
            "prerequisite cycle among: {}",
            cycle.join(", ")
        )));
    }

    Ok(order)
}
