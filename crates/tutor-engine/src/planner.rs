//! Step selection.
//!
//! The planner reads a session and a directive and decides which step comes
//! next and whether the learner stays in the concept, digresses into a
//! prerequisite, resumes a suspended concept or starts a new one. It never
//! mutates the session; the caller applies the returned [`Plan`].

use crate::concept_graph::{Concept, ConceptGraph, ConceptId, Step, StepKind};
use crate::error::{Result, TutorError};
use crate::mastery::score_of;
use crate::pacing::Directive;
use crate::session::Session;

/// How the session's concept changes when a plan is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConceptMove {
    /// Same concept, same visit.
    Stay,
    /// Begin a fresh visit of the plan's concept.
    Start,
    /// Teach a prerequisite first.
    Digress {
        /// Push the current visit so it can be resumed later.
        suspend_current: bool,
        /// Concepts to push before entering, outermost first.
        pending: Vec<ConceptId>,
    },
    /// Pop the top of the stack and continue it.
    Resume,
}

/// The planner's decision for the next step.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Concept the step belongs to.
    pub concept_id: ConceptId,
    /// Step to emit.
    pub step: Step,
    /// Set when the step was already shown during the visit.
    pub rephrase: bool,
    /// Concept move to apply.
    pub concept_move: ConceptMove,
}

/// Picks steps from a concept graph.
#[derive(Debug, Clone, Copy)]
pub struct StepPlanner<'g> {
    graph: &'g ConceptGraph,
}

impl<'g> StepPlanner<'g> {
    /// Creates a planner over `graph`.
    #[must_use]
    pub const fn new(graph: &'g ConceptGraph) -> Self {
        Self { graph }
    }

    /// Plans the step that follows an evaluated reply.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the session has no valid
    /// current concept or step, and `TutorError::ExhaustedConcept` when
    /// `Advance` has nowhere left to go.
    pub fn next_step(&self, session: &Session, directive: Directive) -> Result<Plan> {
        let (concept, current) = self.position(session)?;
        let plan = match directive {
            Directive::Deepen => Ok(Self::deepen(session, concept, current)),
            Directive::Hold => Ok(Self::hold(session, concept, current)),
            Directive::Simplify => self.simplify(session, concept, current),
            Directive::Advance => self.advance(session, concept, current),
        }?;

        tracing::debug!(
            session_id = %session.id,
            %directive,
            concept = %plan.concept_id,
            step = %plan.step.id,
            rephrase = plan.rephrase,
            concept_move = ?plan.concept_move,
            "Planned next step"
        );
        Ok(plan)
    }

    /// Plans the step that follows a non-evaluated step (explain/example).
    ///
    /// `directive` is the pacing decision that led to the current step.
    /// After `Simplify` or `Hold` the next question is taken at or below the
    /// current difficulty; a harder one is used only when none exists there.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the session has no valid
    /// current concept or step.
    pub fn follow_on(&self, session: &Session, directive: Option<Directive>) -> Result<Plan> {
        let (concept, current) = self.position(session)?;
        let level = current.difficulty;

        if let Some(step) = concept
            .steps
            .iter()
            .find(|s| s.difficulty == level && s.id != current.id && !session.has_shown(&s.id))
        {
            return Ok(stay(concept, step, false));
        }

        if matches!(directive, Some(Directive::Simplify | Directive::Hold)) {
            if let Some(plan) = nearest_check(session, concept, level, |s| s.difficulty <= level) {
                return Ok(plan);
            }
        }

        nearest_check(session, concept, level, |_| true).ok_or_else(|| {
            TutorError::invalid_graph(format!("concept '{}' has no check question", concept.id))
        })
    }

    /// Plans the first step of a topic the learner asked for.
    ///
    /// A ready concept starts directly. Otherwise the learner is routed into
    /// the deepest unmet prerequisite and the path back up is stacked.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::UnknownConcept` if the concept is absent.
    pub fn enter_topic(&self, session: &Session, concept_id: &str) -> Result<Plan> {
        let concept = self.graph.get(concept_id)?;
        if self.graph.is_ready(concept_id, &session.mastery)? {
            return self.start(concept);
        }

        let mut path = self.graph.entry_path(concept_id, &session.mastery)?;
        let entry = path.pop().unwrap_or_else(|| concept.id.clone());
        tracing::info!(
            session_id = %session.id,
            requested = %concept_id,
            entry = %entry,
            "Topic not ready, starting with prerequisite"
        );
        self.digress(&entry, false, path)
    }

    // ------------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------------

    fn deepen(session: &Session, concept: &Concept, current: &Step) -> Plan {
        let level = current.difficulty;
        let mut harder = concept.steps.iter().filter(|s| s.difficulty > level);

        if let Some(step) = harder.clone().find(|s| !session.has_shown(&s.id)) {
            return stay(concept, step, false);
        }
        match harder.next() {
            Some(step) => stay(concept, step, true),
            None => stay(concept, current, true),
        }
    }

    fn hold(session: &Session, concept: &Concept, current: &Step) -> Plan {
        let same_level: Vec<&Step> = concept
            .steps
            .iter()
            .filter(|s| s.difficulty == current.difficulty && s.id != current.id)
            .collect();
        let examples = same_level.iter().filter(|s| s.kind == StepKind::Example);

        if let Some(step) = examples.clone().find(|s| !session.has_shown(&s.id)) {
            return stay(concept, step, false);
        }
        if let Some(step) = examples.clone().next() {
            return stay(concept, step, true);
        }
        if let Some(step) = same_level.iter().find(|s| !session.has_shown(&s.id)) {
            return stay(concept, step, false);
        }
        if let Some(step) = same_level.first() {
            return stay(concept, step, true);
        }
        stay(concept, current, true)
    }

    fn simplify(&self, session: &Session, concept: &Concept, current: &Step) -> Result<Plan> {
        let lower_level = concept
            .steps
            .iter()
            .map(|s| s.difficulty)
            .filter(|&d| d < current.difficulty)
            .max();

        if let Some(level) = lower_level {
            let mut easier = concept.steps.iter().filter(|s| s.difficulty == level);
            if let Some(step) = easier.clone().find(|s| !session.has_shown(&s.id)) {
                return Ok(stay(concept, step, false));
            }
            if let Some(step) = easier.next() {
                return Ok(stay(concept, step, true));
            }
        }

        let weakest = concept.prerequisites.iter().min_by(|a, b| {
            score_of(&session.mastery, a).total_cmp(&score_of(&session.mastery, b))
        });

        if let Some(prerequisite) = weakest {
            let mut path = self.graph.entry_path(prerequisite, &session.mastery)?;
            let entry = path.pop().unwrap_or_else(|| prerequisite.clone());
            return self.digress(&entry, true, path);
        }

        match concept.first_step() {
            Some(step) => Ok(stay(concept, step, session.has_shown(&step.id))),
            None => Ok(stay(concept, current, true)),
        }
    }

    fn advance(&self, session: &Session, concept: &Concept, current: &Step) -> Result<Plan> {
        if let Some(top) = session.stack.last() {
            if self.graph.is_ready(&top.concept_id, &session.mastery)? {
                let suspended = self.graph.get(&top.concept_id)?;
                let resumed = top
                    .step_id
                    .as_deref()
                    .and_then(|id| suspended.step(id))
                    .or_else(|| suspended.first_step())
                    .ok_or_else(|| TutorError::exhausted(&suspended.id))?;
                return Ok(Plan {
                    concept_id: suspended.id.clone(),
                    step: resumed.clone(),
                    rephrase: top.shown.iter().any(|s| *s == resumed.id),
                    concept_move: ConceptMove::Resume,
                });
            }

            let mut path = self.graph.entry_path(&top.concept_id, &session.mastery)?;
            let entry = path.pop().unwrap_or_else(|| top.concept_id.clone());
            let pending = path.into_iter().skip(1).collect();
            return self.digress(&entry, false, pending);
        }

        if let Some(next) = self.graph.next_ready(&concept.id, &session.mastery)? {
            return self.start(next);
        }

        let mut harder_checks = concept
            .steps
            .iter()
            .filter(|s| s.kind.is_evaluated() && s.difficulty > current.difficulty);
        if let Some(step) = harder_checks.clone().find(|s| !session.has_shown(&s.id)) {
            return Ok(stay(concept, step, false));
        }
        if let Some(step) = harder_checks.next() {
            return Ok(stay(concept, step, true));
        }

        Err(TutorError::exhausted(&concept.id))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn position(&self, session: &Session) -> Result<(&'g Concept, &'g Step)> {
        let concept_id = session
            .current_concept
            .as_deref()
            .ok_or_else(|| TutorError::unknown_concept("<none>"))?;
        let concept = self.graph.get(concept_id)?;
        let step = session
            .current_step
            .as_deref()
            .and_then(|id| concept.step(id))
            .ok_or_else(|| TutorError::unknown_concept(concept_id))?;
        Ok((concept, step))
    }

    fn start(&self, concept: &Concept) -> Result<Plan> {
        let step = concept
            .first_step()
            .ok_or_else(|| TutorError::exhausted(&concept.id))?;
        Ok(Plan {
            concept_id: concept.id.clone(),
            step: step.clone(),
            rephrase: false,
            concept_move: ConceptMove::Start,
        })
    }

    fn digress(
        &self,
        concept_id: &str,
        suspend_current: bool,
        pending: Vec<ConceptId>,
    ) -> Result<Plan> {
        let concept = self.graph.get(concept_id)?;
        let step = concept
            .first_step()
            .ok_or_else(|| TutorError::exhausted(&concept.id))?;
        Ok(Plan {
            concept_id: concept.id.clone(),
            step: step.clone(),
            rephrase: false,
            concept_move: ConceptMove::Digress {
                suspend_current,
                pending,
            },
        })
    }
}

/// Closest check question to `level` among those `within` accepts, unshown
/// first, then shown as a rephrase.
fn nearest_check<F>(session: &Session, concept: &Concept, level: u32, within: F) -> Option<Plan>
where
    F: Fn(&Step) -> bool,
{
    let nearest = |unshown: bool| {
        concept
            .steps
            .iter()
            .filter(|s| s.kind.is_evaluated() && within(s) && session.has_shown(&s.id) != unshown)
            .min_by_key(|s| (s.difficulty.abs_diff(level), s.difficulty < level))
    };

    nearest(true)
        .map(|step| stay(concept, step, false))
        .or_else(|| nearest(false).map(|step| stay(concept, step, true)))
}

fn stay(concept: &Concept, step: &Step, rephrase: bool) -> Plan {
    Plan {
        concept_id: concept.id.clone(),
        step: step.clone(),
        rephrase,
        concept_move: ConceptMove::Stay,
    }
}
