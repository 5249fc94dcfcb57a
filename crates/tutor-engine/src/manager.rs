//! Turn processing.
//!
//! [`SessionManager`] owns the collaborators (graph, estimator, pacing,
//! classifier, resolver, sink) and drives a [`Session`] through its
//! lifecycle one learner input at a time.
//!
//! Every turn is a transaction: the manager works on a clone of the session
//! and writes it back only when the turn succeeds. Sink notifications are
//! sent after the commit, so observers never see output from a turn that
//! failed.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::classify::{KeywordClassifier, ResponseClassifier};
use crate::concept_graph::ConceptGraph;
use crate::config::Config;
use crate::error::{Result, TutorError};
use crate::mastery::{MasteryEstimator, ResponseSignal};
use crate::pacing::{Directive, EncouragementHint, PacingController};
use crate::planner::{Plan, StepPlanner};
use crate::resolve::{FuzzyTopicResolver, TopicResolver};
use crate::session::{Session, SessionState, SessionSummary};
use crate::turn::{NoopSink, TopicPrompt, TurnInstruction, TurnOutcome, TurnSink};

/// Message shown when the session falls back to topic selection.
pub const REDIRECT_MESSAGE: &str = "Let's pick something else!";

/// Message shown when a session opens.
pub const GREETING_MESSAGE: &str =
    "Hi! What would you like to learn today? If you're not sure, try one of these.";

/// Drives tutoring sessions.
pub struct SessionManager {
    graph: Arc<ConceptGraph>,
    estimator: MasteryEstimator,
    pacing: PacingController,
    idle_timeout: chrono::Duration,
    suggestion_count: usize,
    classifier: Arc<dyn ResponseClassifier>,
    resolver: Arc<dyn TopicResolver>,
    sink: Arc<dyn TurnSink>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("concepts", &self.graph.len())
            .field("estimator", &self.estimator)
            .field("pacing", &self.pacing)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager with the built-in classifier and resolver.
    #[must_use]
    pub fn new(graph: Arc<ConceptGraph>, config: &Config) -> Self {
        Self {
            graph,
            estimator: MasteryEstimator::new(config.learning_rate, config.history_window),
            pacing: PacingController::new(config.deepen_min_gain),
            idle_timeout: config.idle_timeout(),
            suggestion_count: config.suggestion_count,
            classifier: Arc::new(KeywordClassifier::from_config(config)),
            resolver: Arc::new(FuzzyTopicResolver::from_config(config)),
            sink: Arc::new(NoopSink),
        }
    }

    /// Replaces the response classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ResponseClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replaces the topic resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TopicResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Replaces the turn sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TurnSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The concept graph sessions are taught from.
    #[must_use]
    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// Creates an idle session.
    #[must_use]
    pub fn create_session(&self, learner_id: impl Into<String>) -> Session {
        let session = Session::new(learner_id);
        tracing::info!(session_id = %session.id, learner = %session.learner_id, "Session created");
        session
    }

    /// Opens an idle session with a greeting and topic suggestions.
    ///
    /// A session already waiting for a topic gets the greeting again.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionClosed` for an ended session and
    /// `TutorError::InvalidStateTransition` once teaching has started.
    pub fn open(&self, session: &mut Session) -> Result<TopicPrompt> {
        if session.state != SessionState::TopicSelection {
            session.transition(SessionState::TopicSelection)?;
        }
        Ok(TopicPrompt {
            message: GREETING_MESSAGE.to_string(),
            diagnostic: None,
            suggestions: self.graph.suggestions(&session.mastery, self.suggestion_count),
        })
    }

    /// Processes one learner input.
    ///
    /// In `Idle` or `TopicSelection` the input names a topic; in
    /// `AwaitingResponse` it answers the outstanding question. An exit phrase
    /// ends the session from any state.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionClosed` if the session already ended. On
    /// any error the session is left exactly as it was.
    pub fn submit_response(&self, session: &mut Session, raw: &str) -> Result<TurnOutcome> {
        if session.is_terminal() {
            return Err(TutorError::session_closed(&session.id));
        }

        let mut work = session.clone();
        let outcome = self.process(&mut work, raw)?;
        *session = work;
        self.publish(&session.id, &outcome);
        Ok(outcome)
    }

    /// Ends a session from any non-terminal state and returns its summary.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionClosed` if the session already ended.
    pub fn end_session(&self, session: &mut Session) -> Result<SessionSummary> {
        if session.is_terminal() {
            return Err(TutorError::session_closed(&session.id));
        }

        let mut work = session.clone();
        let summary = self.finish(&mut work)?;
        *session = work;
        self.sink.on_session_end(&session.id, &summary);
        Ok(summary)
    }

    /// Returns `true` if the session has been idle past the configured timeout.
    #[must_use]
    pub fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.is_expired(now, self.idle_timeout)
    }

    /// Rebuilds the instruction for the outstanding question, e.g. after a resume.
    #[must_use]
    pub fn pending_instruction(&self, session: &Session) -> Option<TurnInstruction> {
        if session.state != SessionState::AwaitingResponse {
            return None;
        }
        let concept = self.graph.get(session.current_concept.as_deref()?).ok()?;
        let step = concept.step(session.current_step.as_deref()?)?;
        Some(TurnInstruction {
            turn: session.turn,
            concept_id: concept.id.clone(),
            step: step.clone(),
            directive: None,
            encouragement: EncouragementHint::Neutral,
            rephrase: true,
            awaits_response: true,
        })
    }

    // ------------------------------------------------------------------------
    // Turn processing
    // ------------------------------------------------------------------------

    fn process(&self, work: &mut Session, raw: &str) -> Result<TurnOutcome> {
        work.turn = work.turn.saturating_add(1);
        work.touch();

        if self.classifier.wants_exit(raw) {
            tracing::info!(session_id = %work.id, "Learner asked to stop");
            return self.finish(work).map(TurnOutcome::Ended);
        }

        match work.state {
            SessionState::Idle => {
                work.transition(SessionState::TopicSelection)?;
                self.select_topic(work, raw)
            }
            SessionState::TopicSelection => self.select_topic(work, raw),
            SessionState::AwaitingResponse => self.evaluate(work, raw),
            SessionState::SessionEnd => Err(TutorError::session_closed(&work.id)),
            state @ (SessionState::Teaching | SessionState::Evaluating) => {
                Err(TutorError::invalid_transition(state, SessionState::Evaluating))
            }
        }
    }

    fn select_topic(&self, work: &mut Session, raw: &str) -> Result<TurnOutcome> {
        let concept_id = match self.resolver.resolve(raw, &self.graph) {
            Ok(id) => id,
            Err(e) if e.is_recoverable() => return self.redirect(work, &e),
            Err(e) => return Err(e),
        };

        let plan = match StepPlanner::new(&self.graph).enter_topic(work, &concept_id) {
            Ok(plan) => plan,
            Err(e) if e.is_recoverable() => return self.redirect(work, &e),
            Err(e) => return Err(e),
        };

        tracing::info!(
            session_id = %work.id,
            topic = %concept_id,
            entry = %plan.concept_id,
            "Topic selected"
        );

        work.stack.clear();
        work.transition(SessionState::Teaching)?;
        let instructions = self.teach(work, plan, None)?;
        Ok(TurnOutcome::Taught {
            directive: None,
            signal: None,
            instructions,
        })
    }

    fn evaluate(&self, work: &mut Session, raw: &str) -> Result<TurnOutcome> {
        work.transition(SessionState::Evaluating)?;

        let (concept_id, step) = match self.current_step(work) {
            Ok(position) => position,
            Err(e) if e.is_recoverable() => return self.redirect(work, &e),
            Err(e) => return Err(e),
        };

        let signal = self
            .classifier
            .classify(raw, &step)
            .unwrap_or(ResponseSignal::Unclear);
        let previous = work
            .mastery
            .get(&concept_id)
            .cloned()
            .unwrap_or_else(|| self.estimator.fresh_score());
        let updated = self.estimator.update(&previous, signal);
        let threshold = self.graph.threshold_of(&concept_id)?;
        let directive = self.pacing.decide(&updated, threshold);

        tracing::info!(
            session_id = %work.id,
            turn = work.turn,
            concept = %concept_id,
            step = %step.id,
            %signal,
            score = updated.value(),
            %directive,
            "Response evaluated"
        );
        work.mastery.insert(concept_id, updated);

        let plan = match StepPlanner::new(&self.graph).next_step(work, directive) {
            Ok(plan) => plan,
            Err(e) if e.is_recoverable() => return self.redirect(work, &e),
            Err(e) => return Err(e),
        };

        work.transition(SessionState::Teaching)?;
        let instructions = self.teach(work, plan, Some(directive))?;
        Ok(TurnOutcome::Taught {
            directive: Some(directive),
            signal: Some(signal),
            instructions,
        })
    }

    /// Emits the planned step and follows on until a question is outstanding.
    fn teach(
        &self,
        work: &mut Session,
        plan: Plan,
        directive: Option<Directive>,
    ) -> Result<Vec<TurnInstruction>> {
        let planner = StepPlanner::new(&self.graph);
        let mut instructions = Vec::new();
        let pacing = directive;
        let mut plan = plan;
        let mut directive = directive;

        loop {
            work.apply_plan(&plan);
            let awaits_response = plan.step.kind.is_evaluated();
            instructions.push(TurnInstruction {
                turn: work.turn,
                concept_id: plan.concept_id,
                step: plan.step,
                directive,
                encouragement: directive.map_or(EncouragementHint::Neutral, Into::into),
                rephrase: plan.rephrase,
                awaits_response,
            });

            if awaits_response {
                work.transition(SessionState::AwaitingResponse)?;
                return Ok(instructions);
            }

            plan = planner.follow_on(work, pacing)?;
            directive = None;
        }
    }

    fn redirect(&self, work: &mut Session, cause: &TutorError) -> Result<TurnOutcome> {
        if work.state != SessionState::TopicSelection {
            work.transition(SessionState::TopicSelection)?;
        }

        let suggestions = match cause {
            TutorError::UnknownTopic { suggestions, .. } if !suggestions.is_empty() => {
                suggestions.clone()
            }
            _ => self.graph.suggestions(&work.mastery, self.suggestion_count),
        };

        tracing::info!(
            session_id = %work.id,
            turn = work.turn,
            reason = %cause,
            "Redirecting to topic selection"
        );

        Ok(TurnOutcome::TopicPrompt(TopicPrompt {
            message: REDIRECT_MESSAGE.to_string(),
            diagnostic: Some(cause.to_string()),
            suggestions,
        }))
    }

    fn finish(&self, work: &mut Session) -> Result<SessionSummary> {
        work.transition(SessionState::SessionEnd)?;
        let summary = work.summarize(&self.graph, Utc::now());
        work.summary = Some(summary.clone());
        tracing::info!(
            session_id = %work.id,
            turns = summary.turns,
            concepts = summary.concepts.len(),
            mastered = summary.mastered_count(),
            "Session ended"
        );
        Ok(summary)
    }

    fn current_step(&self, work: &Session) -> Result<(String, crate::concept_graph::Step)> {
        let concept_id = work
            .current_concept
            .as_deref()
            .ok_or_else(|| TutorError::unknown_concept("<none>"))?;
        let concept = self.graph.get(concept_id)?;
        let step = work
            .current_step
            .as_deref()
            .and_then(|id| concept.step(id))
            .ok_or_else(|| TutorError::unknown_concept(concept_id))?;
        Ok((concept.id.clone(), step.clone()))
    }

    fn publish(&self, session_id: &str, outcome: &TurnOutcome) {
        match outcome {
            TurnOutcome::Taught { instructions, .. } => {
                for instruction in instructions {
                    self.sink.on_turn(session_id, instruction);
                }
            }
            TurnOutcome::TopicPrompt(prompt) => self.sink.on_redirect(session_id, prompt),
            TurnOutcome::Ended(summary) => self.sink.on_session_end(session_id, summary),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
