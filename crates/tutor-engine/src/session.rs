//! Session state for one learner conversation.
//!
//! A [`Session`] is plain data: the lifecycle state, where the learner is in
//! the concept graph, and their mastery map. All turn logic lives in
//! [`SessionManager`](crate::SessionManager); this module only enforces the
//! lifecycle edges and persistence.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::concept_graph::{ConceptGraph, ConceptId, StepId};
use crate::error::{Result, TutorError};
use crate::mastery::{score_of, MasteryMap};
use crate::planner::{ConceptMove, Plan};

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a session.
///
/// ```text
/// Idle -> TopicSelection -> Teaching -> AwaitingResponse -> Evaluating
///                 ^             ^                               |
///                 |             +-------------------------------+
///                 +---------------------------------------------+
/// any non-terminal state -> SessionEnd
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no input received yet.
    #[default]
    Idle,
    /// Waiting for the learner to name a topic.
    TopicSelection,
    /// Emitting steps.
    Teaching,
    /// A check question is outstanding.
    AwaitingResponse,
    /// Processing the learner's reply.
    Evaluating,
    /// Closed; no further turns are accepted.
    SessionEnd,
}

impl SessionState {
    /// Returns `true` once the session is closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_engine::SessionState;
    ///
    /// assert!(SessionState::SessionEnd.is_terminal());
    /// assert!(!SessionState::AwaitingResponse.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::SessionEnd)
    }

    /// Returns `true` if the session is blocked on learner input.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::TopicSelection | Self::AwaitingResponse
        )
    }

    /// Returns `true` if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::SessionEnd, _) => false,
            (_, Self::SessionEnd)
            | (Self::Idle, Self::TopicSelection)
            | (Self::TopicSelection | Self::Evaluating, Self::Teaching)
            | (Self::Teaching | Self::Evaluating, Self::TopicSelection)
            | (Self::Teaching, Self::AwaitingResponse)
            | (Self::AwaitingResponse, Self::Evaluating) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::TopicSelection => write!(f, "topic_selection"),
            Self::Teaching => write!(f, "teaching"),
            Self::AwaitingResponse => write!(f, "awaiting_response"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::SessionEnd => write!(f, "session_end"),
        }
    }
}

// ============================================================================
// Visits and summary
// ============================================================================

/// A concept visit put aside while the learner digresses into a prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspendedVisit {
    /// The suspended concept.
    pub concept_id: ConceptId,
    /// Step to resume at; `None` if the concept was never started.
    pub step_id: Option<StepId>,
    /// Steps already shown during the suspended visit.
    pub shown: Vec<StepId>,
}

impl SuspendedVisit {
    /// A visit for a concept that has not been started yet.
    #[must_use]
    pub fn pending(concept_id: impl Into<ConceptId>) -> Self {
        Self {
            concept_id: concept_id.into(),
            step_id: None,
            shown: Vec::new(),
        }
    }
}

/// Final mastery of one visited concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSummary {
    /// Concept id.
    pub concept_id: ConceptId,
    /// Display name.
    pub name: String,
    /// Final score.
    pub score: f64,
    /// Threshold the score was measured against.
    pub threshold: f64,
    /// Whether the score reached the threshold.
    pub mastered: bool,
    /// Number of evaluated replies.
    pub responses: u32,
}

/// Outcome of a finished session, concepts in visit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session id.
    pub session_id: String,
    /// Learner id.
    pub learner_id: String,
    /// Turns processed.
    pub turns: u32,
    /// Session creation time.
    pub started_at: DateTime<Utc>,
    /// Time the session ended.
    pub ended_at: DateTime<Utc>,
    /// Per-concept results in the order concepts were first visited.
    pub concepts: Vec<ConceptSummary>,
}

impl SessionSummary {
    /// Number of concepts whose threshold was reached.
    #[must_use]
    pub fn mastered_count(&self) -> usize {
        self.concepts.iter().filter(|c| c.mastered).count()
    }
}

// ============================================================================
// Session
// ============================================================================

/// One learner's conversation with the tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique session id.
    pub id: String,

    /// Learner this session belongs to.
    pub learner_id: String,

    /// Lifecycle state.
    pub state: SessionState,

    /// Concept being taught.
    pub current_concept: Option<ConceptId>,

    /// Step last emitted; always a step of `current_concept`.
    pub current_step: Option<StepId>,

    /// Steps shown during the current visit.
    pub shown: Vec<StepId>,

    /// Suspended visits, innermost last.
    pub stack: Vec<SuspendedVisit>,

    /// Mastery per concept.
    pub mastery: MasteryMap,

    /// Concepts in the order they were first entered.
    pub visit_order: Vec<ConceptId>,

    /// Turns processed so far.
    pub turn: u32,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Time of the last accepted input.
    pub last_activity: DateTime<Utc>,

    /// Set once the session ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
}

impl Session {
    /// Creates an idle session with a fresh id.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_engine::{Session, SessionState};
    ///
    /// let session = Session::new("ada");
    /// assert_eq!(session.state, SessionState::Idle);
    /// assert!(session.current_concept.is_none());
    /// assert_eq!(session.turn, 0);
    /// ```
    #[must_use]
    pub fn new(learner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            learner_id: learner_id.into(),
            state: SessionState::Idle,
            current_concept: None,
            current_step: None,
            shown: Vec::new(),
            stack: Vec::new(),
            mastery: MasteryMap::new(),
            visit_order: Vec::new(),
            turn: 0,
            created_at: now,
            last_activity: now,
            summary: None,
        }
    }

    /// Returns `true` once the session is closed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves to `next`, rejecting edges the lifecycle does not allow.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SessionClosed` if the session already ended, or
    /// `TutorError::InvalidStateTransition` for any other illegal edge.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(TutorError::session_closed(&self.id));
        }
        if !self.state.can_transition_to(next) {
            return Err(TutorError::invalid_transition(self.state, next));
        }
        tracing::trace!(session_id = %self.id, from = %self.state, to = %next, "State transition");
        self.state = next;
        Ok(())
    }

    /// Records learner activity.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Returns `true` if the session has been idle for longer than `idle_timeout`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
        now - self.last_activity > idle_timeout
    }

    /// Returns `true` if the step was already shown in the current visit.
    #[must_use]
    pub fn has_shown(&self, step_id: &str) -> bool {
        self.shown.iter().any(|s| s == step_id)
    }

    /// Moves the session to the step named by `plan`.
    ///
    /// Handles the concept move: starting a concept resets the visit,
    /// digressing pushes the current visit (if asked) and the pending
    /// concepts, resuming restores the visit on top of the stack.
    pub fn apply_plan(&mut self, plan: &Plan) {
        match &plan.concept_move {
            ConceptMove::Stay => {}
            ConceptMove::Start => self.begin_visit(&plan.concept_id, Vec::new()),
            ConceptMove::Digress {
                suspend_current,
                pending,
            } => {
                if *suspend_current {
                    if let Some(concept_id) = self.current_concept.take() {
                        self.stack.push(SuspendedVisit {
                            concept_id,
                            step_id: self.current_step.take(),
                            shown: std::mem::take(&mut self.shown),
                        });
                    }
                }
                self.stack
                    .extend(pending.iter().map(|c| SuspendedVisit::pending(c.clone())));
                self.begin_visit(&plan.concept_id, Vec::new());
            }
            ConceptMove::Resume => {
                let shown = self
                    .stack
                    .pop()
                    .filter(|v| v.concept_id == plan.concept_id)
                    .map(|v| v.shown)
                    .unwrap_or_default();
                self.begin_visit(&plan.concept_id, shown);
            }
        }

        self.current_step = Some(plan.step.id.clone());
        if !self.has_shown(&plan.step.id) {
            self.shown.push(plan.step.id.clone());
        }
    }

    fn begin_visit(&mut self, concept_id: &str, shown: Vec<StepId>) {
        self.current_concept = Some(concept_id.to_string());
        self.current_step = None;
        self.shown = shown;
        if !self.visit_order.iter().any(|c| c == concept_id) {
            self.visit_order.push(concept_id.to_string());
        }
    }

    /// Builds the end-of-session summary from the visit order.
    #[must_use]
    pub fn summarize(&self, graph: &ConceptGraph, ended_at: DateTime<Utc>) -> SessionSummary {
        let concepts = self
            .visit_order
            .iter()
            .filter_map(|id| graph.get(id).ok())
            .map(|concept| {
                let score = score_of(&self.mastery, &concept.id);
                ConceptSummary {
                    concept_id: concept.id.clone(),
                    name: concept.name.clone(),
                    score,
                    threshold: concept.mastery_threshold,
                    mastered: score >= concept.mastery_threshold,
                    responses: self.mastery.get(&concept.id).map_or(0, |m| m.updates()),
                }
            })
            .collect();

        SessionSummary {
            session_id: self.id.clone(),
            learner_id: self.learner_id.clone(),
            turns: self.turn,
            started_at: self.created_at,
            ended_at,
            concepts,
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Writes the session as pretty JSON, replacing `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Io` or `TutorError::Json` on failure.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(session_id = %self.id, path = %path.display(), "Session saved");
        Ok(())
    }

    /// Reads a saved session. A missing file yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::Io` for read failures or `TutorError::Json` for
    /// corrupt content.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
