//! Outbound instructions and the sink they are delivered to.

use serde::{Deserialize, Serialize};

use crate::concept_graph::{ConceptId, Step};
use crate::pacing::{Directive, EncouragementHint};
use crate::session::SessionSummary;

/// One step for the renderer to present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInstruction {
    /// Turn the instruction belongs to.
    pub turn: u32,
    /// Concept of the step.
    pub concept_id: ConceptId,
    /// The step itself, content included.
    pub step: Step,
    /// Directive that led here; `None` for topic entry and follow-ons.
    pub directive: Option<Directive>,
    /// Tone hint.
    pub encouragement: EncouragementHint,
    /// Set when the step was shown before and should be worded differently.
    pub rephrase: bool,
    /// Set when the learner is expected to reply to this step.
    pub awaits_response: bool,
}

impl TurnInstruction {
    /// Copy with the expected answer removed, for anything leaving the server.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut instruction = self.clone();
        instruction.step.expected_answer = None;
        instruction
    }
}

/// Prompt asking the learner to pick a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicPrompt {
    /// Friendly message for the learner.
    pub message: String,
    /// What went wrong, if this prompt follows a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// Concept ids to offer.
    pub suggestions: Vec<ConceptId>,
}

/// Result of one call into the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The learner should choose a topic.
    TopicPrompt(TopicPrompt),
    /// Steps were emitted.
    Taught {
        /// Directive chosen for this turn, if a reply was evaluated.
        directive: Option<Directive>,
        /// How the reply was classified, if one was evaluated.
        signal: Option<crate::mastery::ResponseSignal>,
        /// Instructions in presentation order; the last one awaits a reply.
        instructions: Vec<TurnInstruction>,
    },
    /// The session is over.
    Ended(SessionSummary),
}

impl TurnOutcome {
    /// Returns `true` if the session ended on this turn.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self, Self::Ended(_))
    }

    /// Strips expected answers from every emitted step.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        if let Self::Taught { instructions, .. } = &mut self {
            for instruction in instructions {
                instruction.step.expected_answer = None;
            }
        }
        self
    }
}

/// Receiver of committed turn output.
///
/// Called only after a turn has been committed; a failing turn publishes
/// nothing.
pub trait TurnSink: Send + Sync {
    /// A step was emitted.
    fn on_turn(&self, session_id: &str, instruction: &TurnInstruction);

    /// The session returned to topic selection.
    fn on_redirect(&self, _session_id: &str, _prompt: &TopicPrompt) {}

    /// The session ended.
    fn on_session_end(&self, _session_id: &str, _summary: &SessionSummary) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TurnSink for NoopSink {
    fn on_turn(&self, _session_id: &str, _instruction: &TurnInstruction) {}
}
