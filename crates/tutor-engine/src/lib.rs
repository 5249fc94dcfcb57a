//! Adaptive tutoring engine
//!
//! Teaches concepts from a prerequisite graph one turn at a time, tracking
//! per-concept mastery and choosing each next step from the learner's recent
//! answers. Includes an HTTP host and WebSocket turn events.

pub mod api;
pub mod classify;
pub mod concept_graph;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod mastery;
pub mod pacing;
pub mod planner;
pub mod resolve;
pub mod session;
pub mod turn;

pub use api::{
    create_router, AppState, CreateSessionRequest, CreateSessionResponse, ErrorResponse,
    SessionStore, SubmitRequest, TurnResponse,
};
pub use classify::{KeywordClassifier, ResponseClassifier};
pub use concept_graph::{
    Concept, ConceptBank, ConceptGraph, ConceptId, Step, StepId, StepKind,
    DEFAULT_MASTERY_THRESHOLD, MAX_CONCEPT_BANK_SIZE,
};
pub use config::{ClassifierConfig, Config, MatchMode, CONFIG_FILE_NAME};
pub use error::{Result, TutorError};
pub use events::{EventBroadcaster, TutorEvent};
pub use manager::{SessionManager, GREETING_MESSAGE, REDIRECT_MESSAGE};
pub use mastery::{MasteryEstimator, MasteryMap, MasteryScore, ResponseSignal, MAX_SCORE};
pub use pacing::{Directive, EncouragementHint, PacingController};
pub use planner::{ConceptMove, Plan, StepPlanner};
pub use resolve::{FuzzyTopicResolver, TopicResolver};
pub use session::{ConceptSummary, Session, SessionState, SessionSummary, SuspendedVisit};
pub use turn::{NoopSink, TopicPrompt, TurnInstruction, TurnOutcome, TurnSink};
