//! Error types for the tutoring engine.
//!
//! This module defines the error hierarchy for all engine operations,
//! including configuration loading, concept bank validation, session
//! turn processing, and session lifecycle violations.

use std::path::PathBuf;

/// A specialized `Result` type for tutoring engine operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while running a tutoring session.
///
/// Variants are grouped by subsystem. Learner-facing failures
/// (`UnknownConcept`, `UnknownTopic`, `ExhaustedConcept`) are recoverable:
/// the session manager turns them into a redirect back to topic selection.
/// Everything else is surfaced to the host.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your tutor.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Concept Bank Errors
    // ========================================================================
    /// Concept bank file was not found at the specified path.
    #[error("Concept bank not found: '{path}'\n\nSuggestion: Check the 'conceptBank' field in tutor.json or create the file")]
    ConceptBankNotFound {
        /// Path where the concept bank was expected.
        path: PathBuf,
    },

    /// Concept bank file exceeds the size limit.
    #[error("Concept bank exceeds size limit (1024KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the curriculum into smaller banks")]
    ConceptBankTooLarge {
        /// Path to the oversized concept bank.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Concept bank file contains non-UTF-8 content.
    #[error("Concept bank has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    ConceptBankEncodingError {
        /// Path to the concept bank with encoding issues.
        path: PathBuf,
    },

    /// The concept graph violates a structural rule (cycle, dangling edge, ...).
    #[error("Invalid concept graph: {message}\n\nSuggestion: Fix the concept bank so prerequisites form a DAG of known concepts")]
    InvalidConceptGraph {
        /// Description of the violation.
        message: String,
    },

    // ========================================================================
    // Recoverable Learner-Facing Errors
    // ========================================================================
    /// A concept id is not present in the graph.
    #[error("Unknown concept: '{concept_id}'")]
    UnknownConcept {
        /// The id that failed to resolve.
        concept_id: String,
    },

    /// Learner input could not be resolved to a concept.
    #[error("Unknown topic: '{input}'")]
    UnknownTopic {
        /// The raw topic text the learner supplied.
        input: String,
        /// Concept ids offered as alternatives.
        suggestions: Vec<String>,
    },

    /// Advance found no ready concept and the current concept has nothing harder.
    #[error("Concept '{concept_id}' is exhausted and no further concept is ready")]
    ExhaustedConcept {
        /// The concept whose steps ran out.
        concept_id: String,
    },

    // ========================================================================
    // Session Lifecycle Errors
    // ========================================================================
    /// The session already reached `SessionEnd`.
    #[error("Session '{session_id}' is closed")]
    SessionClosed {
        /// The closed session.
        session_id: String,
    },

    /// No session with the given id is registered with the host.
    #[error("Session not found: '{session_id}'")]
    SessionNotFound {
        /// The requested session id.
        session_id: String,
    },

    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TutorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `ConceptBankNotFound` error.
    #[must_use]
    pub fn concept_bank_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConceptBankNotFound { path: path.into() }
    }

    /// Creates a new `ConceptBankTooLarge` error.
    #[must_use]
    pub fn concept_bank_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::ConceptBankTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `ConceptBankEncodingError`.
    #[must_use]
    pub fn concept_bank_encoding(path: impl Into<PathBuf>) -> Self {
        Self::ConceptBankEncodingError { path: path.into() }
    }

    /// Creates a new `InvalidConceptGraph` error.
    #[must_use]
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidConceptGraph {
            message: message.into(),
        }
    }

    /// Creates a new `UnknownConcept` error.
    #[must_use]
    pub fn unknown_concept(concept_id: impl Into<String>) -> Self {
        Self::UnknownConcept {
            concept_id: concept_id.into(),
        }
    }

    /// Creates a new `UnknownTopic` error carrying alternatives to offer.
    #[must_use]
    pub fn unknown_topic(input: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::UnknownTopic {
            input: input.into(),
            suggestions,
        }
    }

    /// Creates a new `ExhaustedConcept` error.
    #[must_use]
    pub fn exhausted(concept_id: impl Into<String>) -> Self {
        Self::ExhaustedConcept {
            concept_id: concept_id.into(),
        }
    }

    /// Creates a new `SessionClosed` error.
    #[must_use]
    pub fn session_closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if the session can recover by returning to topic selection.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownConcept { .. } | Self::UnknownTopic { .. } | Self::ExhaustedConcept { .. }
        )
    }

    /// Returns `true` if this error prevents the engine from starting at all.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::ConceptBankNotFound { .. }
                | Self::ConceptBankTooLarge { .. }
                | Self::ConceptBankEncodingError { .. }
                | Self::InvalidConceptGraph { .. }
        )
    }
}
