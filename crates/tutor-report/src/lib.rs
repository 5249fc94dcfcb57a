//! Study guide generation for tutoring sessions
//!
//! This crate turns the summary of a finished tutoring session into a study
//! guide. Guides can be serialized to JSON for programmatic access, rendered
//! to Markdown, or written as a plain text file.
//!
//! # Types
//!
//! - [`SessionRecord`] - Session outcome as exported by the engine
//! - [`Report`] - The complete study guide
//! - [`ReportSummary`] - Headline numbers for the session
//! - [`ConceptReport`] - Result for one visited concept
//! - [`MasteryStatus`] - Banded mastery level of a concept
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - JSON with compact or pretty formatting
//! - [`MarkdownGenerator`] - Markdown study guide
//! - [`TextGenerator`] - Plain text study guide
//!
//! # Example
//!
//! ```rust
//! use tutor_report::{MarkdownGenerator, Report, SessionRecord};
//!
//! let record: SessionRecord = serde_json::from_str(r#"{
//!     "sessionId": "s1",
//!     "learnerId": "ada",
//!     "turns": 4,
//!     "startedAt": "2024-05-01T10:00:00Z",
//!     "endedAt": "2024-05-01T10:05:00Z",
//!     "concepts": [
//!         {"conceptId": "fractions", "name": "Fractions", "score": 0.8,
//!          "threshold": 0.7, "mastered": true, "responses": 3}
//!     ]
//! }"#).unwrap();
//!
//! let report = Report::from_session(&record, "Fractions");
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.starts_with("# Study Guide: Fractions"));
//! ```

pub mod json;
mod markdown;
mod text;

pub use markdown::MarkdownGenerator;
pub use text::TextGenerator;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base name of the files written by [`Report::write_reports`].
pub const REPORT_FILE_STEM: &str = "study-guide";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize or parse report data.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Session Record (local copy to avoid cross-crate dependency)
// ============================================================================

/// Outcome of one concept in a finished session.
///
/// Mirrors the engine's `ConceptSummary` JSON so this crate does not depend
/// on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRecord {
    /// Concept id.
    pub concept_id: String,
    /// Display name.
    pub name: String,
    /// Final mastery score.
    pub score: f64,
    /// Threshold the score was measured against.
    pub threshold: f64,
    /// Whether the threshold was reached.
    pub mastered: bool,
    /// Number of evaluated replies.
    pub responses: u32,
}

/// A finished session, as exported by the engine's `SessionSummary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Session id.
    pub session_id: String,
    /// Learner id.
    pub learner_id: String,
    /// Turns processed.
    pub turns: u32,
    /// Session start.
    pub started_at: DateTime<Utc>,
    /// Session end.
    pub ended_at: DateTime<Utc>,
    /// Concepts in visit order.
    #[serde(default)]
    pub concepts: Vec<ConceptRecord>,
}

impl SessionRecord {
    /// Parses a record from any serializable session summary.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if the value does not have the
    /// session summary shape.
    pub fn from_summary<T: Serialize>(summary: &T) -> Result<Self> {
        let value = serde_json::to_value(summary)?;
        Ok(serde_json::from_value(value)?)
    }
}

// ============================================================================
// Mastery Status
// ============================================================================

/// Banded mastery level shown in the study guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryStatus {
    /// Score reached the threshold.
    Mastered,
    /// Score reached half the threshold.
    Developing,
    /// Score below half the threshold.
    #[default]
    Beginning,
}

impl MasteryStatus {
    /// Bands a score against its threshold.
    #[must_use]
    pub fn from_score(score: f64, threshold: f64, mastered: bool) -> Self {
        if mastered || score >= threshold {
            Self::Mastered
        } else if score >= threshold / 2.0 {
            Self::Developing
        } else {
            Self::Beginning
        }
    }

    /// Returns a human-readable label.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Mastered => "Mastered",
            Self::Developing => "Developing",
            Self::Beginning => "Beginning",
        }
    }
}

impl fmt::Display for MasteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Headline numbers for the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Learner id.
    pub learner_id: String,
    /// Session id.
    pub session_id: String,
    /// Turns processed.
    pub turns: u32,
    /// Wall-clock length of the session in seconds.
    pub duration_seconds: u64,
    /// Concepts visited.
    pub concepts_visited: usize,
    /// Concepts whose threshold was reached.
    pub concepts_mastered: usize,
}

/// Result for one visited concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptReport {
    /// Concept id.
    pub concept_id: String,
    /// Display name.
    pub name: String,
    /// Final score in `[0, 1)`.
    pub score: f64,
    /// Mastery threshold.
    pub threshold: f64,
    /// Banded status.
    pub status: MasteryStatus,
    /// Evaluated replies.
    pub responses: u32,
    /// Short progress note for the learner.
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<&ConceptRecord> for ConceptReport {
    fn from(record: &ConceptRecord) -> Self {
        Self {
            concept_id: record.concept_id.clone(),
            name: record.name.clone(),
            score: record.score,
            threshold: record.threshold,
            status: MasteryStatus::from_score(record.score, record.threshold, record.mastered),
            responses: record.responses,
            notes: Some(progress_note(record)),
        }
    }
}

fn progress_note(record: &ConceptRecord) -> String {
    let answers = match record.responses {
        1 => "1 answer".to_string(),
        n => format!("{n} answers"),
    };
    if record.mastered || record.score >= record.threshold {
        return format!("Mastered after {answers}.");
    }
    if record.responses == 0 {
        return "Not practised yet.".to_string();
    }
    format!(
        "{:.0} points short of the {:.0}% goal after {answers}.",
        (record.threshold - record.score) * 100.0,
        record.threshold * 100.0
    )
}

/// The complete study guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Topic the learner asked for.
    pub topic: String,
    /// Headline numbers.
    pub summary: ReportSummary,
    /// Per-concept results in visit order.
    pub concepts: Vec<ConceptReport>,
    /// What to study next.
    pub recommendations: Vec<String>,
    /// When the guide was produced.
    pub generated_at: DateTime<Utc>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            topic: String::new(),
            summary: ReportSummary::default(),
            concepts: Vec::new(),
            recommendations: Vec::new(),
            generated_at: Utc::now(),
        }
    }
}

impl Report {
    /// Builds the study guide for a finished session.
    #[must_use]
    pub fn from_session(record: &SessionRecord, topic: impl Into<String>) -> Self {
        let concepts: Vec<ConceptReport> = record.concepts.iter().map(ConceptReport::from).collect();
        let duration = (record.ended_at - record.started_at).num_seconds().max(0);

        let mut report = Self {
            topic: topic.into(),
            summary: ReportSummary {
                learner_id: record.learner_id.clone(),
                session_id: record.session_id.clone(),
                turns: record.turns,
                duration_seconds: u64::try_from(duration).unwrap_or(0),
                concepts_visited: concepts.len(),
                concepts_mastered: concepts
                    .iter()
                    .filter(|c| c.status == MasteryStatus::Mastered)
                    .count(),
            },
            concepts,
            recommendations: Vec::new(),
            generated_at: Utc::now(),
        };
        report.recommendations = report.recommend();
        report
    }

    /// Serializes the report to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        json::JsonGenerator::new(self).generate_pretty()
    }

    /// Concepts not yet mastered, weakest first.
    #[must_use]
    pub fn needs_review(&self) -> Vec<&ConceptReport> {
        let mut pending: Vec<&ConceptReport> = self
            .concepts
            .iter()
            .filter(|c| c.status != MasteryStatus::Mastered)
            .collect();
        pending.sort_by(|a, b| (a.score - a.threshold).total_cmp(&(b.score - b.threshold)));
        pending
    }

    /// Writes `study-guide.md`, `study-guide.json` and `study-guide.txt`
    /// into `dir`, creating it if needed. Returns the written paths.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Io` if the directory or a file cannot be written.
    pub fn write_reports(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;

        let markdown = dir.join(format!("{REPORT_FILE_STEM}.md"));
        fs::write(&markdown, MarkdownGenerator::new(self).generate())?;

        let json = dir.join(format!("{REPORT_FILE_STEM}.json"));
        json::JsonGenerator::new(self).write_to_file(&json, true)?;

        let text = dir.join(format!("{REPORT_FILE_STEM}.txt"));
        fs::write(&text, TextGenerator::new(self).generate())?;

        Ok(vec![markdown, json, text])
    }

    /// Recommendations: review the weakest concepts first, or move on.
    fn recommend(&self) -> Vec<String> {
        if self.concepts.is_empty() {
            return vec!["Pick a topic to get started.".to_string()];
        }

        let pending = self.needs_review();
        if pending.is_empty() {
            return vec!["Everything visited is mastered. Try a new topic next time.".to_string()];
        }

        pending
            .into_iter()
            .map(|c| match c.status {
                MasteryStatus::Beginning => format!("Revisit {} from the beginning.", c.name),
                _ => format!("Practice {} a little more.", c.name),
            })
            .collect()
    }
}
