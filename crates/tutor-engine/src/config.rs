//! Configuration types for the tutoring engine.
//!
//! Everything numeric in the tutoring policy (learning rate, history window,
//! trend floor, thresholds, timeouts) is a configuration default rather than
//! a constant, so curricula can be tuned without code changes.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::mastery::{DEFAULT_HISTORY_WINDOW, DEFAULT_LEARNING_RATE};
use crate::pacing::DEFAULT_DEEPEN_MIN_GAIN;

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "tutor.json";

fn default_concept_bank() -> String {
    "concepts.json".to_string()
}

const fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

const fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

const fn default_deepen_min_gain() -> f64 {
    DEFAULT_DEEPEN_MIN_GAIN
}

/// Default idle timeout: 30 minutes.
const fn default_idle_timeout_secs() -> u64 {
    1800
}

const fn default_suggestion_count() -> usize {
    3
}

/// Default fuzzy-match score floor for topic resolution.
const fn default_topic_min_score() -> i64 {
    30
}

fn default_exit_phrases() -> Vec<String> {
    ["bye", "exit", "quit", "stop"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_session_file() -> String {
    ".tutor/session.json".to_string()
}

const fn default_partial_overlap() -> f64 {
    0.5
}

/// Main configuration for the tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Path to the concept bank JSON file.
    #[serde(default = "default_concept_bank")]
    pub concept_bank: String,

    /// EMA learning rate, in `(0, 1]`.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Signals kept per concept for streak detection.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Minimum score rise that lets pacing deepen.
    #[serde(default = "default_deepen_min_gain")]
    pub deepen_min_gain: f64,

    /// Per-concept mastery threshold overrides.
    #[serde(default)]
    pub mastery_thresholds: HashMap<String, f64>,

    /// Seconds of inactivity before a session counts as expired.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How many topics to offer when the learner is unsure.
    #[serde(default = "default_suggestion_count")]
    pub suggestion_count: usize,

    /// Minimum fuzzy score for a topic match.
    #[serde(default = "default_topic_min_score")]
    pub topic_min_score: i64,

    /// Replies that end the session.
    #[serde(default = "default_exit_phrases")]
    pub exit_phrases: Vec<String>,

    /// Output directory for study guides.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Where the CLI keeps the resumable session.
    #[serde(default = "default_session_file")]
    pub session_file: String,

    /// Answer classification settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concept_bank: default_concept_bank(),
            learning_rate: default_learning_rate(),
            history_window: default_history_window(),
            deepen_min_gain: default_deepen_min_gain(),
            mastery_thresholds: HashMap::new(),
            idle_timeout_secs: default_idle_timeout_secs(),
            suggestion_count: default_suggestion_count(),
            topic_min_score: default_topic_min_score(),
            exit_phrases: default_exit_phrases(),
            output_dir: default_output_dir(),
            session_file: default_session_file(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `tutor.json` in the current directory. If not found, returns
    /// the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            TutorError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `tutor.json` from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigParseError` if the file cannot be read or
    /// contains invalid JSON, and `TutorError::ConfigValidationError` if a
    /// value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(TutorError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TutorError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Idle timeout as a `chrono::Duration`, saturating at `Duration::MAX`.
    #[must_use]
    pub fn idle_timeout(&self) -> chrono::Duration {
        i64::try_from(self.idle_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::ConfigValidationError` for the first failing check.
    pub fn validate(&self) -> Result<()> {
        if self.concept_bank.trim().is_empty() {
            return Err(TutorError::config_validation(
                "conceptBank must not be empty",
                "Provide the path to your concept bank JSON in tutor.json",
            ));
        }

        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(TutorError::config_validation(
                format!("learningRate must be in (0, 1], got {}", self.learning_rate),
                "Set learningRate to a value such as 0.3 in your tutor.json",
            ));
        }

        if self.history_window < 2 {
            return Err(TutorError::config_validation(
                format!("historyWindow must be at least 2, got {}", self.history_window),
                "Set historyWindow to 2 or more so repeated mistakes can be detected",
            ));
        }

        if !(0.0..=1.0).contains(&self.deepen_min_gain) {
            return Err(TutorError::config_validation(
                format!("deepenMinGain must be in [0, 1], got {}", self.deepen_min_gain),
                "Set deepenMinGain to a value such as 0.15 in your tutor.json",
            ));
        }

        if let Some((concept, value)) = self
            .mastery_thresholds
            .iter()
            .find(|(_, v)| !(0.0..1.0).contains(*v))
        {
            return Err(TutorError::config_validation(
                format!("masteryThresholds.{concept} must be in [0, 1), got {value}"),
                "Use values from 0 up to but not including 1 for mastery thresholds",
            ));
        }

        if self.idle_timeout_secs == 0 {
            return Err(TutorError::config_validation(
                "idleTimeoutSecs must be greater than 0",
                "Set idleTimeoutSecs to at least 1 second in your tutor.json",
            ));
        }

        if self.suggestion_count == 0 {
            return Err(TutorError::config_validation(
                "suggestionCount must be greater than 0",
                "Set suggestionCount to at least 1 in your tutor.json",
            ));
        }

        if self.topic_min_score < 0 {
            return Err(TutorError::config_validation(
                "topicMinScore must not be negative",
                "Set topicMinScore to 0 or more in your tutor.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(TutorError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your tutor.json (use '.' for current directory)",
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.partial_overlap) {
            return Err(TutorError::config_validation(
                format!(
                    "classifier.partialOverlap must be in [0, 1], got {}",
                    self.classifier.partial_overlap
                ),
                "Set classifier.partialOverlap to a value such as 0.5 in your tutor.json",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Classifier configuration
// ============================================================================

/// How strictly a reply must match the expected answer to count as correct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// The expected answer's tokens appear in order anywhere in the reply.
    #[default]
    Contains,
    /// The whole reply, normalized, equals the expected answer.
    Exact,
}

impl MatchMode {
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contains" => Some(Self::Contains),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for MatchMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid match mode '{s}': expected one of 'contains', 'exact'"
            ))
        })
    }
}

impl Serialize for MatchMode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(match self {
            Self::Contains => "contains",
            Self::Exact => "exact",
        })
    }
}

/// Settings for the built-in keyword classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Match strictness for `Correct`.
    #[serde(default)]
    pub mode: MatchMode,

    /// Share of expected tokens a reply needs for `PartiallyCorrect`.
    #[serde(default = "default_partial_overlap")]
    pub partial_overlap: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mode: MatchMode::default(),
            partial_overlap: default_partial_overlap(),
        }
    }
}
