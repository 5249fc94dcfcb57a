//! Response classification.
//!
//! The engine never interprets learner text itself; it asks a
//! [`ResponseClassifier`]. [`KeywordClassifier`] is the built-in
//! implementation that compares a reply with the step's expected answer.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::concept_graph::Step;
use crate::config::{Config, MatchMode};
use crate::mastery::ResponseSignal;

/// Separator between alternative accepted answers in `expectedAnswer`.
const ALTERNATIVE_SEPARATOR: char = '|';

/// Words, numbers, fractions (`3/4`) and decimals (`0.5`).
static TOKEN_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[a-z0-9]+(?:[./][a-z0-9]+)*").ok());

/// Maps a raw learner reply to a signal.
pub trait ResponseClassifier: Send + Sync {
    /// Classifies `raw` as an answer to `step`.
    ///
    /// `None` means the reply could not be interpreted; the engine treats it
    /// as [`ResponseSignal::Unclear`].
    fn classify(&self, raw: &str, step: &Step) -> Option<ResponseSignal>;

    /// Returns `true` if the learner asked to stop.
    fn wants_exit(&self, _raw: &str) -> bool {
        false
    }
}

/// Lowercases and splits text into answer tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    match TOKEN_RE.as_ref() {
        Some(re) => re.find_iter(&lower).map(|m| m.as_str().to_string()).collect(),
        None => lower.split_whitespace().map(ToString::to_string).collect(),
    }
}

/// Keyword-overlap classifier.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    mode: MatchMode,
    partial_overlap: f64,
    exit_phrases: Vec<Vec<String>>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl KeywordClassifier {
    /// Creates a classifier.
    #[must_use]
    pub fn new(mode: MatchMode, partial_overlap: f64, exit_phrases: &[String]) -> Self {
        Self {
            mode,
            partial_overlap,
            exit_phrases: exit_phrases
                .iter()
                .map(|p| tokenize(p))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Creates a classifier from the `classifier` and `exitPhrases` settings.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.classifier.mode,
            config.classifier.partial_overlap,
            &config.exit_phrases,
        )
    }

    fn score_against(&self, reply: &[String], expected: &[String]) -> ResponseSignal {
        let matched = match self.mode {
            MatchMode::Exact => reply == expected,
            MatchMode::Contains => reply.windows(expected.len()).any(|w| w == expected),
        };
        if matched {
            return ResponseSignal::Correct;
        }

        let wanted: HashSet<&String> = expected.iter().collect();
        let given: HashSet<&String> = reply.iter().collect();
        let hits = wanted.intersection(&given).count();

        #[allow(clippy::cast_precision_loss)]
        let overlap = hits as f64 / wanted.len() as f64;
        if hits > 0 && overlap >= self.partial_overlap {
            ResponseSignal::PartiallyCorrect
        } else {
            ResponseSignal::Incorrect
        }
    }
}

const fn rank(signal: ResponseSignal) -> u8 {
    match signal {
        ResponseSignal::Correct => 3,
        ResponseSignal::PartiallyCorrect => 2,
        ResponseSignal::Incorrect => 1,
        ResponseSignal::OffTopic | ResponseSignal::Unclear => 0,
    }
}

impl ResponseClassifier for KeywordClassifier {
    fn classify(&self, raw: &str, step: &Step) -> Option<ResponseSignal> {
        let reply = tokenize(raw);
        if reply.is_empty() {
            return None;
        }

        step.expected_answer
            .as_deref()?
            .split(ALTERNATIVE_SEPARATOR)
            .map(tokenize)
            .filter(|expected| !expected.is_empty())
            .map(|expected| self.score_against(&reply, &expected))
            .max_by_key(|signal| rank(*signal))
    }

    fn wants_exit(&self, raw: &str) -> bool {
        let reply = tokenize(raw);
        !reply.is_empty() && self.exit_phrases.iter().any(|p| *p == reply)
    }
}
