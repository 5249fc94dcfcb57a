//! Per-concept mastery estimation.
//!
//! Scores move by an exponential moving average toward 1.0 on correct answers
//! and toward 0.0 on incorrect ones. Ambiguous signals are recorded in the
//! history but never move the score.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::concept_graph::ConceptId;

/// Default EMA learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.3;

/// Default number of signals kept per concept.
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Upper bound for scores; full certainty is never reached.
pub const MAX_SCORE: f64 = 1.0 - f64::EPSILON;

// ============================================================================
// ResponseSignal
// ============================================================================

/// Classification of a learner reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSignal {
    /// The reply matched the expected answer.
    Correct,
    /// The reply overlapped the expected answer.
    PartiallyCorrect,
    /// The reply was wrong.
    Incorrect,
    /// The reply was about something else.
    OffTopic,
    /// The reply could not be interpreted.
    Unclear,
}

impl ResponseSignal {
    /// Returns `true` for signals that carry no evidence about understanding.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_engine::ResponseSignal;
    ///
    /// assert!(ResponseSignal::Unclear.is_ambiguous());
    /// assert!(ResponseSignal::OffTopic.is_ambiguous());
    /// assert!(!ResponseSignal::Incorrect.is_ambiguous());
    /// ```
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::OffTopic | Self::Unclear)
    }
}

impl std::fmt::Display for ResponseSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Correct => write!(f, "correct"),
            Self::PartiallyCorrect => write!(f, "partially_correct"),
            Self::Incorrect => write!(f, "incorrect"),
            Self::OffTopic => write!(f, "off_topic"),
            Self::Unclear => write!(f, "unclear"),
        }
    }
}

// ============================================================================
// MasteryScore
// ============================================================================

/// A learner's estimated understanding of one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryScore {
    value: f64,
    history: VecDeque<ResponseSignal>,
    window: usize,
    last_gain: f64,
    updates: u32,
}

impl MasteryScore {
    /// Creates a zero score with room for `window` signals.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self::with_value(0.0, window)
    }

    /// Creates a score with a starting value, clamped into range.
    #[must_use]
    pub fn with_value(value: f64, window: usize) -> Self {
        let window = window.max(1);
        Self {
            value: clamp(value),
            history: VecDeque::with_capacity(window),
            window,
            last_gain: 0.0,
            updates: 0,
        }
    }

    /// Current score in `[0, 1)`.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Score change caused by the most recent update.
    #[must_use]
    pub const fn last_gain(&self) -> f64 {
        self.last_gain
    }

    /// Number of signals ever recorded.
    #[must_use]
    pub const fn updates(&self) -> u32 {
        self.updates
    }

    /// History capacity.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Recorded signals, oldest first.
    pub fn history(&self) -> impl DoubleEndedIterator<Item = ResponseSignal> + '_ {
        self.history.iter().copied()
    }

    /// The most recent signal, if any.
    #[must_use]
    pub fn last_signal(&self) -> Option<ResponseSignal> {
        self.history.back().copied()
    }

    /// Up to `n` most recent signals, newest first.
    pub fn last_signals(&self, n: usize) -> impl Iterator<Item = ResponseSignal> + '_ {
        self.history.iter().rev().take(n).copied()
    }

    /// Returns `true` if any retained signal is `Correct`.
    #[must_use]
    pub fn has_correct(&self) -> bool {
        self.history.contains(&ResponseSignal::Correct)
    }

    fn record(&mut self, signal: ResponseSignal, value: f64) {
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(signal);
        let value = clamp(value);
        self.last_gain = value - self.value;
        self.value = value;
        self.updates = self.updates.saturating_add(1);
    }
}

/// Mastery scores of one session, keyed by concept.
pub type MasteryMap = BTreeMap<ConceptId, MasteryScore>;

/// Score of a concept, treating unvisited concepts as 0.0.
#[must_use]
pub fn score_of(mastery: &MasteryMap, concept_id: &str) -> f64 {
    mastery.get(concept_id).map_or(0.0, MasteryScore::value)
}

fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_SCORE)
    }
}

// ============================================================================
// MasteryEstimator
// ============================================================================

/// Pure EMA update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasteryEstimator {
    learning_rate: f64,
    window: usize,
}

impl Default for MasteryEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE, DEFAULT_HISTORY_WINDOW)
    }
}

impl MasteryEstimator {
    /// Creates an estimator with learning rate `alpha` and history `window`.
    #[must_use]
    pub const fn new(learning_rate: f64, window: usize) -> Self {
        Self {
            learning_rate,
            window,
        }
    }

    /// Learning rate in use.
    #[must_use]
    pub const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// A zero score sized for this estimator.
    #[must_use]
    pub fn fresh_score(&self) -> MasteryScore {
        MasteryScore::new(self.window)
    }

    /// Applies one signal and returns the new score; the input is untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_engine::{MasteryEstimator, ResponseSignal};
    ///
    /// let estimator = MasteryEstimator::default();
    /// let score = estimator.update(&estimator.fresh_score(), ResponseSignal::Correct);
    /// assert!((score.value() - 0.3).abs() < 1e-9);
    /// ```
    #[must_use]
    pub fn update(&self, score: &MasteryScore, signal: ResponseSignal) -> MasteryScore {
        let s = score.value;
        let alpha = self.learning_rate;
        let value = match signal {
            ResponseSignal::Correct => alpha.mul_add(1.0 - s, s),
            ResponseSignal::PartiallyCorrect => (alpha / 2.0).mul_add(1.0 - s, s),
            ResponseSignal::Incorrect => alpha.mul_add(-s, s),
            ResponseSignal::OffTopic | ResponseSignal::Unclear => s,
        };

        let mut next = score.clone();
        next.record(signal, value);
        next
    }
}
