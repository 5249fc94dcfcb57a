//! Pacing policy: turns a mastery score into a teaching directive.

use serde::{Deserialize, Serialize};

use crate::mastery::{MasteryScore, ResponseSignal};

/// Default minimum score rise that counts as an upward trend.
pub const DEFAULT_DEEPEN_MIN_GAIN: f64 = 0.15;

/// Number of trailing signals inspected for streaks.
const STREAK_LENGTH: usize = 2;

/// How the next step should relate to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Step back to something easier.
    Simplify,
    /// Stay at the current difficulty.
    Hold,
    /// Go to a harder step in the same concept.
    Deepen,
    /// Leave the concept.
    Advance,
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simplify => write!(f, "simplify"),
            Self::Hold => write!(f, "hold"),
            Self::Deepen => write!(f, "deepen"),
            Self::Advance => write!(f, "advance"),
        }
    }
}

/// Tone the renderer should take with the learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncouragementHint {
    /// The learner just earned a move forward.
    Celebrate,
    /// The learner is struggling.
    Reassure,
    /// Nothing notable.
    Neutral,
}

impl From<Directive> for EncouragementHint {
    fn from(directive: Directive) -> Self {
        match directive {
            Directive::Advance => Self::Celebrate,
            Directive::Simplify => Self::Reassure,
            Directive::Hold | Directive::Deepen => Self::Neutral,
        }
    }
}

/// Rule-based pacing controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingController {
    deepen_min_gain: f64,
}

impl Default for PacingController {
    fn default() -> Self {
        Self::new(DEFAULT_DEEPEN_MIN_GAIN)
    }
}

impl PacingController {
    /// Creates a controller with the given upward-trend floor.
    #[must_use]
    pub const fn new(deepen_min_gain: f64) -> Self {
        Self { deepen_min_gain }
    }

    /// Chooses a directive. The first matching rule wins:
    ///
    /// 1. two trailing `Incorrect` signals: `Simplify`
    /// 2. trailing ambiguous signal: `Hold`
    /// 3. score at threshold with some `Correct` in history: `Advance`
    /// 4. last gain at least `deepen_min_gain` and no recent `Incorrect`: `Deepen`
    /// 5. otherwise `Hold`
    ///
    /// # Examples
    ///
    /// ```
    /// use tutor_engine::{Directive, MasteryEstimator, PacingController, ResponseSignal};
    ///
    /// let estimator = MasteryEstimator::default();
    /// let score = estimator.update(&estimator.fresh_score(), ResponseSignal::Correct);
    /// assert_eq!(PacingController::default().decide(&score, 0.7), Directive::Deepen);
    /// ```
    #[must_use]
    pub fn decide(&self, score: &MasteryScore, threshold: f64) -> Directive {
        let recent: Vec<ResponseSignal> = score.last_signals(STREAK_LENGTH).collect();

        if recent.len() == STREAK_LENGTH && recent.iter().all(|s| *s == ResponseSignal::Incorrect)
        {
            return Directive::Simplify;
        }

        if score.last_signal().is_some_and(|s| s.is_ambiguous()) {
            return Directive::Hold;
        }

        if score.value() >= threshold && score.has_correct() {
            return Directive::Advance;
        }

        if score.last_gain() >= self.deepen_min_gain
            && !recent.contains(&ResponseSignal::Incorrect)
        {
            return Directive::Deepen;
        }

        Directive::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastery::MasteryEstimator;

    fn run(start: f64, signals: &[ResponseSignal]) -> MasteryScore {
        let estimator = MasteryEstimator::default();
        signals
            .iter()
            .fold(MasteryScore::with_value(start, 5), |score, &signal| {
                estimator.update(&score, signal)
            })
    }

    #[test]
    fn test_fractions_scenario() {
        let estimator = MasteryEstimator::default();
        let pacing = PacingController::default();
        let mut score = estimator.fresh_score();
        let mut directives = Vec::new();

        for _ in 0..3 {
            score = estimator.update(&score, ResponseSignal::Correct);
            directives.push(pacing.decide(&score, 0.7));
        }

        assert_eq!(
            directives,
            vec![Directive::Deepen, Directive::Deepen, Directive::Hold]
        );
    }

    #[test]
    fn test_two_incorrect_simplifies_regardless_of_score() {
        let pacing = PacingController::default();
        let score = run(
            0.95,
            &[ResponseSignal::Correct, ResponseSignal::Incorrect, ResponseSignal::Incorrect],
        );
        assert!(score.value() > 0.4);
        assert_eq!(pacing.decide(&score, 0.3), Directive::Simplify);
    }

    #[test]
    fn test_simplify_from_point_six_five() {
        let pacing = PacingController::default();
        let score = run(0.65, &[ResponseSignal::Incorrect, ResponseSignal::Incorrect]);
        assert_eq!(pacing.decide(&score, 0.7), Directive::Simplify);
    }

    #[test]
    fn test_ambiguous_holds_even_above_threshold() {
        let pacing = PacingController::default();
        let score = run(0.9, &[ResponseSignal::Correct, ResponseSignal::Unclear]);
        assert_eq!(pacing.decide(&score, 0.7), Directive::Hold);

        let score = run(0.9, &[ResponseSignal::Correct, ResponseSignal::OffTopic]);
        assert_eq!(pacing.decide(&score, 0.7), Directive::Hold);
    }

    #[test]
    fn test_advance_requires_a_correct_answer() {
        let pacing = PacingController::default();

        let score = run(0.9, &[ResponseSignal::PartiallyCorrect]);
        assert_ne!(pacing.decide(&score, 0.7), Directive::Advance);

        let score = run(0.9, &[ResponseSignal::Correct]);
        assert_eq!(pacing.decide(&score, 0.7), Directive::Advance);
    }

    #[test]
    fn test_no_deepen_right_after_incorrect() {
        let pacing = PacingController::new(0.0);
        let score = run(0.2, &[ResponseSignal::Incorrect, ResponseSignal::Correct]);
        assert_eq!(pacing.decide(&score, 0.9), Directive::Hold);
    }

    #[test]
    fn test_empty_history_holds() {
        let pacing = PacingController::default();
        assert_eq!(
            pacing.decide(&MasteryScore::new(5), 0.7),
            Directive::Hold
        );
    }

    #[test]
    fn test_encouragement_hint() {
        assert_eq!(
            EncouragementHint::from(Directive::Advance),
            EncouragementHint::Celebrate
        );
        assert_eq!(
            EncouragementHint::from(Directive::Simplify),
            EncouragementHint::Reassure
        );
        assert_eq!(
            EncouragementHint::from(Directive::Deepen),
            EncouragementHint::Neutral
        );
        assert_eq!(
            EncouragementHint::from(Directive::Hold),
            EncouragementHint::Neutral
        );
    }
}
