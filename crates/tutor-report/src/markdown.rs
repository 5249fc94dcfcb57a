//! Markdown study guide generation.
//!
//! [`MarkdownGenerator`] renders a [`Report`] as a Markdown document with:
//!
//! - A summary table with session metrics
//! - One section per visited concept, with mastery, status and a notes line
//! - Next steps, weakest concept first
//!
//! # Example
//!
//! ```rust
//! use tutor_report::{MarkdownGenerator, Report};
//!
//! let report = Report {
//!     topic: "Fractions".to_string(),
//!     ..Report::default()
//! };
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Study Guide: Fractions"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{ConceptReport, Report};

/// Generates Markdown study guides.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_concepts(&mut output);
        self.write_next_steps(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let topic = if self.report.topic.is_empty() {
            "Untitled".to_string()
        } else {
            escape_markdown(&self.report.topic)
        };
        let _ = writeln!(output, "# Study Guide: {topic}\n");
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Learner | {} |", escape_markdown(&summary.learner_id));
        let _ = writeln!(output, "| Turns | {} |", summary.turns);
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(output, "| Concepts Visited | {} |", summary.concepts_visited);
        let _ = writeln!(
            output,
            "| Concepts Mastered | {} of {} |",
            summary.concepts_mastered, summary.concepts_visited
        );
        let _ = writeln!(output);
    }

    fn write_concepts(&self, output: &mut String) {
        let _ = writeln!(output, "## Concepts\n");

        if self.report.concepts.is_empty() {
            let _ = writeln!(output, "*No concepts visited.*\n");
            return;
        }

        for concept in &self.report.concepts {
            Self::write_concept(output, concept);
        }
    }

    fn write_concept(output: &mut String, concept: &ConceptReport) {
        let _ = writeln!(output, "### {}\n", escape_markdown(&concept.name));
        let _ = writeln!(
            output,
            "- **Mastery**: {} (needs {})",
            format_percent(concept.score),
            format_percent(concept.threshold)
        );
        let _ = writeln!(output, "- **Status**: {}", concept.status);
        let _ = writeln!(output, "- **Responses**: {}", concept.responses);
        let notes = concept
            .notes
            .as_deref()
            .map_or_else(|| "*none yet*".to_string(), escape_markdown);
        let _ = writeln!(output, "- **Notes**: {notes}\n");
    }

    fn write_next_steps(&self, output: &mut String) {
        let _ = writeln!(output, "## Next Steps\n");

        if self.report.recommendations.is_empty() {
            let _ = writeln!(output, "*No specific recommendations.*\n");
            return;
        }

        for (index, rec) in self.report.recommendations.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", index + 1, escape_markdown(rec));
        }
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&self.report.generated_at);
        let _ = writeln!(output, "*Generated by Tutor at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a duration in seconds, e.g. `65` as `1m 5s`.
pub(crate) fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

/// Formats a score in `[0, 1]` as a whole percentage.
pub(crate) fn format_percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown control characters in learner-visible text.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{MasteryStatus, ReportSummary};
    use chrono::TimeZone;

    fn sample_report() -> Report {
        Report {
            topic: "Fractions".to_string(),
            summary: ReportSummary {
                learner_id: "ada".to_string(),
                session_id: "s1".to_string(),
                turns: 4,
                duration_seconds: 300,
                concepts_visited: 2,
                concepts_mastered: 1,
            },
            concepts: vec![
                ConceptReport {
                    concept_id: "division".to_string(),
                    name: "Division".to_string(),
                    score: 0.8,
                    threshold: 0.7,
                    status: MasteryStatus::Mastered,
                    responses: 2,
                    notes: None,
                },
                ConceptReport {
                    concept_id: "fractions".to_string(),
                    name: "Fractions".to_string(),
                    score: 0.5,
                    threshold: 0.7,
                    status: MasteryStatus::Developing,
                    responses: 3,
                    notes: Some("Mixes up numerator and denominator".to_string()),
                },
            ],
            recommendations: vec!["Practice Fractions a little more.".to_string()],
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_study_guide_snapshot() {
        let markdown = MarkdownGenerator::new(&sample_report()).generate();
        insta::assert_snapshot!(markdown, @r###"
        # Study Guide: Fractions

        ## Summary

        | Metric | Value |
        |--------|-------|
        | Learner | ada |
        | Turns | 4 |
        | Duration | 5m |
        | Concepts Visited | 2 |
        | Concepts Mastered | 1 of 2 |

        ## Concepts

        ### Division

        - **Mastery**: 80% (needs 70%)
        - **Status**: Mastered
        - **Responses**: 2
        - **Notes**: *none yet*

        ### Fractions

        - **Mastery**: 50% (needs 70%)
        - **Status**: Developing
        - **Responses**: 3
        - **Notes**: Mixes up numerator and denominator

        ## Next Steps

        1. Practice Fractions a little more.

        ---
        *Generated by Tutor at 2024-05-01 12:00:00 UTC*
        "###);
    }

    #[test]
    fn test_empty_report() {
        let report = Report::default();
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("# Study Guide: Untitled"));
        assert!(markdown.contains("*No concepts visited.*"));
        assert!(markdown.contains("*No specific recommendations.*"));
        assert!(markdown.contains("| Duration | 0s |"));
    }

    #[test]
    fn test_names_are_escaped() {
        let mut report = sample_report();
        report.concepts[0].name = "Powers (x^2) | roots".to_string();
        let markdown = MarkdownGenerator::new(&report).generate();
        assert!(markdown.contains(r"### Powers \(x^2\) \| roots"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
        assert_eq!(format_duration(3600), "1h");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.7), "70%");
        assert_eq!(format_percent(0.999), "100%");
        assert_eq!(format_percent(0.0), "0%");
    }
}
