//! Plain text study guide, for printing or terminals without Markdown.

use std::fmt::Write;

use crate::markdown::{format_duration, format_percent, format_timestamp};
use crate::Report;

const RULE_WIDTH: usize = 60;

/// Generates plain text study guides.
pub struct TextGenerator<'a> {
    report: &'a Report,
}

impl<'a> TextGenerator<'a> {
    /// Creates a new text generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete text document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();
        let rule = "=".repeat(RULE_WIDTH);
        let summary = &self.report.summary;

        let _ = writeln!(output, "{rule}");
        let _ = writeln!(output, "TUTOR - STUDY GUIDE");
        let _ = writeln!(output, "{rule}");
        let _ = writeln!(output, "Topic: {}", self.report.topic);
        let _ = writeln!(output, "Learner: {}", summary.learner_id);
        let _ = writeln!(
            output,
            "Turns: {}  Duration: {}",
            summary.turns,
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(
            output,
            "Mastered: {} of {}",
            summary.concepts_mastered, summary.concepts_visited
        );
        let _ = writeln!(output);

        let _ = writeln!(output, "CONCEPTS");
        let _ = writeln!(output, "{}", "-".repeat(RULE_WIDTH));
        if self.report.concepts.is_empty() {
            let _ = writeln!(output, "(none visited)");
        }
        for concept in &self.report.concepts {
            let _ = writeln!(
                output,
                "{:<30} {:>5} / {:<5} {}",
                concept.name,
                format_percent(concept.score),
                format_percent(concept.threshold),
                concept.status
            );
            if let Some(notes) = &concept.notes {
                let _ = writeln!(output, "    Notes: {notes}");
            }
        }
        let _ = writeln!(output);

        if !self.report.recommendations.is_empty() {
            let _ = writeln!(output, "NEXT STEPS");
            let _ = writeln!(output, "{}", "-".repeat(RULE_WIDTH));
            for rec in &self.report.recommendations {
                let _ = writeln!(output, "* {rec}");
            }
            let _ = writeln!(output);
        }

        let _ = writeln!(output, "{rule}");
        let _ = writeln!(
            output,
            "Generated on {}",
            format_timestamp(&self.report.generated_at)
        );

        output
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ConceptReport, MasteryStatus, ReportSummary};
    use chrono::{TimeZone, Utc};

    fn report() -> Report {
        Report {
            topic: "Fractions".to_string(),
            summary: ReportSummary {
                learner_id: "ada".to_string(),
                turns: 3,
                duration_seconds: 65,
                concepts_visited: 1,
                ..ReportSummary::default()
            },
            concepts: vec![ConceptReport {
                concept_id: "fractions".to_string(),
                name: "Fractions".to_string(),
                score: 0.5,
                threshold: 0.7,
                status: MasteryStatus::Developing,
                responses: 3,
                notes: Some("20 points short of the 70% goal after 3 answers.".to_string()),
            }],
            recommendations: vec!["Practice Fractions a little more.".to_string()],
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_banner_and_footer() {
        let text = TextGenerator::new(&report()).generate();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[1], "TUTOR - STUDY GUIDE");
        assert_eq!(lines.last().copied(), Some("Generated on 2024-05-01 12:00:00 UTC"));
        assert!(text.contains("Turns: 3  Duration: 1m 5s"));
        assert!(text.contains("Mastered: 0 of 1"));
    }

    #[test]
    fn test_concept_rows() {
        let text = TextGenerator::new(&report()).generate();
        let row = text
            .lines()
            .find(|l| l.starts_with("Fractions"))
            .unwrap();
        assert!(row.ends_with("Developing"));
        assert!(row.contains("50%"));
        assert!(text.contains("    Notes: 20 points short of the 70% goal after 3 answers."));
        assert!(text.contains("* Practice Fractions a little more."));
    }

    #[test]
    fn test_no_concepts() {
        let mut report = report();
        report.concepts.clear();
        report.recommendations.clear();
        let text = TextGenerator::new(&report).generate();
        assert!(text.contains("(none visited)"));
        assert!(!text.contains("NEXT STEPS"));
    }
}
