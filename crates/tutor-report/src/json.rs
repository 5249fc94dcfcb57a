//! JSON study guide generation.
//!
//! [`JsonGenerator`] serializes a [`Report`] as compact single-line JSON or
//! pretty-printed for reading.
//!
//! # Example
//!
//! ```rust
//! use tutor_report::{Report, json::JsonGenerator};
//!
//! let report = Report::default();
//! let generator = JsonGenerator::new(&report);
//!
//! let compact = generator.generate().unwrap();
//! assert!(!compact.contains('\n'));
//!
//! let pretty = generator.generate_pretty().unwrap();
//! assert!(pretty.contains("\"topic\""));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{Report, ReportError, Result};

/// JSON report generator.
pub struct JsonGenerator<'a> {
    report: &'a Report,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates compact JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the JSON report to `path`, creating or overwriting it.
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ConceptReport, MasteryStatus, ReportSummary};
    use chrono::{TimeZone, Utc};

    fn sample_report() -> Report {
        Report {
            topic: "Fractions".to_string(),
            summary: ReportSummary {
                learner_id: "ada".to_string(),
                session_id: "s1".to_string(),
                turns: 4,
                duration_seconds: 300,
                concepts_visited: 1,
                concepts_mastered: 0,
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
    fn test_generate_compact() {
        let json = JsonGenerator::new(&sample_report()).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains(r#""topic":"Fractions""#));
        assert!(json.contains(r#""status":"developing""#));
        assert!(json.contains(r#""generated_at":"2024-05-01T12:00:00Z""#));
    }

    #[test]
    fn test_generate_pretty_parses_back() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();

        assert!(json.contains("\n  \"summary\""));
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_write_to_file() {
        let path = std::env::temp_dir().join(format!("tutor-json-{}.json", std::process::id()));
        JsonGenerator::new(&sample_report())
            .write_to_file(&path, false)
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.ends_with('\n'));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let path = Path::new("/nonexistent-tutor-dir/study-guide.json");
        let err = JsonGenerator::new(&sample_report())
            .write_to_file(path, true)
            .unwrap_err();
        assert!(matches!(err, ReportError::Io(_)));
    }
}
