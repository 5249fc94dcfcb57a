//! End-to-end tutoring sessions against the fixture concept bank.
//!
//! These tests drive a learner from topic selection through prerequisite
//! digressions to the requested concept, then turn the finished session
//! into a study guide.

use std::path::PathBuf;
use std::sync::Arc;

use tutor_engine::{
    ConceptGraph, Config, Directive, Session, SessionManager, SessionState, TurnOutcome,
    REDIRECT_MESSAGE,
};
use tutor_report::{MarkdownGenerator, MasteryStatus, Report, SessionRecord};

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn load_fixtures() -> (Arc<ConceptGraph>, Config) {
    let config =
        Config::load_from_file(&fixture_path().join("tutor.json")).expect("Failed to load config");
    let graph = ConceptGraph::load(fixture_path().join(&config.concept_bank))
        .expect("Failed to load concept bank")
        .with_threshold_overrides(&config.mastery_thresholds)
        .expect("Failed to apply thresholds");
    (Arc::new(graph), config)
}

fn manager() -> SessionManager {
    let (graph, config) = load_fixtures();
    SessionManager::new(graph, &config)
}

/// The right answer for whichever question is outstanding.
fn correct_answer(session: &Session) -> &'static str {
    match session.current_step.as_deref() {
        Some("m-check-1") => "It's 12",
        Some("m-check-2") => "42",
        Some("d-check-1") => "four",
        Some("f-check-1") => "1/2",
        Some("f-check-2") => "3/4",
        Some("f-check-3") => "5/8",
        other => panic!("No question outstanding: {other:?}"),
    }
}

fn step_ids(outcome: &TurnOutcome) -> Vec<String> {
    match outcome {
        TurnOutcome::Taught { instructions, .. } => {
            instructions.iter().map(|i| i.step.id.clone()).collect()
        }
        other => panic!("Expected taught outcome, got: {other:?}"),
    }
}

/// Answers correctly until the session leaves `concept_id`, returning the
/// outcome of the turn that moved on.
fn answer_until_moved_on(
    manager: &SessionManager,
    session: &mut Session,
    concept_id: &str,
) -> TurnOutcome {
    for _ in 0..8 {
        let answer = correct_answer(session);
        let outcome = manager
            .submit_response(session, answer)
            .expect("Turn failed");
        if session.current_concept.as_deref() != Some(concept_id) {
            return outcome;
        }
    }
    panic!("Session never moved on from {concept_id}");
}

// ============================================================================
// Fixture Tests
// ============================================================================

#[test]
fn test_fixtures_load() {
    let (graph, config) = load_fixtures();

    assert_eq!(graph.len(), 3);
    assert_eq!(config.suggestion_count, 2);
    assert!((graph.threshold_of("multiplication").unwrap() - 0.75).abs() < f64::EPSILON);
    assert!((graph.threshold_of("fractions").unwrap() - 0.7).abs() < f64::EPSILON);

    let order: Vec<&str> = graph.topological_order().map(|c| c.id.as_str()).collect();
    assert_eq!(order, vec!["multiplication", "division", "fractions"]);
}

// ============================================================================
// Session Flow Tests
// ============================================================================

#[test]
fn test_open_offers_ready_topics() {
    let manager = manager();
    let mut session = manager.create_session("ada");

    let prompt = manager.open(&mut session).expect("Failed to open");

    assert_eq!(session.state, SessionState::TopicSelection);
    // Ready topics come first, then the rest in teaching order.
    assert_eq!(prompt.suggestions, vec!["multiplication", "division"]);
}

#[test]
fn test_unknown_topic_keeps_learner_choosing() {
    let manager = manager();
    let mut session = manager.create_session("ada");
    manager.open(&mut session).expect("Failed to open");

    let outcome = manager
        .submit_response(&mut session, "medieval poetry")
        .expect("Turn failed");

    match outcome {
        TurnOutcome::TopicPrompt(prompt) => {
            assert_eq!(prompt.message, REDIRECT_MESSAGE);
            assert!(prompt.suggestions.len() <= 2);
        }
        other => panic!("Expected topic prompt, got: {other:?}"),
    }
    assert_eq!(session.state, SessionState::TopicSelection);
}

#[test]
fn test_full_session_walks_prerequisites_to_topic() {
    let manager = manager();
    let mut session = manager.create_session("ada");
    manager.open(&mut session).expect("Failed to open");

    // Fractions needs division, which needs multiplication.
    let outcome = manager
        .submit_response(&mut session, "fractions")
        .expect("Turn failed");
    assert_eq!(step_ids(&outcome), vec!["m-explain", "m-check-1"]);
    assert_eq!(session.stack.len(), 2);

    let outcome = answer_until_moved_on(&manager, &mut session, "multiplication");
    match &outcome {
        TurnOutcome::Taught { directive, .. } => assert_eq!(*directive, Some(Directive::Advance)),
        other => panic!("Expected taught outcome, got: {other:?}"),
    }
    assert_eq!(step_ids(&outcome), vec!["d-explain", "d-check-1"]);
    assert!(session.mastery["multiplication"].value() >= 0.75);

    let outcome = answer_until_moved_on(&manager, &mut session, "division");
    assert_eq!(step_ids(&outcome), vec!["f-explain", "f-example", "f-check-1"]);
    assert_eq!(session.current_concept.as_deref(), Some("fractions"));
    assert!(session.stack.is_empty());

    // One slip on the new concept, then the learner leaves.
    manager
        .submit_response(&mut session, "2/3")
        .expect("Turn failed");
    let outcome = manager
        .submit_response(&mut session, "I'm done")
        .expect("Turn failed");

    let TurnOutcome::Ended(summary) = outcome else {
        panic!("Expected the session to end");
    };
    assert!(session.is_terminal());

    let visited: Vec<&str> = summary.concepts.iter().map(|c| c.concept_id.as_str()).collect();
    assert_eq!(visited, vec!["multiplication", "division", "fractions"]);
    assert_eq!(summary.mastered_count(), 2);

    // The study guide reflects the same outcome.
    let record = SessionRecord::from_summary(&summary).expect("Failed to convert summary");
    let report = Report::from_session(&record, "fractions");

    assert_eq!(report.summary.concepts_mastered, 2);
    assert_eq!(report.concepts[2].status, MasteryStatus::Beginning);
    assert_eq!(report.recommendations, vec!["Revisit Fractions from the beginning."]);

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("# Study Guide: fractions"));
    assert!(markdown.contains("| Concepts Mastered | 2 of 3 |"));
}

#[test]
fn test_struggling_learner_is_reassured() {
    let manager = manager();
    let mut session = manager.create_session("ada");
    manager
        .submit_response(&mut session, "multiplication")
        .expect("Turn failed");

    manager
        .submit_response(&mut session, "7")
        .expect("Turn failed");
    let outcome = manager
        .submit_response(&mut session, "9")
        .expect("Turn failed");

    match outcome {
        TurnOutcome::Taught {
            directive,
            instructions,
            ..
        } => {
            assert_eq!(directive, Some(Directive::Simplify));
            assert!(instructions.last().is_some_and(|i| i.awaits_response));
        }
        other => panic!("Expected taught outcome, got: {other:?}"),
    }
    assert!(session.mastery["multiplication"].value().abs() < f64::EPSILON);
}

#[test]
fn test_closed_session_rejects_input() {
    let manager = manager();
    let mut session = manager.create_session("ada");
    manager
        .submit_response(&mut session, "multiplication")
        .expect("Turn failed");
    let summary = manager.end_session(&mut session).expect("Failed to end");

    assert!(manager.submit_response(&mut session, "12").is_err());
    assert_eq!(session.summary.as_ref(), Some(&summary));
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_saved_session_resumes_where_it_left_off() {
    let manager = manager();
    let path = std::env::temp_dir()
        .join(format!("tutor-it-{}", std::process::id()))
        .join("session.json");

    let mut session = manager.create_session("ada");
    manager
        .submit_response(&mut session, "multiplication")
        .expect("Turn failed");
    manager
        .submit_response(&mut session, "12")
        .expect("Turn failed");
    session.save(&path).await.expect("Failed to save");

    let mut restored = Session::load(&path)
        .await
        .expect("Failed to load")
        .expect("Session file missing");
    assert_eq!(restored.id, session.id);
    assert_eq!(restored.turn, 2);

    let pending = manager
        .pending_instruction(&restored)
        .expect("No pending question");
    assert_eq!(Some(pending.step.id.as_str()), session.current_step.as_deref());

    let answer = correct_answer(&restored);
    manager
        .submit_response(&mut restored, answer)
        .expect("Turn failed");
    assert_eq!(restored.turn, 3);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_reports_written_to_disk() {
    let manager = manager();
    let mut session = manager.create_session("ada");
    manager
        .submit_response(&mut session, "multiplication")
        .expect("Turn failed");
    manager
        .submit_response(&mut session, "12")
        .expect("Turn failed");
    let summary = manager.end_session(&mut session).expect("Failed to end");

    let record = SessionRecord::from_summary(&summary).expect("Failed to convert summary");
    let report = Report::from_session(&record, "Multiplication");
    let dir = std::env::temp_dir().join(format!("tutor-it-reports-{}", std::process::id()));

    let paths = report.write_reports(&dir).expect("Failed to write reports");
    assert_eq!(paths.len(), 3);

    let text = std::fs::read_to_string(dir.join("study-guide.txt")).expect("Missing text guide");
    assert!(text.contains("TUTOR - STUDY GUIDE"));
    assert!(text.contains("Generated on"));

    let _ = std::fs::remove_dir_all(&dir);
}
