mod common;

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::{grade_json, Harness, ScriptedProvider};
use submission_grading::error::ProviderError;
use submission_grading::infrastructure::DurableStore;
use submission_grading::models::estimate_processing_time;
use submission_grading::services::{EventKind, SettingsService};
use submission_grading::{
    aggregate, Analysis, GradingConstraints, StatisticsScope, SubmissionStatus, SubmitRequest, ThresholdScale,
};

fn request(student: Uuid, content: &str) -> SubmitRequest {
    SubmitRequest::new(student, "Ines", "Binary search", content)
}

#[tokio::test]
async fn test_submit_then_read_returns_verbatim_content() {
    let h = Harness::new(ScriptedProvider::always(8));
    let content = "  fn search(v: &[i32]) -> Option<usize> {\n\tNone\n}  ";

    let submission = assert_ok!(h.lifecycle.submit(request(Uuid::new_v4(), content)).await);
    let read_back = h.lifecycle.submission(submission.id).await.unwrap();

    assert_eq!(read_back.status, SubmissionStatus::Created);
    assert_eq!(read_back.content, content);
    let durable = h.durable.find_submission(submission.id).await.unwrap().unwrap();
    assert_eq!(durable.content, content);
}

#[tokio::test]
async fn test_out_of_range_grade_is_clamped() {
    let h = Harness::new(ScriptedProvider::new(vec![
        Ok(grade_json(42, &["x"])),
        Ok(grade_json(-3, &["x"])),
    ]));

    let high = h.flow.submit_and_grade(request(Uuid::new_v4(), "a")).await.unwrap();
    let low = h.flow.submit_and_grade(request(Uuid::new_v4(), "b")).await.unwrap();

    assert_eq!(high.feedback.grade, 10);
    assert_eq!(low.feedback.grade, 1);
    assert_eq!(h.durable.find_feedback(high.submission_id).await.unwrap().unwrap().grade, 10);

    let constraints = GradingConstraints::default();
    for raw in [-7_i64, 0, 5, 10, 99] {
        let once = constraints.clamp(raw);
        assert_eq!(constraints.clamp(i64::from(once)), once);
    }
}

#[tokio::test]
async fn test_every_provider_failure_ends_rejected_with_zero() {
    let failures: Vec<Result<String, ProviderError>> = vec![
        Err(ProviderError::BadStatus(500)),
        Err(ProviderError::RequestFailed("connection reset".to_string())),
        Ok(String::new()),
        Ok("{\"Grade\": 7".to_string()),
        Ok(r#"{"Grade": 7, "IdentifiedErrors": []}"#.to_string()),
        Ok(r#"{"Grade": "7", "IdentifiedErrors": [], "ImprovementSuggestions": [], "FurtherRecommendations": []}"#
            .to_string()),
    ];

    for failure in failures {
        let h = Harness::new(ScriptedProvider::new(vec![failure]));
        let outcome = h.flow.submit_and_grade(request(Uuid::new_v4(), "x")).await.unwrap();

        assert_eq!(outcome.status, SubmissionStatus::Rejected);
        assert_eq!(outcome.feedback.grade, 0);
        assert_eq!(outcome.feedback.identified_problems, Analysis::fallback().identified_problems);

        let stored = h.lifecycle.submission(outcome.submission_id).await.unwrap();
        assert_eq!(stored.status, SubmissionStatus::Rejected);
    }
}

#[tokio::test]
async fn test_provider_timeout_ends_rejected() {
    let provider = ScriptedProvider::always(9).with_delay(Duration::from_millis(300));
    let h = Harness::with_timeout(provider, Duration::from_millis(20));

    let outcome = h.flow.submit_and_grade(request(Uuid::new_v4(), "slow")).await.unwrap();

    assert_eq!(outcome.status, SubmissionStatus::Rejected);
    assert!(Analysis {
        grade: outcome.feedback.grade,
        identified_problems: outcome.feedback.identified_problems.clone(),
        improvement_suggestions: outcome.feedback.improvement_suggestions.clone(),
        further_recommendations: outcome.feedback.further_recommendations.clone(),
    }
    .is_fallback());
}

#[tokio::test]
async fn test_aggregate_over_graded_pipeline() {
    let h = Harness::new(ScriptedProvider::new(vec![
        Ok(grade_json(9, &["naming"])),
        Ok(grade_json(7, &["naming", "no tests"])),
        Ok(grade_json(4, &["no tests"])),
        Err(ProviderError::BadStatus(502)),
    ]));
    let student = Uuid::new_v4();
    for content in ["a", "b", "c", "d"] {
        h.flow.submit_and_grade(request(student, content)).await.unwrap();
    }

    let feedback = h.lifecycle.all_feedback().await;
    assert_eq!(feedback.len(), 4);

    let snapshot = aggregate(&feedback, ThresholdScale::TEN_POINT);
    assert_eq!(snapshot.total, 3);
    assert_eq!(snapshot.average_grade, 6.67);
    assert_eq!(snapshot.grade_distribution.values().sum::<usize>(), snapshot.total);
    assert_eq!(snapshot.problem_frequency.get("no tests"), Some(&2));
    assert_eq!(snapshot.buckets.high, 1);

    let empty = aggregate(&[], ThresholdScale::TEN_POINT);
    assert_eq!(empty.total, 0);
    assert_eq!(empty.average_grade, 0.0);
}

#[tokio::test]
async fn test_reevaluation_keeps_reviewer_comment() {
    let h = Harness::new(ScriptedProvider::new(vec![
        Ok(grade_json(5, &["off by one"])),
        Ok(grade_json(9, &["minor style"])),
    ]));
    let first = h.flow.submit_and_grade(request(Uuid::new_v4(), "lo + hi / 2")).await.unwrap();
    h.lifecycle
        .add_reviewer_comment(first.submission_id, "overflow in midpoint")
        .await
        .unwrap();

    let second = h.flow.reevaluate(first.submission_id, Some("focus on overflow")).await.unwrap();

    assert_eq!(second.feedback.grade, 9);
    assert_eq!(second.feedback.identified_problems, vec!["minor style"]);
    assert_eq!(second.feedback.reviewer_comment.as_deref(), Some("overflow in midpoint"));
    let durable = h.durable.find_feedback(first.submission_id).await.unwrap().unwrap();
    assert_eq!(durable.reviewer_comment.as_deref(), Some("overflow in midpoint"));

    let prompts = h.provider.prompts();
    assert!(prompts[1].user.contains("Additional instructions: focus on overflow"));
}

#[tokio::test]
async fn test_comment_edited_during_reevaluation_survives() {
    let provider = ScriptedProvider::new(vec![Ok(grade_json(5, &["a"])), Ok(grade_json(8, &["b"]))])
        .with_delay(Duration::from_millis(200));
    let h = std::sync::Arc::new(Harness::new(provider));
    let first = h.flow.submit_and_grade(request(Uuid::new_v4(), "x")).await.unwrap();
    h.lifecycle.add_reviewer_comment(first.submission_id, "old").await.unwrap();

    let running = {
        let h = h.clone();
        tokio::spawn(async move { h.flow.reevaluate(first.submission_id, None).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.lifecycle.add_reviewer_comment(first.submission_id, "edited").await.unwrap();

    let second = running.await.unwrap().unwrap();

    assert_eq!(second.feedback.grade, 8);
    assert_eq!(second.feedback.reviewer_comment.as_deref(), Some("edited"));
    let durable = h.durable.find_feedback(first.submission_id).await.unwrap().unwrap();
    assert_eq!(durable.reviewer_comment.as_deref(), Some("edited"));
}

#[tokio::test]
async fn test_purge_removes_student_from_statistics() {
    let h = Harness::new(ScriptedProvider::always(6));
    let leaving = Uuid::new_v4();
    let staying = Uuid::new_v4();
    h.flow.submit_and_grade(request(leaving, "a")).await.unwrap();
    h.flow.submit_and_grade(request(leaving, "b")).await.unwrap();
    h.flow.submit_and_grade(request(staying, "c")).await.unwrap();

    assert_eq!(h.lifecycle.purge(leaving).await.unwrap(), 2);
    assert_eq!(h.lifecycle.purge(leaving).await.unwrap(), 0);

    let feedback = h.lifecycle.all_feedback().await;
    let snapshot = aggregate(StatisticsScope::All.select(&feedback), ThresholdScale::TEN_POINT);
    assert_eq!(snapshot.total, 1);
    assert!(feedback.iter().all(|f| f.student_id == staying));
    assert!(h.durable.find_feedback_by_student(leaving).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_purge_with_failing_durable_deletes_reports_removed_count() {
    let h = Harness::new(ScriptedProvider::always(6));
    let student = Uuid::new_v4();
    h.flow.submit_and_grade(request(student, "a")).await.unwrap();

    h.durable.fail_deletes(true);
    assert_eq!(h.lifecycle.purge(student).await.unwrap(), 1);
    assert!(h.lifecycle.submissions_by_student(student).await.is_empty());
    assert_eq!(h.durable.find_submissions_by_student(student).await.unwrap().len(), 1);

    // 持久化副本仍在，恢复后再次删除
    h.durable.fail_deletes(false);
    assert_eq!(h.lifecycle.purge(student).await.unwrap(), 1);
    assert_eq!(h.lifecycle.purge(student).await.unwrap(), 0);
}

#[tokio::test]
async fn test_estimated_duration_tiers() {
    let h = Harness::new(ScriptedProvider::always(6));
    let short = h.lifecycle.submit(request(Uuid::new_v4(), &"a".repeat(500))).await.unwrap();
    let medium = h.lifecycle.submit(request(Uuid::new_v4(), &"a".repeat(4000))).await.unwrap();

    assert_eq!(short.estimated_duration(), Duration::from_secs(60));
    assert_eq!(medium.estimated_duration(), Duration::from_secs(180));

    let mut previous = Duration::ZERO;
    for len in (0..=12_000).step_by(250) {
        let current = estimate_processing_time(&"é".repeat(len));
        assert!(current >= previous, "长度 {} 的预估时间变短了", len);
        previous = current;
    }
}

#[tokio::test]
async fn test_settings_are_read_on_every_evaluation() {
    let h = Harness::new(ScriptedProvider::always(57));
    let settings = SettingsService::new(h.state.clone());

    let before = h.flow.submit_and_grade(request(Uuid::new_v4(), "a")).await.unwrap();
    assert_eq!(before.feedback.grade, 10);

    settings
        .update_constraints(GradingConstraints::new(0, 100, vec!["complexity".to_string()]).unwrap())
        .await
        .unwrap();
    let after = h.flow.submit_and_grade(request(Uuid::new_v4(), "b")).await.unwrap();

    assert_eq!(after.feedback.grade, 57);
    assert!(h.provider.prompts()[1].user.contains("[0-100]"));
}

#[tokio::test]
async fn test_submission_limit_from_settings() {
    let h = Harness::new(ScriptedProvider::always(6));
    SettingsService::new(h.state.clone()).set_max_submissions(Some(2)).await.unwrap();
    let student = Uuid::new_v4();

    assert_ok!(h.lifecycle.submit(request(student, "1")).await);
    assert_ok!(h.lifecycle.submit(request(student, "2")).await);
    let err = assert_err!(h.lifecycle.submit(request(student, "3")).await);
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_events_follow_the_lifecycle() {
    let h = Harness::new(ScriptedProvider::always(8));
    let mut events = h.notifier.subscribe(&[]);

    let outcome = h.flow.submit_and_grade(request(Uuid::new_v4(), "x")).await.unwrap();

    let created = events.recv().await.unwrap();
    assert_eq!(created.kind, EventKind::SubmissionCreated);
    assert_eq!(created.estimated_secs, Some(60));

    let evaluating = events.recv().await.unwrap();
    assert_eq!(evaluating.kind, EventKind::StatusChanged);
    assert_eq!(evaluating.status, Some(SubmissionStatus::Evaluating));

    let graded = events.recv().await.unwrap();
    assert_eq!(graded.status, Some(SubmissionStatus::Graded));
    assert_eq!(graded.grade, Some(8));
    assert_eq!(graded.submission_id, Some(outcome.submission_id));
    assert!(graded.evaluated_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grading() {
    let h = std::sync::Arc::new(Harness::new(
        ScriptedProvider::always(7).with_delay(Duration::from_millis(10)),
    ));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                h.flow
                    .submit_and_grade(request(Uuid::new_v4(), &format!("task {i}")))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.status, SubmissionStatus::Graded);
    }
    assert_eq!(h.lifecycle.submissions_by_status(SubmissionStatus::Graded).await.len(), 16);
    assert_eq!(h.durable.all_feedback().await.unwrap().len(), 16);
}
