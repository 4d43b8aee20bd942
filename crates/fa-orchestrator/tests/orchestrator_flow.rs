//! End-to-end orchestrator tests over the in-memory broker

mod common;

use std::time::Duration;

use serde_json::json;

use common::Harness;
use fa_core::{ConnectionError, SubmissionError};
use fa_orchestrator::{render, FlowError, FlowState};
use fa_protocol::{StageName, StageStatus};

#[tokio::test]
async fn test_scenario_a_in_order_results_reach_done() {
    let h = Harness::new();
    h.backend.accept("S1");

    h.orchestrator.submit(Harness::image()).await.unwrap();
    let state = h.orchestrator.state();
    assert_eq!(state.flow, FlowState::InProgress);
    assert_eq!(state.session_id.as_ref().map(|s| s.as_str()), Some("S1"));
    assert_eq!(h.broker.total_subscriptions(), 6);

    h.result("S1", StageName::FaceShape, json!("oval")).await;
    h.result("S1", StageName::Features, json!({"eyes": "bright"})).await;
    h.result_with_summary("S1", StageName::Overall, json!({"fortune": "good"}), "A lucky year")
        .await;

    let done = h.wait_for("done", |s| s.flow == FlowState::Done).await;
    let composite = done.composite.expect("composite result");
    assert_eq!(composite.face_shape, json!("oval"));
    assert_eq!(composite.features, json!({"eyes": "bright"}));
    assert_eq!(composite.overall, json!({"fortune": "good"}));
    assert_eq!(composite.summary.as_deref(), Some("A lucky year"));
    assert!(done.error.is_none());
}

#[tokio::test]
async fn test_scenario_b_out_of_order_results_match_in_order() {
    let ordered = Harness::new();
    ordered.backend.accept("S1");
    ordered.orchestrator.submit(Harness::image()).await.unwrap();
    ordered.result("S1", StageName::FaceShape, json!(1)).await;
    ordered.result("S1", StageName::Features, json!(2)).await;
    ordered.result("S1", StageName::Overall, json!(3)).await;
    let a = ordered.wait_for("done", |s| s.flow == FlowState::Done).await;

    let shuffled = Harness::new();
    shuffled.backend.accept("S1");
    shuffled.orchestrator.submit(Harness::image()).await.unwrap();
    shuffled.result("S1", StageName::FaceShape, json!(1)).await;
    shuffled.result("S1", StageName::Overall, json!(3)).await;
    shuffled.result("S1", StageName::Features, json!(2)).await;
    let b = shuffled.wait_for("done", |s| s.flow == FlowState::Done).await;

    assert_eq!(a.composite, b.composite);
    assert!(a.composite.is_some());
}

#[tokio::test]
async fn test_scenario_c_stage_error_does_not_abort_siblings() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.error("S1", Some(StageName::Features), "model crashed").await;
    h.result("S1", StageName::Overall, json!({"fortune": "good"})).await;

    let state = h
        .wait_for("overall result", |s| s.stage(StageName::Overall).status() == StageStatus::Completed)
        .await;
    assert_eq!(state.flow, FlowState::InProgress);
    assert_eq!(state.stage(StageName::Features).status(), StageStatus::Failed);
    assert_eq!(state.stage(StageName::Features).error_detail(), Some("model crashed"));
    assert_eq!(
        state.error,
        Some(FlowError::Stage {
            failures: vec![(StageName::Features, "model crashed".into())]
        })
    );

    // The last outstanding stage settles the session as failed, keeping partial results
    h.result("S1", StageName::FaceShape, json!("oval")).await;
    let failed = h.wait_for("failed", |s| s.flow == FlowState::Failed).await;
    assert_eq!(failed.stage(StageName::FaceShape).result(), Some(&json!("oval")));
    assert!(failed.composite.is_none());
    assert!(render(&failed).can_retake);
}

#[tokio::test]
async fn test_scenario_d_retake_drops_stale_deliveries() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.result("S1", StageName::FaceShape, json!("oval")).await;
    h.status("S1", StageName::Features, "processing").await;
    h.status("S1", StageName::Overall, "processing").await;
    h.wait_for("stages processing", |s| {
        s.stage(StageName::Overall).status() == StageStatus::Processing
    })
    .await;

    h.orchestrator.retake().await;

    assert_eq!(h.result("S1", StageName::Features, json!("late")).await, 0);
    let state = h.orchestrator.state();
    assert!(state.is_idle_baseline(), "not idle: {:?}", state);
    assert_eq!(h.broker.total_subscriptions(), 0);
    assert_eq!(h.broker.open_links(), 0);
}

#[tokio::test]
async fn test_scenario_e_backend_error_fails_without_connecting() {
    let h = Harness::new();
    h.backend.reject(SubmissionError::Rejected {
        status: 500,
        message: "pipeline down".into(),
    });

    let err = h.orchestrator.submit(Harness::image()).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Rejected { status: 500, .. }));

    let state = h.orchestrator.state();
    assert_eq!(state.flow, FlowState::Failed);
    assert!(matches!(state.error, Some(FlowError::Submission(_))));
    assert_eq!(h.broker.opens(), 0);
    assert!(h.orchestrator.connection_status().is_none());
}

#[tokio::test]
async fn test_missing_session_id_is_a_submission_error() {
    let h = Harness::new();
    h.backend.reject(SubmissionError::MissingSessionId);

    assert_eq!(
        h.orchestrator.submit(Harness::image()).await,
        Err(SubmissionError::MissingSessionId)
    );
    assert_eq!(h.orchestrator.state().flow, FlowState::Failed);
    assert_eq!(h.broker.opens(), 0);
}

#[tokio::test]
async fn test_duplicate_results_are_ignored() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.result("S1", StageName::FaceShape, json!("oval")).await;
    h.result("S1", StageName::FaceShape, json!("round")).await;
    h.error("S1", Some(StageName::FaceShape), "late failure").await;
    h.status("S1", StageName::Features, "processing").await;

    let state = h
        .wait_for("features processing", |s| {
            s.stage(StageName::Features).status() == StageStatus::Processing
        })
        .await;
    assert_eq!(state.stage(StageName::FaceShape).result(), Some(&json!("oval")));
    assert!(state.error.is_none());
}

#[tokio::test]
async fn test_completed_hint_does_not_complete_early() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.result("S1", StageName::FaceShape, json!(1)).await;
    h.completed("S1").await;
    h.status("S1", StageName::Features, "processing").await;
    let state = h
        .wait_for("features processing", |s| {
            s.stage(StageName::Features).status() == StageStatus::Processing
        })
        .await;
    assert_eq!(state.flow, FlowState::InProgress);

    h.result("S1", StageName::Features, json!(2)).await;
    h.result("S1", StageName::Overall, json!(3)).await;
    h.wait_for("done", |s| s.flow == FlowState::Done).await;
}

#[tokio::test]
async fn test_job_level_error_fails_the_flow() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.error("S1", None, "quota exceeded").await;
    let state = h.wait_for("failed", |s| s.flow == FlowState::Failed).await;

    assert_eq!(state.error, Some(FlowError::Job("quota exceeded".into())));
    assert!(state.stages.values().all(|s| s.status() == StageStatus::Pending));
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.broker.publish("face-analysis/S1/status", "not json").await;
    h.status("S1", StageName::Features, "exploded").await;
    h.broker
        .publish_json("face-analysis/S1/status", &json!({"stage": "palm", "status": "processing"}))
        .await;
    h.status("S1", StageName::Overall, "processing").await;

    let state = h
        .wait_for("overall processing", |s| {
            s.stage(StageName::Overall).status() == StageStatus::Processing
        })
        .await;
    assert_eq!(state.flow, FlowState::InProgress);
    assert_eq!(state.stage(StageName::Features).status(), StageStatus::Pending);
}

#[tokio::test]
async fn test_transport_failure_is_a_connection_error() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.broker
        .fail_all(ConnectionError::Network("connection reset".into()))
        .await;
    let state = h.wait_for("failed", |s| s.flow == FlowState::Failed).await;
    assert_eq!(
        state.error,
        Some(FlowError::Connection(ConnectionError::Network("connection reset".into())))
    );

    // Retake after a failed transport is still clean
    h.orchestrator.retake().await;
    assert!(h.orchestrator.state().is_idle_baseline());
    assert!(h.orchestrator.connection_status().is_none());
}

#[tokio::test]
async fn test_open_failure_is_a_connection_error() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.broker
        .fail_next_open(ConnectionError::Auth("not authorized".into()));

    h.orchestrator.submit(Harness::image()).await.unwrap();
    let state = h.wait_for("failed", |s| s.flow == FlowState::Failed).await;

    let error = state.error.expect("connection error");
    assert_eq!(error, FlowError::Connection(ConnectionError::Auth("not authorized".into())));
    assert_eq!(error.hint(), "Authentication failed, reload and try again");
}

#[tokio::test]
async fn test_submit_while_busy_is_rejected() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    assert_eq!(
        h.orchestrator.submit(Harness::image()).await,
        Err(SubmissionError::Busy)
    );
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.orchestrator.state().flow, FlowState::InProgress);
}

#[tokio::test]
async fn test_resubmit_tears_down_previous_session_first() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.backend.accept("S2");

    h.orchestrator.submit(Harness::image()).await.unwrap();
    h.error("S1", None, "quota exceeded").await;
    h.wait_for("failed", |s| s.flow == FlowState::Failed).await;

    h.orchestrator.submit(Harness::image()).await.unwrap();
    let state = h.orchestrator.state();
    assert_eq!(state.session_id.as_ref().map(|s| s.as_str()), Some("S2"));
    assert!(state.error.is_none());

    assert_eq!(h.broker.total_subscriptions(), 6);
    assert_eq!(h.broker.open_links(), 1);
    assert_eq!(h.result("S1", StageName::Overall, json!("old")).await, 0);
    assert_eq!(h.result("S2", StageName::Overall, json!("new")).await, 1);
}

#[tokio::test]
async fn test_retake_during_submission_abandons_the_attempt() {
    let h = Harness::new();
    h.backend.accept("S1");
    let gate = h.backend.hold_next();

    let orchestrator = h.orchestrator.clone();
    let submit = tokio::spawn(async move { orchestrator.submit(Harness::image()).await });

    h.wait_for("submitting", |s| s.flow == FlowState::Submitting).await;
    h.orchestrator.retake().await;
    gate.notify_one();

    assert_eq!(submit.await.unwrap(), Ok(()));
    assert!(h.orchestrator.state().is_idle_baseline());
    assert_eq!(h.broker.opens(), 0);
}

#[tokio::test]
async fn test_retake_without_session_is_safe() {
    let h = Harness::new();
    h.orchestrator.retake().await;
    h.orchestrator.retake().await;
    h.orchestrator.teardown().await;

    assert!(h.orchestrator.state().is_idle_baseline());
}

#[tokio::test]
async fn test_concurrent_retake_and_teardown_release_once() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();
    assert_eq!(h.broker.open_links(), 1);

    tokio::join!(h.orchestrator.retake(), h.orchestrator.teardown());

    assert_eq!(h.broker.total_subscriptions(), 0);
    assert_eq!(h.broker.open_links(), 0);
    assert!(h.orchestrator.state().is_idle_baseline());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_reach_done() {
    for round in 0..25 {
        let h = Harness::new();
        h.backend.accept("S1");
        h.orchestrator.submit(Harness::image()).await.unwrap();

        let publishers: Vec<_> = StageName::ALL
            .iter()
            .map(|&stage| {
                let broker = h.broker.clone();
                tokio::spawn(async move {
                    let topic = format!("face-analysis/S1/result/{}", stage);
                    let body = json!({ "result": stage.as_str() });
                    broker.publish_json(&topic, &body).await;
                    broker.publish_json(&topic, &json!({ "result": "duplicate" })).await;
                })
            })
            .collect();
        for publisher in publishers {
            publisher.await.unwrap();
        }

        let done = h.wait_for("done", |s| s.flow == FlowState::Done).await;
        let composite = done.composite.unwrap_or_else(|| panic!("round {} has no composite", round));
        assert_eq!(composite.face_shape, json!(StageName::FaceShape.as_str()));
        assert_eq!(composite.features, json!(StageName::Features.as_str()));
        assert_eq!(composite.overall, json!(StageName::Overall.as_str()));

        h.orchestrator.retake().await;
        assert!(h.orchestrator.state().is_idle_baseline());
        assert_eq!(h.broker.total_subscriptions(), 0);
    }
}

#[tokio::test]
async fn test_connection_status_reports_subscriptions() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    let status = h.orchestrator.connection_status().expect("connection");
    assert!(status.connected);
    assert_eq!(status.session_id.as_str(), "S1");
    assert_eq!(status.active_subscriptions, 6);
}

#[tokio::test]
async fn test_check_event_leaves_flow_untouched() {
    let h = Harness::new();
    let access = h.orchestrator.check_event().await.unwrap();

    assert!(access.is_accessible);
    assert_eq!(access.event_name.as_deref(), Some("expo"));
    assert!(h.orchestrator.state().is_idle_baseline());
}

#[tokio::test]
async fn test_headline_follows_stage_progress() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();
    assert_eq!(render(&h.orchestrator.state()).headline, "Analyzing face shape...");

    h.result("S1", StageName::FaceShape, json!(1)).await;
    let state = h
        .wait_for("face shape", |s| s.stage(StageName::FaceShape).status() == StageStatus::Completed)
        .await;
    let view = render(&state);
    assert_eq!(view.headline, "Face shape complete! Analyzing features...");
    assert_eq!(view.stages[0].text, "✓ Completed");
    assert_eq!(view.stages[1].text, "Analyzing...");

    h.result("S1", StageName::Features, json!(2)).await;
    let state = h
        .wait_for("features", |s| s.stage(StageName::Features).status() == StageStatus::Completed)
        .await;
    assert_eq!(
        render(&state).headline,
        "Features complete! Running overall analysis..."
    );

    h.result("S1", StageName::Overall, json!(3)).await;
    let state = h.wait_for("done", |s| s.flow == FlowState::Done).await;
    let view = render(&state);
    assert_eq!(view.headline, "Analysis complete!");
    assert!(view.result_ready);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_session_times_out() {
    let h = Harness::with_stage_timeout(Duration::from_secs(1));
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    let state = h.wait_for("timeout", |s| s.flow == FlowState::Failed).await;
    assert_eq!(state.error, Some(FlowError::Timeout(Duration::from_secs(1))));
}

#[tokio::test(start_paused = true)]
async fn test_completed_session_does_not_time_out() {
    let h = Harness::with_stage_timeout(Duration::from_secs(1));
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    h.result("S1", StageName::FaceShape, json!(1)).await;
    h.result("S1", StageName::Features, json!(2)).await;
    h.result("S1", StageName::Overall, json!(3)).await;
    h.wait_for("done", |s| s.flow == FlowState::Done).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.orchestrator.state().flow, FlowState::Done);
}

#[tokio::test]
async fn test_wait_until_settled_returns_final_state() {
    let h = Harness::new();
    h.backend.accept("S1");
    h.orchestrator.submit(Harness::image()).await.unwrap();

    let orchestrator = h.orchestrator.clone();
    let waiter = tokio::spawn(async move { orchestrator.wait_until_settled().await });

    h.result("S1", StageName::FaceShape, json!(1)).await;
    h.result("S1", StageName::Features, json!(2)).await;
    h.result("S1", StageName::Overall, json!(3)).await;

    let settled = tokio::time::timeout(common::WAIT, waiter).await.unwrap().unwrap();
    assert_eq!(settled.flow, FlowState::Done);
}
