//! Integration tests for checkpointing and resume
//!
//! These tests verify that:
//! - A run resumed from any checkpoint ends in the same state as an uninterrupted run
//! - Suspended runs restore their pending node and awaiting request
//! - Incompatible checkpoints are rejected before anything executes
//! - The run service recovers runs from durable checkpoints

use std::sync::Arc;
use std::time::Duration;

use agency_graph::campaign::{build_campaign_graph, campaign_engine, CampaignBrief, PipelineConfig};
use agency_graph::collaborators::{Collaborators, RecordingPublisher, ScriptedScorer};
use agency_graph::engine::{
    Checkpointer, CheckpointerConfig, Delta, ErrorKind, Executor, ExecutorConfig, FileCheckpointer,
    GraphError, MemoryCheckpointer, NodeName, RetryPolicy, RunControl, RunStatus,
};
use tempfile::TempDir;

fn checkpointing_config() -> ExecutorConfig {
    ExecutorConfig::default()
        .with_checkpoint_interval(1)
        .with_retry_policy(
            RetryPolicy::new(2)
                .with_backoff_base(Duration::from_millis(1))
                .with_backoff_max(Duration::from_millis(5)),
        )
}

fn executor(
    pipeline: &PipelineConfig,
    collaborators: &Collaborators,
    checkpointer: Arc<dyn Checkpointer>,
) -> Executor {
    let graph = build_campaign_graph(pipeline, collaborators).expect("Failed to build graph");
    Executor::new(Arc::new(graph), checkpointing_config()).with_checkpointer(checkpointer)
}

// =============================================================================
// Resume fidelity
// =============================================================================

#[tokio::test]
async fn test_resume_from_every_step_matches_uninterrupted_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let run_id = "fidelity";
    let pipeline = PipelineConfig::default().with_max_revisions(2);
    let collaborators =
        || Collaborators::stub().with_scorer(Arc::new(ScriptedScorer::always_reject()));

    let checkpointer = Arc::new(FileCheckpointer::new(temp_dir.path(), run_id, true));
    let full = executor(&pipeline, &collaborators(), checkpointer.clone())
        .run(run_id, CampaignBrief::new("X").to_state(), &RunControl::new())
        .await;
    assert_eq!(full.failure.as_ref().unwrap().kind, ErrorKind::RetryBudgetExceeded);

    let steps = checkpointer.list().await.expect("Failed to list checkpoints");
    assert_eq!(steps, (1..=full.steps).collect::<Vec<_>>());
    // the escalation step is stored as the failure
    let last = checkpointer.latest().await.unwrap().expect("last checkpoint");
    assert_eq!(last.failure, full.failure);
    assert!(last.pending.is_empty());

    for step in [1, 4, 5, 9, 11] {
        let checkpoint = checkpointer
            .load(step)
            .await
            .expect("Failed to load checkpoint")
            .expect("Checkpoint should exist");
        assert_eq!(checkpoint.state.version(), step as u64);

        // fresh executor, fresh collaborators, separate storage
        let resumed = executor(&pipeline, &collaborators(), Arc::new(MemoryCheckpointer::new()))
            .resume_from(checkpoint, Delta::new(), &RunControl::new())
            .await
            .expect("Resume should start");

        assert_eq!(resumed.status, full.status, "resumed from step {step}");
        assert_eq!(resumed.failure, full.failure);
        assert_eq!(resumed.steps, full.steps);
        assert_eq!(resumed.state.fields(), full.state.fields());
        assert_eq!(resumed.state.history(), full.state.history());
        // only new steps are traced
        assert_eq!(resumed.trace.len(), full.steps - step);
    }
}

#[tokio::test]
async fn test_successful_run_leaves_final_checkpoint() {
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let report = executor(
        &PipelineConfig::default(),
        &Collaborators::stub(),
        checkpointer.clone(),
    )
    .run("done", CampaignBrief::new("X").to_state(), &RunControl::new())
    .await;
    assert!(report.succeeded());

    let latest = checkpointer.latest().await.unwrap().expect("final checkpoint");
    assert_eq!(latest.step, report.steps);
    assert!(latest.pending.is_empty());
    assert!(latest.state.contains("final_content"));
}

// =============================================================================
// Suspension
// =============================================================================

#[tokio::test]
async fn test_suspended_run_resumes_with_decision() {
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let pipeline = PipelineConfig::default().with_human_approval(true);
    let executor = executor(&pipeline, &Collaborators::stub(), checkpointer.clone());

    let suspended = executor
        .run("hitl", CampaignBrief::new("X").to_state(), &RunControl::new())
        .await;
    assert_eq!(suspended.status, RunStatus::Suspended);
    assert_eq!(suspended.pending, vec![NodeName::new("human_approval")]);

    let checkpoint = checkpointer.latest().await.unwrap().unwrap();
    assert!(checkpoint.is_suspended());
    assert_eq!(checkpoint.step, suspended.steps);
    assert_eq!(checkpoint.awaiting, suspended.awaiting);

    // required field missing
    let err = executor
        .resume("hitl", Delta::new().with("human_feedback", "?"), &RunControl::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidTransition(_)));

    let report = executor
        .resume("hitl", Delta::new().with("human_decision", "approve"), &RunControl::new())
        .await
        .expect("Resume should start");

    assert_eq!(report.status, RunStatus::Succeeded);
    assert_eq!(report.state.get_str("approval_status"), Some("approved"));
    // the payload is its own merge, then human_approval and finalize
    assert_eq!(report.state.version(), suspended.state.version() + 3);
    assert!(report.state.history()[suspended.state.version() as usize]
        .writers
        .is_empty());
    assert_eq!(report.state.history().len() as u64, report.state.version());
}

// =============================================================================
// Incompatible checkpoints
// =============================================================================

#[tokio::test]
async fn test_incompatible_checkpoints_are_rejected() {
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let pipeline = PipelineConfig::default().with_human_approval(true);
    let executor = executor(&pipeline, &Collaborators::stub(), checkpointer.clone());

    executor
        .run("compat", CampaignBrief::new("X").to_state(), &RunControl::new())
        .await;
    let checkpoint = checkpointer.latest().await.unwrap().unwrap();

    let mut newer = checkpoint.clone();
    newer.format_version += 1;
    let err = executor
        .resume_from(newer, Delta::new().with("human_decision", "approve"), &RunControl::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Checkpoint);

    let mut foreign = checkpoint.clone();
    foreign.pending = vec![NodeName::new("translator")];
    let err = executor
        .resume_from(foreign, Delta::new().with("human_decision", "approve"), &RunControl::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StructuralGraph);

    let err = executor
        .resume("other-run", Delta::new().with("human_decision", "approve"), &RunControl::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::CheckpointMismatch { .. }));
}

#[tokio::test]
async fn test_checkpoint_survives_serialization() {
    let checkpointer = Arc::new(MemoryCheckpointer::new());
    let report = executor(
        &PipelineConfig::default().with_human_approval(true),
        &Collaborators::stub(),
        checkpointer.clone(),
    )
    .run("serde", CampaignBrief::new("X").to_state(), &RunControl::new())
    .await;
    assert_eq!(report.status, RunStatus::Suspended);

    let checkpoint = checkpointer.latest().await.unwrap().unwrap();
    let json = serde_json::to_string(&checkpoint).expect("Failed to serialize");
    let restored: agency_graph::engine::Checkpoint =
        serde_json::from_str(&json).expect("Failed to deserialize");

    assert_eq!(restored, checkpoint);
    assert_eq!(
        restored.awaiting.unwrap().required_fields,
        vec!["human_decision".to_string()]
    );
}

// =============================================================================
// Service recovery
// =============================================================================

#[tokio::test]
async fn test_engine_recovers_suspended_run_after_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let checkpoints = CheckpointerConfig::File {
        path: temp_dir.path().to_path_buf(),
        compression: true,
    };
    let pipeline = PipelineConfig::default().with_human_approval(true);

    let run_id = {
        let engine = campaign_engine(&pipeline, &Collaborators::stub(), checkpointing_config())
            .unwrap()
            .with_checkpoints(checkpoints.clone());
        let run_id = engine.submit(CampaignBrief::new("X").to_seed()).await.unwrap();
        assert_eq!(engine.wait(&run_id).await.unwrap().status, RunStatus::Suspended);
        run_id
    };

    let publisher = Arc::new(RecordingPublisher::new());
    let collaborators = Collaborators::stub().with_publisher(publisher.clone());
    let engine = campaign_engine(&pipeline, &collaborators, checkpointing_config())
        .unwrap()
        .with_checkpoints(checkpoints);

    let view = engine.recover(&run_id).await.expect("Recovery should succeed");
    assert_eq!(view.status, RunStatus::Suspended);
    assert_eq!(view.required_fields(), ["human_decision".to_string()]);

    engine
        .resume(&run_id, Delta::new().with("human_decision", "approve"))
        .await
        .unwrap();
    let view = engine.wait(&run_id).await.unwrap();

    assert_eq!(view.status, RunStatus::Succeeded);
    assert_eq!(view.receipts.len(), 1);
    assert_eq!(publisher.published().await[0].0, "blog");
}

#[tokio::test]
async fn test_engine_recovers_escalated_run_as_failed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let checkpoints = CheckpointerConfig::File {
        path: temp_dir.path().to_path_buf(),
        compression: false,
    };
    let pipeline = PipelineConfig::default().with_max_revisions(2);
    let collaborators =
        || Collaborators::stub().with_scorer(Arc::new(ScriptedScorer::always_reject()));

    let (run_id, failed) = {
        let engine = campaign_engine(&pipeline, &collaborators(), checkpointing_config())
            .unwrap()
            .with_checkpoints(checkpoints.clone());
        let run_id = engine.submit(CampaignBrief::new("X").to_seed()).await.unwrap();
        let view = engine.wait(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Failed);
        (run_id, view)
    };

    let engine = campaign_engine(&pipeline, &collaborators(), checkpointing_config())
        .unwrap()
        .with_checkpoints(checkpoints);
    let view = engine.recover(&run_id).await.expect("Recovery should succeed");

    assert_eq!(view.status, RunStatus::Failed);
    assert_eq!(view.failure, failed.failure);
    assert_eq!(view.escalation, failed.escalation);
    assert!(view.state.contains("escalation_reason"));
    assert!(matches!(
        engine.resume(&run_id, Delta::new()).await,
        Err(GraphError::InvalidTransition(_))
    ));
}

#[cfg(feature = "checkpointer-sqlite")]
#[tokio::test]
async fn test_sqlite_checkpointer_suspend_and_resume() {
    use agency_graph::engine::SqliteCheckpointer;

    let checkpointer = Arc::new(
        SqliteCheckpointer::new(":memory:", "sqlite-run")
            .await
            .expect("Failed to open SQLite"),
    );
    let executor = executor(
        &PipelineConfig::default().with_human_approval(true),
        &Collaborators::stub(),
        checkpointer.clone(),
    );

    let report = executor
        .run("sqlite-run", CampaignBrief::new("X").to_state(), &RunControl::new())
        .await;
    assert_eq!(report.status, RunStatus::Suspended);
    assert_eq!(checkpointer.list().await.unwrap().len(), report.steps);

    let report = executor
        .resume("sqlite-run", Delta::new().with("human_decision", "approve"), &RunControl::new())
        .await
        .unwrap();
    assert!(report.succeeded());
}
