//! Run service: submission, status, pause, cancel and resume
//!
//! Each submitted run gets a uuid, its own checkpointer and a background
//! task that drives the [`Executor`]. Observers read a [`RunView`] snapshot
//! published through a `watch` channel.
//!
//! # Example
//!
//! ```ignore
//! let engine = CampaignEngine::new(graph, ExecutorConfig::default())
//!     .with_checkpoints(CheckpointerConfig::File { path: "./checkpoints".into(), compression: true });
//!
//! let run_id = engine.submit(brief.to_seed()).await?;
//! let view = engine.wait(&run_id).await?;
//! if view.status == RunStatus::Suspended {
//!     engine.resume(&run_id, Delta::new().with("human_decision", "approve")).await?;
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::collaborators::Receipt;
use crate::engine::{
    create_checkpointer, node_statuses, to_mermaid_with_status, AwaitingInput, Checkpointer,
    CheckpointerConfig, Delta, Escalation, Executor, ExecutorConfig, Graph, GraphError, NodeName,
    RunControl, RunFailure, RunReport, RunStatus, StateContainer, StepRecord,
};

/// Called once with the final state of every succeeded run
#[async_trait]
pub trait PublishHook: Send + Sync {
    async fn publish(&self, run_id: &str, state: Arc<StateContainer>) -> anyhow::Result<Vec<Receipt>>;
}

/// Snapshot of a run for observers
#[derive(Debug, Clone)]
pub struct RunView {
    pub run_id: String,
    pub status: RunStatus,
    pub steps: usize,
    pub state_version: u64,
    pub state: Arc<StateContainer>,
    pub pending: Vec<NodeName>,
    /// Set while suspended for human input
    pub awaiting: Option<AwaitingInput>,
    pub escalation: Option<Escalation>,
    pub failure: Option<RunFailure>,
    /// Every step executed, across resumes
    pub trace: Vec<StepRecord>,
    pub receipts: Vec<Receipt>,
    pub publish_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunView {
    fn new(run_id: String, state: Arc<StateContainer>, created_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: RunStatus::Pending,
            steps: 0,
            state_version: state.version(),
            state,
            pending: Vec::new(),
            awaiting: None,
            escalation: None,
            failure: None,
            trace: Vec::new(),
            receipts: Vec::new(),
            publish_error: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Fields a reviewer must supply to resume
    pub fn required_fields(&self) -> &[String] {
        self.awaiting
            .as_ref()
            .map(|a| a.required_fields.as_slice())
            .unwrap_or_default()
    }

    fn apply(&mut self, report: RunReport) {
        self.status = report.status;
        self.steps = report.steps;
        self.state_version = report.state.version();
        self.state = report.state;
        self.pending = report.pending;
        self.awaiting = report.awaiting;
        self.escalation = report.escalation.or(self.escalation.take());
        self.failure = report.failure;
        self.trace.extend(report.trace);
        self.updated_at = Utc::now();
    }
}

/// Per-run bookkeeping
struct RunHandle {
    checkpointer: Arc<dyn Checkpointer>,
    control: Mutex<RunControl>,
    view: watch::Sender<RunView>,
}

impl RunHandle {
    fn new(checkpointer: Arc<dyn Checkpointer>, view: RunView) -> Self {
        let (view, _) = watch::channel(view);
        Self {
            checkpointer,
            control: Mutex::new(RunControl::new()),
            view,
        }
    }

    fn snapshot(&self) -> RunView {
        self.view.borrow().clone()
    }
}

/// Registry and driver of campaign runs
#[derive(Clone)]
pub struct CampaignEngine {
    graph: Arc<Graph>,
    config: ExecutorConfig,
    checkpoints: CheckpointerConfig,
    publish_hook: Option<Arc<dyn PublishHook>>,
    runs: Arc<RwLock<HashMap<String, Arc<RunHandle>>>>,
}

impl CampaignEngine {
    pub fn new(graph: Graph, config: ExecutorConfig) -> Self {
        Self {
            graph: Arc::new(graph),
            config,
            checkpoints: CheckpointerConfig::default(),
            publish_hook: None,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Where runs keep their checkpoints (in memory by default)
    pub fn with_checkpoints(mut self, checkpoints: CheckpointerConfig) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_publish_hook(mut self, hook: Arc<dyn PublishHook>) -> Self {
        self.publish_hook = Some(hook);
        self
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn executor(&self, checkpointer: Arc<dyn Checkpointer>) -> Executor {
        Executor::new(Arc::clone(&self.graph), self.config.clone()).with_checkpointer(checkpointer)
    }

    async fn handle(&self, run_id: &str) -> Result<Arc<RunHandle>, GraphError> {
        self.runs
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| GraphError::UnknownRun(run_id.to_string()))
    }

    /// Start a run from a seed field map; returns its id immediately
    pub async fn submit(&self, seed: BTreeMap<String, Value>) -> Result<String, GraphError> {
        let run_id = Uuid::new_v4().to_string();
        let checkpointer: Arc<dyn Checkpointer> =
            Arc::from(create_checkpointer(self.checkpoints.clone(), &run_id).await?);

        let state = StateContainer::new(seed);
        let view = RunView::new(run_id.clone(), Arc::new(state.clone()), Utc::now());
        let handle = Arc::new(RunHandle::new(Arc::clone(&checkpointer), view));
        self.runs
            .write()
            .await
            .insert(run_id.clone(), Arc::clone(&handle));

        let control = handle.control.lock().await.clone();
        let executor = self.executor(checkpointer);
        let hook = self.publish_hook.clone();
        let id = run_id.clone();

        info!(run_id = %run_id, graph = %self.graph.name(), "Run submitted");
        tokio::spawn(async move {
            handle.view.send_modify(|view| {
                view.status = RunStatus::Running;
                view.updated_at = Utc::now();
            });
            let report = executor.run(id, state, &control).await;
            finish(&handle, report, hook).await;
        });

        Ok(run_id)
    }

    pub async fn status(&self, run_id: &str) -> Result<RunView, GraphError> {
        Ok(self.handle(run_id).await?.snapshot())
    }

    /// Wait until the run is terminal or suspended
    pub async fn wait(&self, run_id: &str) -> Result<RunView, GraphError> {
        let handle = self.handle(run_id).await?;
        let mut rx = handle.view.subscribe();
        let view = rx
            .wait_for(|view| view.status.is_settled())
            .await
            .map_err(|_| GraphError::UnknownRun(run_id.to_string()))?
            .clone();
        Ok(view)
    }

    /// Ask a running run to suspend at the next step boundary
    pub async fn pause(&self, run_id: &str) -> Result<(), GraphError> {
        let handle = self.handle(run_id).await?;
        let control = handle.control.lock().await;
        let status = handle.view.borrow().status;
        if status.is_settled() {
            return Err(GraphError::InvalidTransition(format!(
                "cannot pause run {run_id} in status {status}"
            )));
        }
        control.pause();
        info!(run_id, "Pause requested");
        Ok(())
    }

    /// Cancel a run. A suspended run fails immediately.
    pub async fn cancel(&self, run_id: &str) -> Result<(), GraphError> {
        let handle = self.handle(run_id).await?;
        let control = handle.control.lock().await;
        let status = handle.view.borrow().status;
        match status {
            s if s.is_terminal() => Err(GraphError::InvalidTransition(format!(
                "cannot cancel run {run_id} in status {s}"
            ))),
            RunStatus::Suspended => {
                control.cancel();
                let (steps, version) = {
                    let view = handle.view.borrow();
                    (view.steps, view.state_version)
                };
                let failure = RunFailure::from_error(&GraphError::Cancelled, steps, version);
                if let Err(e) = mark_failed(handle.checkpointer.as_ref(), &failure).await {
                    warn!(run_id, error = %e, "Could not record cancellation in checkpoint");
                }
                handle.view.send_modify(|view| {
                    view.status = RunStatus::Failed;
                    view.awaiting = None;
                    view.failure = Some(failure);
                    view.updated_at = Utc::now();
                });
                info!(run_id, "Suspended run cancelled");
                Ok(())
            }
            _ => {
                control.cancel();
                info!(run_id, "Cancellation requested");
                Ok(())
            }
        }
    }

    /// Resume a suspended run, merging `input` before it continues
    pub async fn resume(&self, run_id: &str, input: Delta) -> Result<(), GraphError> {
        let handle = self.handle(run_id).await?;
        let mut control = handle.control.lock().await;
        let status = handle.view.borrow().status;
        if status != RunStatus::Suspended {
            return Err(GraphError::InvalidTransition(format!(
                "cannot resume run {run_id} in status {status}"
            )));
        }

        let executor = self.executor(Arc::clone(&handle.checkpointer));
        let point = executor.prepare_resume(run_id, input).await?;

        *control = RunControl::new();
        let run_control = control.clone();

        handle.view.send_modify(|view| {
            view.status = RunStatus::Running;
            view.awaiting = None;
            view.updated_at = Utc::now();
        });
        // a second resume waiting on the lock now sees Running
        drop(control);
        info!(run_id, step = point.step(), version = point.state().version(), "Run resumed");

        let hook = self.publish_hook.clone();
        tokio::spawn(async move {
            let report = executor.continue_run(point, &run_control).await;
            finish(&handle, report, hook).await;
        });
        Ok(())
    }

    /// Register a run known only from its checkpoints, e.g. after a restart.
    ///
    /// A failure recorded in the last checkpoint makes the run Failed and an
    /// empty pending set makes it Succeeded. Anything else (a suspension, a
    /// pause or a process that died mid-run) comes back Suspended and resumes
    /// from that step.
    pub async fn recover(&self, run_id: &str) -> Result<RunView, GraphError> {
        if let Ok(handle) = self.handle(run_id).await {
            return Ok(handle.snapshot());
        }

        let checkpointer: Arc<dyn Checkpointer> =
            Arc::from(create_checkpointer(self.checkpoints.clone(), run_id).await?);
        let checkpoint = checkpointer
            .latest()
            .await?
            .ok_or_else(|| GraphError::UnknownRun(run_id.to_string()))?;
        checkpoint.validate(run_id)?;

        let status = if checkpoint.is_failed() {
            RunStatus::Failed
        } else if checkpoint.pending.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::Suspended
        };
        let mut view = RunView::new(
            run_id.to_string(),
            Arc::new(checkpoint.state),
            checkpoint.timestamp,
        );
        view.status = status;
        view.steps = checkpoint.step;
        view.pending = checkpoint.pending;
        view.awaiting = checkpoint.awaiting;
        view.escalation = checkpoint.escalation;
        view.failure = checkpoint.failure;

        info!(run_id, step = view.steps, status = %view.status, "Run recovered from checkpoint");
        let handle = Arc::new(RunHandle::new(checkpointer, view.clone()));
        self.runs.write().await.insert(run_id.to_string(), handle);
        Ok(view)
    }

    /// All known runs, oldest first
    pub async fn list(&self) -> Vec<RunView> {
        let mut views: Vec<RunView> = self
            .runs
            .read()
            .await
            .values()
            .map(|handle| handle.snapshot())
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
        views
    }

    /// Mermaid diagram of the graph coloured by this run's progress
    pub async fn diagram(&self, run_id: &str) -> Result<String, GraphError> {
        let view = self.status(run_id).await?;
        let statuses = node_statuses(&view.trace, &view.pending, view.failure.as_ref());
        Ok(to_mermaid_with_status(&self.graph, &statuses))
    }
}

/// Record `failure` on the run's latest checkpoint
async fn mark_failed(checkpointer: &dyn Checkpointer, failure: &RunFailure) -> Result<(), GraphError> {
    match checkpointer.latest().await? {
        Some(checkpoint) => checkpointer.save(&checkpoint.with_failure(failure.clone())).await,
        None => Ok(()),
    }
}

/// Publish on success, then expose the final view in one update
async fn finish(handle: &RunHandle, report: RunReport, hook: Option<Arc<dyn PublishHook>>) {
    let mut receipts = Vec::new();
    let mut publish_error = None;

    if let (true, Some(hook)) = (report.succeeded(), hook) {
        match hook.publish(&report.run_id, Arc::clone(&report.state)).await {
            Ok(published) => {
                info!(run_id = %report.run_id, receipts = published.len(), "Run published");
                receipts = published;
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Publishing failed");
                publish_error = Some(format!("{e:#}"));
            }
        }
    }

    handle.view.send_modify(|view| {
        view.apply(report);
        view.receipts.extend(receipts);
        view.publish_error = publish_error;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        Capability, GraphBuilder, InputRequest, Node, NodeContext, NodeDescriptor, NodeError,
        NodeOutput, Outcome, Terminal,
    };
    use std::time::Duration;

    /// Suspends until `decision` arrives
    struct Gate(NodeDescriptor);

    #[async_trait]
    impl Node for Gate {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.0
        }

        async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
            match ctx.state().get_str("decision") {
                Some(d) => Ok(NodeOutput::new(Delta::new().with("decision", Value::Null), Outcome::new(d))),
                None => Ok(NodeOutput::suspend(Delta::new(), InputRequest::new("decide", ["decision"]))),
            }
        }
    }

    /// Sleeps each step so tests can act mid-run
    struct Slow(NodeDescriptor);

    #[async_trait]
    impl Node for Slow {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.0
        }

        async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let n = ctx.state().get_u64("n").unwrap_or(0) + 1;
            Ok(NodeOutput::done(Delta::new().with("n", n)))
        }
    }

    struct Done(NodeDescriptor);

    #[async_trait]
    impl Node for Done {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.0
        }

        async fn execute(&self, _ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::done(Delta::new().with("done", true)))
        }
    }

    struct CountingHook(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl PublishHook for CountingHook {
        async fn publish(&self, run_id: &str, state: Arc<StateContainer>) -> anyhow::Result<Vec<Receipt>> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            anyhow::ensure!(state.get_bool("done") == Some(true), "run {run_id} is not done");
            Ok(vec![Receipt {
                channel: "blog".into(),
                reference: run_id.to_string(),
                published_at: Utc::now(),
            }])
        }
    }

    fn gate_graph() -> Graph {
        GraphBuilder::new()
            .node(Gate(NodeDescriptor::new("gate", Capability::Route).writes(["decision"])))
            .node(Done(
                NodeDescriptor::new("done", Capability::Publish)
                    .writes(["done"])
                    .terminal(Terminal::Success),
            ))
            .entry("gate")
            .conditional_edges("gate", vec![("approve", "done")])
            .build()
            .unwrap()
    }

    fn loop_graph() -> Graph {
        GraphBuilder::new()
            .node(Slow(NodeDescriptor::new("slow", Capability::Generate).writes(["n"])))
            .entry("slow")
            .edge("slow", "slow")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_suspend_resume_publish() {
        let hook = Arc::new(CountingHook(Default::default()));
        let engine = CampaignEngine::new(gate_graph(), ExecutorConfig::default())
            .with_publish_hook(hook.clone());

        let run_id = engine.submit(BTreeMap::new()).await.unwrap();
        let view = engine.wait(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Suspended);
        assert_eq!(view.required_fields(), ["decision".to_string()]);

        let missing = engine.resume(&run_id, Delta::new()).await;
        assert!(matches!(missing, Err(GraphError::InvalidTransition(_))));

        engine
            .resume(&run_id, Delta::new().with("decision", "approve"))
            .await
            .unwrap();
        let view = engine.wait(&run_id).await.unwrap();

        assert_eq!(view.status, RunStatus::Succeeded);
        assert_eq!(view.receipts.len(), 1);
        assert_eq!(view.receipts[0].reference, run_id);
        assert_eq!(view.trace.len(), 3);
        assert_eq!(hook.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(view.publish_error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_run_and_invalid_transitions() {
        let engine = CampaignEngine::new(gate_graph(), ExecutorConfig::default());
        assert!(matches!(engine.status("nope").await, Err(GraphError::UnknownRun(_))));

        let run_id = engine.submit(BTreeMap::new()).await.unwrap();
        engine.wait(&run_id).await.unwrap();
        assert!(matches!(
            engine.pause(&run_id).await,
            Err(GraphError::InvalidTransition(_))
        ));

        engine.cancel(&run_id).await.unwrap();
        let view = engine.status(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Failed);
        assert_eq!(view.failure.unwrap().kind, crate::engine::ErrorKind::Cancelled);

        assert!(matches!(
            engine.cancel(&run_id).await,
            Err(GraphError::InvalidTransition(_))
        ));
        assert!(matches!(
            engine.resume(&run_id, Delta::new()).await,
            Err(GraphError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_running() {
        let engine = CampaignEngine::new(loop_graph(), ExecutorConfig::default().with_max_steps(1000));
        let run_id = engine.submit(BTreeMap::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.cancel(&run_id).await.unwrap();
        let view = engine.wait(&run_id).await.unwrap();

        assert_eq!(view.status, RunStatus::Failed);
        let failure = view.failure.unwrap();
        assert_eq!(failure.kind, crate::engine::ErrorKind::Cancelled);
        assert_eq!(failure.state_version, view.state.version());
        assert_eq!(view.state.history().len() as u64, view.state.version());
    }

    #[tokio::test]
    async fn test_pause_then_resume() {
        let engine = CampaignEngine::new(loop_graph(), ExecutorConfig::default().with_max_steps(6));
        let run_id = engine.submit(BTreeMap::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        engine.pause(&run_id).await.unwrap();
        let paused = engine.wait(&run_id).await.unwrap();
        assert_eq!(paused.status, RunStatus::Suspended);
        assert!(paused.awaiting.is_none());
        assert!(paused.steps < 6);

        engine.resume(&run_id, Delta::new()).await.unwrap();
        let view = engine.wait(&run_id).await.unwrap();

        assert_eq!(view.status, RunStatus::Failed);
        assert_eq!(view.failure.unwrap().kind, crate::engine::ErrorKind::StepLimitExceeded);
        assert_eq!(view.state.get_u64("n"), Some(6));
        assert_eq!(view.trace.len(), 6);
    }

    #[tokio::test]
    async fn test_recover_from_file_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointerConfig::File {
            path: dir.path().to_path_buf(),
            compression: false,
        };

        let first = CampaignEngine::new(gate_graph(), ExecutorConfig::default())
            .with_checkpoints(checkpoints.clone());
        let run_id = first.submit(BTreeMap::new()).await.unwrap();
        assert_eq!(first.wait(&run_id).await.unwrap().status, RunStatus::Suspended);

        // a fresh engine, as after a restart
        let second = CampaignEngine::new(gate_graph(), ExecutorConfig::default())
            .with_checkpoints(checkpoints);
        let view = second.recover(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Suspended);
        assert_eq!(view.required_fields(), ["decision".to_string()]);

        second
            .resume(&run_id, Delta::new().with("decision", "approve"))
            .await
            .unwrap();
        let done = second.wait(&run_id).await.unwrap();
        assert_eq!(done.status, RunStatus::Succeeded);
        assert_eq!(done.state.get_bool("done"), Some(true));

        assert_eq!(second.list().await.len(), 1);
        let diagram = second.diagram(&run_id).await.unwrap();
        assert!(diagram.contains(":::executed"));
    }

    #[tokio::test]
    async fn test_recover_failed_run() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointerConfig::File {
            path: dir.path().to_path_buf(),
            compression: true,
        };
        let config = ExecutorConfig::default().with_max_steps(3);

        let first = CampaignEngine::new(loop_graph(), config.clone()).with_checkpoints(checkpoints.clone());
        let run_id = first.submit(BTreeMap::new()).await.unwrap();
        let failed = first.wait(&run_id).await.unwrap();
        assert_eq!(failed.status, RunStatus::Failed);

        let second = CampaignEngine::new(loop_graph(), config).with_checkpoints(checkpoints);
        let view = second.recover(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Failed);
        assert_eq!(view.failure, failed.failure);
        assert!(matches!(
            second.resume(&run_id, Delta::new()).await,
            Err(GraphError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_cancelled_suspended_run() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointerConfig::File {
            path: dir.path().to_path_buf(),
            compression: false,
        };

        let first = CampaignEngine::new(gate_graph(), ExecutorConfig::default())
            .with_checkpoints(checkpoints.clone());
        let run_id = first.submit(BTreeMap::new()).await.unwrap();
        assert_eq!(first.wait(&run_id).await.unwrap().status, RunStatus::Suspended);
        first.cancel(&run_id).await.unwrap();

        let second = CampaignEngine::new(gate_graph(), ExecutorConfig::default())
            .with_checkpoints(checkpoints);
        let view = second.recover(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Failed);
        assert_eq!(view.failure.unwrap().kind, crate::engine::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_concurrent_resumes_start_one_run() {
        let hook = Arc::new(CountingHook(Default::default()));
        let engine = CampaignEngine::new(gate_graph(), ExecutorConfig::default())
            .with_publish_hook(hook.clone());
        let run_id = engine.submit(BTreeMap::new()).await.unwrap();
        assert_eq!(engine.wait(&run_id).await.unwrap().status, RunStatus::Suspended);

        let approve = Delta::new().with("decision", "approve");
        let (a, b) = tokio::join!(
            engine.resume(&run_id, approve.clone()),
            engine.resume(&run_id, approve)
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

        let view = engine.wait(&run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Succeeded);
        assert_eq!(view.trace.len(), 3);
        assert_eq!(hook.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recover_unknown_run() {
        let engine = CampaignEngine::new(gate_graph(), ExecutorConfig::default());
        assert!(matches!(
            engine.recover("missing").await,
            Err(GraphError::UnknownRun(_))
        ));
    }
}
