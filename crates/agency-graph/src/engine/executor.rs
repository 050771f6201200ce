//! Graph executor - the run loop
//!
//! A run advances in discrete steps. Each step executes every scheduled node
//! (concurrently, bounded by `parallelism`), waits for all of them, merges
//! their deltas into one new state version in declaration order, then asks
//! the edge resolver for the next node set.
//!
//! ```text
//! Pending ──▶ Running ──▶ Succeeded
//!               │  ▲
//!               │  └───── resume
//!               ├──▶ Suspended
//!               └──▶ Failed
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::checkpoint::{Checkpoint, Checkpointer};
use super::config::{ExecutorConfig, RetryPolicy};
use super::edge::Escalation;
use super::error::{GraphError, NodeError, RunFailure, StructuralError};
use super::graph::Graph;
use super::node::{AwaitingInput, BoxedNode, NodeContext, NodeName, NodeOutput, Outcome, Terminal};
use super::state::{Delta, StateContainer};

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Suspended,
}

impl RunStatus {
    /// Succeeded or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    /// Terminal or Suspended: nothing runs until someone acts
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || matches!(self, RunStatus::Suspended)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

/// Trace entry for one merged step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub nodes: Vec<NodeName>,
    pub outcomes: Vec<(NodeName, Outcome)>,
    /// State version after the merge
    pub version: u64,
    pub elapsed_ms: u64,
}

/// Result of `run`/`resume`
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Last merged state
    pub state: Arc<StateContainer>,
    /// Steps completed so far
    pub steps: usize,
    /// Nodes that run next on resume
    pub pending: Vec<NodeName>,
    /// Steps executed by this call
    pub trace: Vec<StepRecord>,
    pub escalation: Option<Escalation>,
    pub awaiting: Option<AwaitingInput>,
    pub failure: Option<RunFailure>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// External control handle for a run: cancellation and pause
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    cancel: CancellationToken,
    pause: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the run. In-flight nodes are abandoned and their step is discarded.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Ask the run to suspend at the next step boundary
    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A handle that also stops when this one is cancelled, and can be
    /// cancelled on its own
    fn scoped(&self) -> RunControl {
        RunControl {
            cancel: self.cancel.child_token(),
            pause: Arc::clone(&self.pause),
        }
    }
}

/// How the run loop ended
enum Exit {
    Succeeded,
    Suspended(Option<AwaitingInput>),
    Failed { error: GraphError, step: usize },
}

/// Mutable run progress, owned by one executor call
struct Progress {
    run_id: String,
    state: Arc<StateContainer>,
    step: usize,
    pending: Vec<NodeName>,
    trace: Vec<StepRecord>,
    escalation: Option<Escalation>,
}

/// A validated checkpoint with its resume payload merged, ready to run
pub struct ResumePoint {
    progress: Progress,
}

impl ResumePoint {
    pub fn run_id(&self) -> &str {
        &self.progress.run_id
    }

    pub fn step(&self) -> usize {
        self.progress.step
    }

    pub fn state(&self) -> &StateContainer {
        &self.progress.state
    }

    pub fn pending(&self) -> &[NodeName] {
        &self.progress.pending
    }
}

/// Executes a [`Graph`] against a state container
pub struct Executor {
    graph: Arc<Graph>,
    config: ExecutorConfig,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl Executor {
    pub fn new(graph: Arc<Graph>, config: ExecutorConfig) -> Self {
        Self {
            graph,
            config,
            checkpointer: None,
        }
    }

    /// Attach a checkpointer. Required for suspension and resume.
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Start a run at the graph's entry node
    pub async fn run(
        &self,
        run_id: impl Into<String>,
        initial: StateContainer,
        control: &RunControl,
    ) -> RunReport {
        let run_id = run_id.into();
        info!(run_id = %run_id, graph = %self.graph.name(), "Run started");

        let progress = Progress {
            run_id,
            state: Arc::new(initial),
            step: 0,
            pending: vec![self.graph.entry().clone()],
            trace: Vec::new(),
            escalation: None,
        };
        self.run_from(progress, control).await
    }

    /// Resume from the latest checkpoint, merging `input` first
    pub async fn resume(
        &self,
        run_id: &str,
        input: Delta,
        control: &RunControl,
    ) -> Result<RunReport, GraphError> {
        let point = self.prepare_resume(run_id, input).await?;
        Ok(self.continue_run(point, control).await)
    }

    /// Resume from a specific checkpoint
    pub async fn resume_from(
        &self,
        checkpoint: Checkpoint,
        input: Delta,
        control: &RunControl,
    ) -> Result<RunReport, GraphError> {
        let point = self.prepare_resume_from(checkpoint, input)?;
        Ok(self.continue_run(point, control).await)
    }

    /// Load and validate the latest checkpoint without running anything
    pub async fn prepare_resume(&self, run_id: &str, input: Delta) -> Result<ResumePoint, GraphError> {
        let checkpointer = self
            .checkpointer
            .as_ref()
            .ok_or_else(|| GraphError::config_error("resume requires a checkpointer"))?;
        let checkpoint = checkpointer
            .latest()
            .await?
            .ok_or_else(|| GraphError::checkpoint_error(format!("no checkpoint for run {run_id}")))?;
        checkpoint.validate(run_id)?;
        self.prepare_resume_from(checkpoint, input)
    }

    /// Validate `checkpoint` against this graph and merge the resume payload
    pub fn prepare_resume_from(
        &self,
        checkpoint: Checkpoint,
        input: Delta,
    ) -> Result<ResumePoint, GraphError> {
        if checkpoint.format_version != super::checkpoint::CHECKPOINT_FORMAT_VERSION {
            return Err(GraphError::checkpoint_error(format!(
                "unsupported checkpoint format version {}",
                checkpoint.format_version
            )));
        }
        if let Some(failure) = &checkpoint.failure {
            return Err(GraphError::InvalidTransition(format!(
                "run {} failed at step {} ({}) and cannot resume",
                checkpoint.run_id, failure.step, failure.message
            )));
        }
        for name in &checkpoint.pending {
            if !self.graph.registry().contains(name) {
                return Err(GraphError::structural(
                    StructuralError::UnknownNode(name.clone()),
                    checkpoint.step,
                    checkpoint.state.version(),
                ));
            }
        }
        if let Some(awaiting) = &checkpoint.awaiting {
            for field in &awaiting.required_fields {
                if input.get(field).map_or(true, |v| v.is_null()) {
                    return Err(GraphError::InvalidTransition(format!(
                        "resume of {} requires field '{}'",
                        checkpoint.run_id, field
                    )));
                }
            }
        }

        let state = if input.is_empty() {
            checkpoint.state
        } else {
            checkpoint.state.merge(input)
        };

        info!(
            run_id = %checkpoint.run_id,
            step = checkpoint.step,
            version = state.version(),
            pending = ?checkpoint.pending,
            "Restored from checkpoint"
        );

        Ok(ResumePoint {
            progress: Progress {
                run_id: checkpoint.run_id,
                state: Arc::new(state),
                step: checkpoint.step,
                pending: checkpoint.pending,
                trace: Vec::new(),
                escalation: checkpoint.escalation,
            },
        })
    }

    /// Continue a run from a prepared resume point
    pub async fn continue_run(&self, point: ResumePoint, control: &RunControl) -> RunReport {
        self.run_from(point.progress, control).await
    }

    async fn run_from(&self, mut progress: Progress, control: &RunControl) -> RunReport {
        let run_timeout = self.config.run_timeout;
        let scope = control.scoped();

        let result = timeout(run_timeout, self.drive(&mut progress, &scope)).await;
        let exit = match result {
            Ok(exit) => exit,
            Err(_) => {
                // node tasks are detached; stop them
                scope.cancel();
                Exit::Failed {
                    error: GraphError::RunTimeout(run_timeout),
                    step: progress.step,
                }
            }
        };

        let (status, awaiting, failure) = match exit {
            Exit::Succeeded => {
                info!(
                    run_id = %progress.run_id,
                    steps = progress.step,
                    version = progress.state.version(),
                    "Run succeeded"
                );
                (RunStatus::Succeeded, None, None)
            }
            Exit::Suspended(awaiting) => {
                info!(run_id = %progress.run_id, steps = progress.step, "Run suspended");
                (RunStatus::Suspended, awaiting, None)
            }
            Exit::Failed { error, step } => {
                error!(run_id = %progress.run_id, step, error = %error, "Run failed");
                let failure = RunFailure::from_error(&error, step, progress.state.version());
                self.record_failure(&progress, &failure).await;
                (RunStatus::Failed, None, Some(failure))
            }
        };

        RunReport {
            run_id: progress.run_id,
            status,
            state: progress.state,
            steps: progress.step,
            pending: progress.pending,
            trace: progress.trace,
            escalation: progress.escalation,
            awaiting,
            failure,
        }
    }

    async fn drive(&self, progress: &mut Progress, control: &RunControl) -> Exit {
        loop {
            if control.is_cancelled() {
                return Exit::Failed {
                    error: GraphError::Cancelled,
                    step: progress.step,
                };
            }
            if progress.pending.is_empty() {
                if !self.config.should_checkpoint(progress.step) {
                    if let Err(error) = self.save_checkpoint(progress, None).await {
                        return Exit::Failed {
                            error,
                            step: progress.step,
                        };
                    }
                }
                return Exit::Succeeded;
            }
            if control.pause_requested() {
                if let Err(error) = self.save_checkpoint(progress, None).await {
                    return Exit::Failed {
                        error,
                        step: progress.step,
                    };
                }
                return Exit::Suspended(None);
            }
            if progress.step >= self.config.max_steps {
                return Exit::Failed {
                    error: GraphError::StepLimitExceeded(self.config.max_steps),
                    step: progress.step,
                };
            }

            let step = progress.step + 1;
            match self.execute_step(progress, step, control).await {
                Ok(None) => {}
                Ok(Some(exit)) => return exit,
                Err(error) => return Exit::Failed { error, step },
            }

            if self.config.should_checkpoint(progress.step) {
                if let Err(error) = self.save_checkpoint(progress, None).await {
                    return Exit::Failed {
                        error,
                        step: progress.step,
                    };
                }
            }
        }
    }

    /// Run one step. `Ok(Some(exit))` ends the run after a successful merge.
    async fn execute_step(
        &self,
        progress: &mut Progress,
        step: usize,
        control: &RunControl,
    ) -> Result<Option<Exit>, GraphError> {
        let started = Instant::now();
        let version = progress.state.version();
        let scheduled = progress.pending.clone();

        debug!(run_id = %progress.run_id, step, nodes = ?scheduled, "Executing step");

        self.check_write_sets(&scheduled)
            .map_err(|e| GraphError::structural(e, step, version))?;

        let results = self
            .execute_nodes(&progress.run_id, step, &progress.state, &scheduled, control)
            .await;

        if control.is_cancelled() {
            return Err(GraphError::Cancelled);
        }

        let mut outputs = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (name, result) in results {
            match result {
                Ok(output) => outputs.push((name, output)),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        for (name, output) in &outputs {
            self.check_declared_writes(name, &output.delta)
                .map_err(|e| GraphError::structural(e, step, version))?;
        }

        let deltas: Vec<(NodeName, Delta)> = outputs
            .iter()
            .map(|(name, output)| (name.clone(), output.delta.clone()))
            .collect();
        let merged = Arc::new(
            progress
                .state
                .merge_step(step, &deltas)
                .map_err(|e| GraphError::structural(e, step, version))?,
        );
        progress.state = Arc::clone(&merged);
        progress.step = step;

        let mut next: Vec<NodeName> = Vec::new();
        let mut awaiting = None;
        let mut terminal = None;
        for (name, output) in &outputs {
            if let Some(request) = &output.suspend {
                next.push(name.clone());
                awaiting.get_or_insert_with(|| AwaitingInput::from_request(name.clone(), request.clone()));
                continue;
            }
            if let Some(kind) = self.graph.descriptor(name).and_then(|d| d.terminal) {
                terminal.get_or_insert((name.clone(), kind));
                continue;
            }
            let routing = self
                .graph
                .resolver()
                .resolve(name, &output.outcome, &merged)
                .map_err(|e| GraphError::structural(e, step, merged.version()))?;
            if routing.escalation.is_some() {
                progress.escalation = routing.escalation;
            }
            next.extend(routing.next);
        }
        let next = self.order(next);

        progress.trace.push(StepRecord {
            step,
            nodes: scheduled,
            outcomes: outputs
                .iter()
                .map(|(name, output)| (name.clone(), output.outcome.clone()))
                .collect(),
            version: merged.version(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        progress.pending = next;

        info!(
            run_id = %progress.run_id,
            step,
            version = progress.state.version(),
            next = ?progress.pending,
            "Step merged"
        );

        // a success terminal only ends its own branch; the run succeeds
        // once nothing is pending
        match terminal {
            Some((node, Terminal::Escalation)) => {
                progress.pending.clear();
                let escalation = progress.escalation.clone();
                warn!(run_id = %progress.run_id, node = %node, escalation = ?escalation, "Escalation terminal reached");
                let (counter, value, max) = escalation
                    .map(|e| (e.counter, e.value, e.max))
                    .unwrap_or_default();
                return Ok(Some(Exit::Failed {
                    error: GraphError::RetryBudgetExceeded {
                        node,
                        counter,
                        value,
                        max,
                    },
                    step,
                }));
            }
            Some((node, Terminal::Success)) if !progress.pending.is_empty() => {
                debug!(run_id = %progress.run_id, node = %node, pending = ?progress.pending, "Success terminal reached, other branches continue");
            }
            _ => {}
        }

        if let Some(awaiting) = awaiting {
            self.save_checkpoint(progress, Some(awaiting.clone())).await?;
            return Ok(Some(Exit::Suspended(Some(awaiting))));
        }

        Ok(None)
    }

    /// Spawn every scheduled node and wait for all of them
    async fn execute_nodes(
        &self,
        run_id: &str,
        step: usize,
        state: &Arc<StateContainer>,
        scheduled: &[NodeName],
        control: &RunControl,
    ) -> Vec<(NodeName, Result<NodeOutput, GraphError>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut handles = Vec::with_capacity(scheduled.len());

        for name in scheduled {
            let node = match self.graph.node(name) {
                Some(node) => Arc::clone(node),
                None => {
                    handles.push((
                        name.clone(),
                        Err(GraphError::structural(
                            StructuralError::UnknownNode(name.clone()),
                            step,
                            state.version(),
                        )),
                    ));
                    continue;
                }
            };
            let descriptor = node.descriptor();
            let policy = descriptor
                .retry_policy
                .clone()
                .unwrap_or_else(|| self.config.retry_policy.clone());
            let node_timeout = descriptor.timeout.unwrap_or(self.config.node_timeout);
            let task = NodeTask {
                run_id: run_id.to_string(),
                step,
                state: Arc::clone(state),
                cancel: control.token(),
                policy,
                node_timeout,
            };
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(GraphError::Cancelled),
                };
                task.run(node).await
            });
            handles.push((name.clone(), Ok(handle)));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let result = match handle {
                Ok(handle) => handle.await.unwrap_or_else(|e| {
                    Err(GraphError::NodeFailed {
                        node: name.clone(),
                        source: NodeError::fatal(format!("task join error: {e}")),
                    })
                }),
                Err(e) => Err(e),
            };
            results.push((name, result));
        }
        results
    }

    /// Two scheduled nodes must not declare a write to the same field
    fn check_write_sets(&self, scheduled: &[NodeName]) -> Result<(), StructuralError> {
        for (i, a) in scheduled.iter().enumerate() {
            let Some(da) = self.graph.descriptor(a) else {
                return Err(StructuralError::UnknownNode(a.clone()));
            };
            for b in &scheduled[i + 1..] {
                let Some(db) = self.graph.descriptor(b) else {
                    return Err(StructuralError::UnknownNode(b.clone()));
                };
                if let Some(field) = da.writes.iter().find(|f| db.declares_write(f)) {
                    return Err(StructuralError::MergeConflict {
                        field: field.clone(),
                        writers: vec![a.clone(), b.clone()],
                    });
                }
            }
        }
        Ok(())
    }

    fn check_declared_writes(&self, name: &NodeName, delta: &Delta) -> Result<(), StructuralError> {
        let descriptor = self
            .graph
            .descriptor(name)
            .ok_or_else(|| StructuralError::UnknownNode(name.clone()))?;
        match delta.fields().find(|f| !descriptor.declares_write(f)) {
            Some(field) => Err(StructuralError::UndeclaredWrite {
                node: name.clone(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// De-duplicate and sort by declaration order
    fn order(&self, mut nodes: Vec<NodeName>) -> Vec<NodeName> {
        let registry = self.graph.registry();
        nodes.sort_by_key(|n| registry.position(n).unwrap_or(usize::MAX));
        nodes.dedup();
        nodes
    }

    async fn save_checkpoint(
        &self,
        progress: &Progress,
        awaiting: Option<AwaitingInput>,
    ) -> Result<(), GraphError> {
        if self.checkpointer.is_none() {
            if awaiting.is_some() {
                warn!(run_id = %progress.run_id, "Suspending without a checkpointer; run cannot be resumed");
            }
            return Ok(());
        }
        let mut checkpoint = self.snapshot(progress);
        if let Some(awaiting) = awaiting {
            checkpoint = checkpoint.with_awaiting(awaiting);
        }
        self.write_checkpoint(progress, checkpoint).await
    }

    /// Overwrite the last checkpoint with the failure so the run is never resumed
    async fn record_failure(&self, progress: &Progress, failure: &RunFailure) {
        if self.checkpointer.is_none() {
            return;
        }
        let checkpoint = self.snapshot(progress).with_failure(failure.clone());
        if let Err(e) = self.write_checkpoint(progress, checkpoint).await {
            warn!(run_id = %progress.run_id, error = %e, "Could not record run failure in checkpoint");
        }
    }

    fn snapshot(&self, progress: &Progress) -> Checkpoint {
        Checkpoint::new(
            progress.run_id.clone(),
            progress.step,
            (*progress.state).clone(),
            progress.pending.clone(),
        )
        .with_escalation(progress.escalation.clone())
        .with_metadata("graph", self.graph.name())
    }

    async fn write_checkpoint(&self, progress: &Progress, checkpoint: Checkpoint) -> Result<(), GraphError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(());
        };

        let checkpoint_timeout = self.config.checkpoint_timeout;
        timeout(checkpoint_timeout, checkpointer.save(&checkpoint))
            .await
            .map_err(|_| {
                GraphError::checkpoint_error(format!("checkpoint write timed out after {checkpoint_timeout:?}"))
            })??;

        info!(run_id = %progress.run_id, step = progress.step, "Checkpoint saved");
        Ok(())
    }
}

/// Everything one node execution needs, moved into its task
struct NodeTask {
    run_id: String,
    step: usize,
    state: Arc<StateContainer>,
    cancel: CancellationToken,
    policy: RetryPolicy,
    node_timeout: std::time::Duration,
}

impl NodeTask {
    /// Execute with per-attempt timeout, retrying transient errors with backoff
    async fn run(self, node: BoxedNode) -> Result<NodeOutput, GraphError> {
        let name = node.name().clone();
        let mut retries = 0;

        loop {
            let ctx = NodeContext::new(
                self.run_id.clone(),
                name.clone(),
                self.step,
                retries + 1,
                Arc::clone(&self.state),
                self.cancel.clone(),
            );

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(GraphError::Cancelled),
                result = timeout(self.node_timeout, node.execute(&ctx)) => match result {
                    Ok(result) => result,
                    Err(_) => Err(NodeError::Timeout(self.node_timeout)),
                },
            };

            let error = match result {
                Ok(output) => return Ok(output),
                Err(NodeError::Cancelled) => return Err(GraphError::Cancelled),
                Err(e) if !e.is_retryable() => {
                    return Err(GraphError::NodeFailed {
                        node: name,
                        source: e,
                    })
                }
                Err(e) => e,
            };

            if self.cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            if !self.policy.should_retry(retries) {
                return Err(GraphError::RetriesExhausted {
                    node: name,
                    attempts: retries + 1,
                    source: error,
                });
            }

            let delay = self.policy.delay_for_attempt(retries);
            warn!(
                node = %name,
                step = self.step,
                attempt = retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient node failure, retrying"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(GraphError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            retries += 1;
        }
    }
}
