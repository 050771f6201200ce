//! Node abstractions for the graph engine
//!
//! A node is one unit of work (research, copywriting, review, ...). It reads
//! the shared state through a [`NodeContext`] and returns a [`NodeOutput`]:
//! a delta to merge plus an [`Outcome`] label the edge resolver routes on.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::config::RetryPolicy;
use super::error::NodeError;
use super::graph::BuildError;
use super::state::{Delta, StateContainer};

/// Sentinel node name for "no successor"
pub const END: &str = "END";

/// Unique name of a node in a graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(pub String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The `END` sentinel
    pub fn end() -> Self {
        Self(END.to_string())
    }

    pub fn is_end(&self) -> bool {
        self.0 == END
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of work a node does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Generate,
    Critique,
    Route,
    Publish,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Capability::Generate => "generate",
            Capability::Critique => "critique",
            Capability::Route => "route",
            Capability::Publish => "publish",
        };
        f.write_str(s)
    }
}

/// Terminal designation. Reaching a terminal node ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    /// Run succeeds after this node's step is merged
    Success,
    /// Run fails with `RetryBudgetExceeded`, keeping the final state
    Escalation,
}

/// Static description of a node, registered once at graph construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub name: NodeName,
    pub capability: Capability,
    /// Declared input fields (documentation and visualization only)
    pub reads: Vec<String>,
    /// Declared output fields; writing anything else is a contract error
    pub writes: Vec<String>,
    /// Overrides the executor's retry policy
    pub retry_policy: Option<RetryPolicy>,
    /// Overrides the executor's per-node timeout
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub terminal: Option<Terminal>,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<NodeName>, capability: Capability) -> Self {
        Self {
            name: name.into(),
            capability,
            reads: Vec::new(),
            writes: Vec::new(),
            retry_policy: None,
            timeout: None,
            terminal: None,
        }
    }

    /// Declare input fields
    pub fn reads<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reads.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Declare output fields
    pub fn writes<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writes.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = Some(terminal);
        self
    }

    pub fn declares_write(&self, field: &str) -> bool {
        self.writes.iter().any(|f| f == field)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }
}

/// Label the edge resolver routes on (`accept`, `reject`, `done`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Outcome(pub String);

impl Outcome {
    pub const DONE: &'static str = "done";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn done() -> Self {
        Self(Self::DONE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node's request for human input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub prompt: String,
    /// Fields the resume payload must supply
    pub required_fields: Vec<String>,
    /// Extra data shown to the reviewer
    #[serde(default)]
    pub context: Value,
}

impl InputRequest {
    pub fn new<I, S>(prompt: impl Into<String>, required_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            required_fields: required_fields.into_iter().map(Into::into).collect(),
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// Pending human input for a suspended run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitingInput {
    /// Node that requested the input; it runs again on resume
    pub node: NodeName,
    pub prompt: String,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub context: Value,
}

impl AwaitingInput {
    pub fn from_request(node: NodeName, request: InputRequest) -> Self {
        Self {
            node,
            prompt: request.prompt,
            required_fields: request.required_fields,
            context: request.context,
        }
    }
}

/// Result of a successful node execution
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub delta: Delta,
    pub outcome: Outcome,
    /// Set when the node asks for the run to be suspended
    pub suspend: Option<InputRequest>,
}

impl NodeOutput {
    pub fn new(delta: Delta, outcome: Outcome) -> Self {
        Self {
            delta,
            outcome,
            suspend: None,
        }
    }

    /// Output with the `done` outcome
    pub fn done(delta: Delta) -> Self {
        Self::new(delta, Outcome::done())
    }

    /// Merge `delta`, then suspend the run until input arrives.
    /// The node runs again on resume.
    pub fn suspend(delta: Delta, request: InputRequest) -> Self {
        Self {
            delta,
            outcome: Outcome::new("suspended"),
            suspend: Some(request),
        }
    }

    pub fn is_suspend(&self) -> bool {
        self.suspend.is_some()
    }
}

/// Context handed to a node for one execution attempt
#[derive(Debug, Clone)]
pub struct NodeContext {
    run_id: String,
    node: NodeName,
    step: usize,
    attempt: usize,
    state: Arc<StateContainer>,
    cancel: CancellationToken,
}

impl NodeContext {
    pub fn new(
        run_id: impl Into<String>,
        node: NodeName,
        step: usize,
        attempt: usize,
        state: Arc<StateContainer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            node,
            step,
            attempt,
            state,
            cancel,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn node(&self) -> &NodeName {
        &self.node
    }

    /// Step number, starting at 1
    pub fn step(&self) -> usize {
        self.step
    }

    /// Attempt number within the step, starting at 1
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Read-only state as of the start of the step
    pub fn state(&self) -> &StateContainer {
        &self.state
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Await a collaborator call with a timeout, observing cancellation
    pub async fn call<F, T, E>(&self, timeout: Duration, fut: F) -> Result<T, NodeError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<NodeError>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NodeError::Cancelled),
            result = tokio::time::timeout(timeout, fut) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(NodeError::Timeout(timeout)),
            },
        }
    }
}

/// A unit of work in the graph
#[async_trait]
pub trait Node: Send + Sync {
    fn descriptor(&self) -> &NodeDescriptor;

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError>;

    fn name(&self) -> &NodeName {
        &self.descriptor().name
    }
}

/// Type alias for shared node trait objects
pub type BoxedNode = Arc<dyn Node>;

/// Nodes by name, in declaration order
#[derive(Clone, Default)]
pub struct NodeRegistry {
    nodes: Vec<BoxedNode>,
    index: HashMap<NodeName, usize>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Names must be unique and cannot be `END`.
    pub fn register(&mut self, node: BoxedNode) -> Result<(), BuildError> {
        let name = node.name().clone();
        if name.is_end() {
            return Err(BuildError::ReservedName(name));
        }
        if self.index.contains_key(&name) {
            return Err(BuildError::DuplicateNode(name));
        }
        self.index.insert(name, self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn get(&self, name: &NodeName) -> Option<&BoxedNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn descriptor(&self, name: &NodeName) -> Option<&NodeDescriptor> {
        self.get(name).map(|n| n.descriptor())
    }

    /// Declaration position, used to order merges and scheduling
    pub fn position(&self, name: &NodeName) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &NodeName) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoxedNode> {
        self.nodes.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &NodeName> {
        self.nodes.iter().map(|n| n.name())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        descriptor: NodeDescriptor,
    }

    #[async_trait]
    impl Node for Echo {
        fn descriptor(&self) -> &NodeDescriptor {
            &self.descriptor
        }

        async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
            let topic = ctx.state().get_str("topic").unwrap_or_default().to_string();
            Ok(NodeOutput::done(Delta::new().with("echo", topic)))
        }
    }

    fn echo(name: &str) -> BoxedNode {
        Arc::new(Echo {
            descriptor: NodeDescriptor::new(name, Capability::Generate)
                .reads(["topic"])
                .writes(["echo"]),
        })
    }

    fn ctx(cancel: CancellationToken) -> NodeContext {
        NodeContext::new(
            "run-1",
            NodeName::new("echo"),
            1,
            1,
            Arc::new(StateContainer::from_pairs([("topic", serde_json::json!("rust"))])),
            cancel,
        )
    }

    #[test]
    fn test_node_name_end() {
        assert!(NodeName::end().is_end());
        assert!(!NodeName::new("review").is_end());
        assert_eq!(NodeName::from("a").to_string(), "a");
    }

    #[test]
    fn test_descriptor_builder() {
        let d = NodeDescriptor::new("review", Capability::Critique)
            .reads(["draft_content"])
            .writes(["review_verdict", "review_score"])
            .with_timeout(Duration::from_secs(5))
            .terminal(Terminal::Success);

        assert!(d.declares_write("review_verdict"));
        assert!(!d.declares_write("draft_content"));
        assert!(d.is_terminal());
        assert_eq!(d.timeout, Some(Duration::from_secs(5)));
        assert_eq!(d.capability.to_string(), "critique");
    }

    #[tokio::test]
    async fn test_node_execute() {
        let node = echo("echo");
        let out = node.execute(&ctx(CancellationToken::new())).await.unwrap();
        assert_eq!(out.outcome, Outcome::done());
        assert_eq!(out.delta.get("echo"), Some(&serde_json::json!("rust")));
        assert!(!out.is_suspend());
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let ctx = ctx(CancellationToken::new());
        let result: Result<(), NodeError> = ctx
            .call(Duration::from_millis(10), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), NodeError>(())
            })
            .await;
        assert_eq!(result, Err(NodeError::Timeout(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_call_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = ctx(token.clone());
        token.cancel();
        let result: Result<u32, NodeError> = ctx
            .call(Duration::from_secs(5), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<u32, NodeError>(1)
            })
            .await;
        assert_eq!(result, Err(NodeError::Cancelled));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_call_passes_value() {
        let ctx = ctx(CancellationToken::new());
        let value = ctx
            .call(Duration::from_secs(1), async { Ok::<_, NodeError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = NodeRegistry::new();
        registry.register(echo("a")).unwrap();
        registry.register(echo("b")).unwrap();
        assert_eq!(
            registry.register(echo("a")).unwrap_err(),
            BuildError::DuplicateNode(NodeName::new("a"))
        );
        assert_eq!(
            registry.register(echo(END)).unwrap_err(),
            BuildError::ReservedName(NodeName::end())
        );
        assert_eq!(registry.position(&NodeName::new("b")), Some(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_suspend_output() {
        let out = NodeOutput::suspend(
            Delta::new(),
            InputRequest::new("approve?", ["human_decision"]),
        );
        assert!(out.is_suspend());
        assert_eq!(out.suspend.unwrap().required_fields, vec!["human_decision"]);
    }
}
