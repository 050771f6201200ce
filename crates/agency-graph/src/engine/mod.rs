//! Stateful cyclic graph engine
//!
//! The engine executes a [`Graph`] of [`Node`]s over a versioned
//! [`StateContainer`] in discrete steps:
//!
//! 1. **Execute** - run every scheduled node, concurrently when fanned out
//! 2. **Merge** - fold all deltas into exactly one new state version
//! 3. **Route** - resolve each node's outcome into the next node set
//!
//! Loops are ordinary edges bounded by counters in the state; a global step
//! limit catches anything else.
//!
//! # Example
//!
//! ```ignore
//! use agency_graph::engine::*;
//!
//! let graph = GraphBuilder::new()
//!     .name("draft-review")
//!     .node(CopywriterNode::new(generator))
//!     .node(ReviewNode::new(scorer))
//!     .node(FinalizeNode)
//!     .entry("copywriting")
//!     .edge("copywriting", "review")
//!     .conditional_edges("review", vec![("accept", "finalize")])
//!     .bounded_loop("review", Predicate::outcome("reject"), "copywriting", "revision_count", 3, "escalate")
//!     .build()?;
//!
//! let executor = Executor::new(Arc::new(graph), ExecutorConfig::default());
//! let report = executor.run(run_id, initial_state, &RunControl::new()).await;
//! ```

pub mod checkpoint;
pub mod config;
pub mod edge;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod state;
pub mod visualization;

pub use checkpoint::{
    create_checkpointer, Checkpoint, Checkpointer, CheckpointerConfig, FileCheckpointer,
    MemoryCheckpointer, CHECKPOINT_FORMAT_VERSION,
};
#[cfg(feature = "checkpointer-sqlite")]
pub use checkpoint::SqliteCheckpointer;
pub use config::{ExecutorConfig, RetryPolicy};
pub use edge::{Action, EdgeResolver, Escalation, FieldCondition, Predicate, Routing, Rule};
pub use error::{ErrorKind, GraphError, NodeError, RunFailure, StructuralError};
pub use executor::{Executor, ResumePoint, RunControl, RunReport, RunStatus, StepRecord};
pub use graph::{BuildError, Graph, GraphBuilder, GraphEdge};
pub use node::{
    AwaitingInput, BoxedNode, Capability, InputRequest, Node, NodeContext, NodeDescriptor,
    NodeName, NodeOutput, NodeRegistry, Outcome, Terminal, END,
};
pub use state::{Delta, HistoryEntry, StateContainer, WriteRecord};
pub use visualization::{
    node_statuses, statuses_from_report, to_mermaid, to_mermaid_with_status, NodeStatus,
};
