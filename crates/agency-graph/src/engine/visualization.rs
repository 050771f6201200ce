//! Mermaid diagram generation for graphs
//!
//! # Node Shapes
//!
//! | Capability | Shape             | Mermaid Syntax |
//! |------------|-------------------|----------------|
//! | Generate   | Rectangle         | `id[label]`    |
//! | Critique   | Hexagon           | `id{{label}}`  |
//! | Route      | Diamond           | `id{label}`    |
//! | Publish    | Subroutine        | `id[[label]]`  |
//! | Terminal   | Stadium           | `id([label])`  |

use std::collections::HashMap;

use super::error::RunFailure;
use super::executor::{RunReport, RunStatus, StepRecord};
use super::graph::Graph;
use super::node::{Capability, NodeDescriptor, NodeName};

/// Execution status used to colour a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Scheduled for the next step
    Pending,
    /// Ran at least once
    Executed,
    /// The run failed at this node
    Failed,
}

// ============================================================================
// ID Sanitization
// ============================================================================

/// Sanitize a node name for use as a Mermaid node identifier.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// Node Rendering
// ============================================================================

/// Render a node with the shape for its capability.
pub fn render_node(descriptor: &NodeDescriptor) -> String {
    let safe_id = sanitize_id(descriptor.name.as_str());
    let label = descriptor.name.as_str();

    if descriptor.is_terminal() {
        return format!("    {}([{}])", safe_id, label);
    }
    match descriptor.capability {
        Capability::Generate => format!("    {}[{}]", safe_id, label),
        Capability::Critique => format!("    {}{{{{{}}}}}", safe_id, label),
        Capability::Route => format!("    {}{{{}}}", safe_id, label),
        Capability::Publish => format!("    {}[[{}]]", safe_id, label),
    }
}

/// Render a node with a status class for colouring.
pub fn render_node_with_status(descriptor: &NodeDescriptor, status: Option<NodeStatus>) -> String {
    let base = render_node(descriptor);
    match status {
        Some(NodeStatus::Pending) => format!("{}:::pending", base),
        Some(NodeStatus::Executed) => format!("{}:::executed", base),
        Some(NodeStatus::Failed) => format!("{}:::failed", base),
        None => base,
    }
}

// ============================================================================
// Edge Rendering
// ============================================================================

/// Render an edge. Labelled edges are dotted.
pub fn render_edge(from: &NodeName, to: &NodeName, label: Option<&str>) -> String {
    let from_safe = sanitize_id(from.as_str());
    let to_safe = sanitize_id(to.as_str());

    match label {
        Some(label) => format!("    {} -. \"{}\" .-> {}", from_safe, label, to_safe),
        None => format!("    {} --> {}", from_safe, to_safe),
    }
}

/// CSS class definitions for node statuses.
pub const STYLE_DEFS: &str = r#"
    classDef pending fill:#90EE90,stroke:#228B22,stroke-width:2px
    classDef executed fill:#D3D3D3,stroke:#696969,stroke-width:1px
    classDef failed fill:#FFB6B6,stroke:#B22222,stroke-width:2px
"#;

// ============================================================================
// Whole graphs
// ============================================================================

/// Render a graph as a Mermaid flowchart.
pub fn to_mermaid(graph: &Graph) -> String {
    to_mermaid_with_status(graph, &HashMap::new())
}

/// Render a graph, colouring nodes by execution status.
pub fn to_mermaid_with_status(graph: &Graph, statuses: &HashMap<NodeName, NodeStatus>) -> String {
    let mut lines = vec!["flowchart TD".to_string()];
    lines.push("    START([START])".to_string());
    for node in graph.registry().iter() {
        let d = node.descriptor();
        lines.push(render_node_with_status(d, statuses.get(&d.name).copied()));
    }

    let mut has_end = false;
    lines.push(render_edge(&NodeName::new("START"), graph.entry(), None));
    for edge in graph.edges() {
        has_end |= edge.to.is_end();
        lines.push(render_edge(&edge.from, &edge.to, edge.label.as_deref()));
    }
    if has_end {
        lines.insert(2, "    END([END])".to_string());
    }

    if !statuses.is_empty() {
        lines.push(STYLE_DEFS.trim_end().to_string());
    }
    lines.join("\n")
}

/// Derive node statuses from a run report.
pub fn statuses_from_report(report: &RunReport) -> HashMap<NodeName, NodeStatus> {
    let failure = match report.status {
        RunStatus::Failed => report.failure.as_ref(),
        _ => None,
    };
    node_statuses(&report.trace, &report.pending, failure)
}

/// Node statuses from a step trace, the pending set and an optional failure.
pub fn node_statuses(
    trace: &[StepRecord],
    pending: &[NodeName],
    failure: Option<&RunFailure>,
) -> HashMap<NodeName, NodeStatus> {
    let mut statuses = HashMap::new();
    for record in trace {
        for node in &record.nodes {
            statuses.insert(node.clone(), NodeStatus::Executed);
        }
    }
    for node in pending {
        statuses.insert(node.clone(), NodeStatus::Pending);
    }
    if let Some(node) = failure.and_then(|f| f.node.as_ref()) {
        statuses.insert(node.clone(), NodeStatus::Failed);
    }
    statuses
}

// ============================================================================
// Tests
// ============================================================================
