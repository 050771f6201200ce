//! Graph builder DSL.
//!
//! Provides a fluent API for registering nodes, routing rules and the entry
//! point, then validates everything into an immutable [`Graph`].

use std::sync::Arc;

use thiserror::Error;

use super::edge::{Action, EdgeResolver, Predicate, Rule};
use super::node::{BoxedNode, Node, NodeDescriptor, NodeName, NodeRegistry};

/// Errors that can occur while building a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("graph entry point not set")]
    NoEntryPoint,
    #[error("unknown node: {0}")]
    UnknownNode(NodeName),
    #[error("duplicate node: {0}")]
    DuplicateNode(NodeName),
    #[error("'{0}' is reserved")]
    ReservedName(NodeName),
    #[error("non-terminal node {0} has no outgoing edges")]
    MissingEdges(NodeName),
    #[error("terminal node {0} must not have outgoing edges")]
    TerminalWithEdges(NodeName),
}

/// Edge view for visualization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub from: NodeName,
    pub to: NodeName,
    pub label: Option<String>,
}

/// Builder for constructing graphs with fluent API.
#[derive(Default)]
pub struct GraphBuilder {
    name: String,
    registry: NodeRegistry,
    rules: Vec<(NodeName, Rule)>,
    entry: Option<NodeName>,
    error: Option<BuildError>,
}

impl GraphBuilder {
    /// Create a new graph builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the graph name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a node.
    pub fn node(self, node: impl Node + 'static) -> Self {
        self.shared_node(Arc::new(node))
    }

    /// Register an already shared node.
    pub fn shared_node(mut self, node: BoxedNode) -> Self {
        if let Err(e) = self.registry.register(node) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set the entry point node.
    pub fn entry(mut self, name: impl Into<NodeName>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Add an unconditional edge.
    pub fn edge(self, from: impl Into<NodeName>, to: impl Into<NodeName>) -> Self {
        self.fan_out(from, [to])
    }

    /// Route to several nodes that run concurrently in the next step.
    pub fn fan_out<I, T>(self, from: impl Into<NodeName>, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NodeName>,
    {
        self.rule(
            from,
            Predicate::Always,
            Action::Goto {
                targets: targets.into_iter().map(Into::into).collect(),
            },
        )
    }

    /// Add outcome-labelled edges from a node.
    pub fn conditional_edges(mut self, from: impl Into<NodeName>, edges: Vec<(&str, &str)>) -> Self {
        let from = from.into();
        for (outcome, target) in edges {
            self = self.rule(
                from.clone(),
                Predicate::outcome(outcome),
                Action::Goto {
                    targets: vec![NodeName::new(target)],
                },
            );
        }
        self
    }

    /// Add a route-back edge capped by a counter field.
    pub fn bounded_loop(
        self,
        from: impl Into<NodeName>,
        predicate: Predicate,
        target: impl Into<NodeName>,
        counter: impl Into<String>,
        max: u64,
        escalate_to: impl Into<NodeName>,
    ) -> Self {
        self.rule(
            from,
            predicate,
            Action::BoundedLoop {
                target: target.into(),
                counter: counter.into(),
                max,
                escalate_to: escalate_to.into(),
            },
        )
    }

    /// Add an arbitrary routing rule.
    pub fn rule(mut self, from: impl Into<NodeName>, predicate: Predicate, action: Action) -> Self {
        self.rules.push((from.into(), Rule { predicate, action }));
        self
    }

    /// Validate and build the graph.
    pub fn build(self) -> Result<Graph, BuildError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let entry = self.entry.ok_or(BuildError::NoEntryPoint)?;
        if !self.registry.contains(&entry) {
            return Err(BuildError::UnknownNode(entry));
        }

        let mut resolver = EdgeResolver::new();
        for (from, rule) in self.rules {
            if !self.registry.contains(&from) {
                return Err(BuildError::UnknownNode(from));
            }
            for target in rule.action.targets() {
                if !target.is_end() && !self.registry.contains(target) {
                    return Err(BuildError::UnknownNode(target.clone()));
                }
            }
            resolver.add_rule(from, rule);
        }

        for node in self.registry.iter() {
            let d = node.descriptor();
            match (d.is_terminal(), resolver.has_rules(&d.name)) {
                (true, true) => return Err(BuildError::TerminalWithEdges(d.name.clone())),
                (false, false) => return Err(BuildError::MissingEdges(d.name.clone())),
                _ => {}
            }
        }

        Ok(Graph {
            name: self.name,
            registry: self.registry,
            resolver,
            entry,
        })
    }
}

/// Validated, immutable graph.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    registry: NodeRegistry,
    resolver: EdgeResolver,
    entry: NodeName,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &NodeName {
        &self.entry
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &EdgeResolver {
        &self.resolver
    }

    pub fn node(&self, name: &NodeName) -> Option<&BoxedNode> {
        self.registry.get(name)
    }

    pub fn descriptor(&self, name: &NodeName) -> Option<&NodeDescriptor> {
        self.registry.descriptor(name)
    }

    /// All edges in node declaration order, then rule order.
    pub fn edges(&self) -> Vec<GraphEdge> {
        let mut edges = Vec::new();
        for from in self.registry.names() {
            for rule in self.resolver.rules_for(from) {
                let label = rule.predicate.label();
                match &rule.action {
                    Action::Goto { targets } => {
                        for to in targets {
                            edges.push(GraphEdge {
                                from: from.clone(),
                                to: to.clone(),
                                label: label.clone(),
                            });
                        }
                    }
                    Action::BoundedLoop {
                        target,
                        counter,
                        max,
                        escalate_to,
                    } => {
                        let base = label.clone().unwrap_or_default();
                        edges.push(GraphEdge {
                            from: from.clone(),
                            to: target.clone(),
                            label: Some(format!("{base} {counter}<={max}").trim().to_string()),
                        });
                        edges.push(GraphEdge {
                            from: from.clone(),
                            to: escalate_to.clone(),
                            label: Some(format!("{base} {counter}>{max}").trim().to_string()),
                        });
                    }
                }
            }
        }
        edges
    }
}
