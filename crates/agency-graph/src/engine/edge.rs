//! Routing rules and the edge resolver
//!
//! Each source node owns an ordered list of [`Rule`]s. The resolver walks them
//! in declaration order and the first rule whose predicate matches decides
//! the next node set. Cycles are ordinary edges; a [`Action::BoundedLoop`]
//! caps them by consulting a counter field in the state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::StructuralError;
use super::node::{NodeName, Outcome};
use super::state::StateContainer;

/// Condition on a single state field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldCondition {
    /// Value equals expected
    Equals { value: Value },

    /// Value is in set of options
    In { values: Vec<Value> },

    /// String value matches regex pattern
    Matches { pattern: String },

    /// Value is truthy (non-null, non-empty, non-false, non-zero)
    IsTruthy,

    /// Value is falsy
    IsFalsy,

    /// Numeric value >= threshold
    AtLeast { threshold: f64 },

    /// Numeric value < threshold
    Below { threshold: f64 },

    /// Always true
    Always,
}

impl FieldCondition {
    /// Evaluate against a field value; a missing field is treated as null
    pub fn evaluate(&self, value: Option<&Value>) -> bool {
        let value = value.unwrap_or(&Value::Null);
        match self {
            FieldCondition::Equals { value: expected } => value == expected,
            FieldCondition::In { values } => values.contains(value),
            FieldCondition::Matches { pattern } => match value.as_str() {
                // Invalid regex doesn't match
                Some(s) => regex::Regex::new(pattern)
                    .map(|re| re.is_match(s))
                    .unwrap_or(false),
                None => false,
            },
            FieldCondition::IsTruthy => is_truthy(value),
            FieldCondition::IsFalsy => !is_truthy(value),
            FieldCondition::AtLeast { threshold } => {
                value.as_f64().map(|n| n >= *threshold).unwrap_or(false)
            }
            FieldCondition::Below { threshold } => {
                value.as_f64().map(|n| n < *threshold).unwrap_or(false)
            }
            FieldCondition::Always => true,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
        Value::Null => false,
    }
}

/// Predicate over the source node's outcome and the merged state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Always,
    Outcome { label: String },
    Field { field: String, condition: FieldCondition },
    All { predicates: Vec<Predicate> },
    Any { predicates: Vec<Predicate> },
    Not { predicate: Box<Predicate> },
}

impl Predicate {
    pub fn outcome(label: impl Into<String>) -> Self {
        Predicate::Outcome {
            label: label.into(),
        }
    }

    pub fn field(field: impl Into<String>, condition: FieldCondition) -> Self {
        Predicate::Field {
            field: field.into(),
            condition,
        }
    }

    pub fn evaluate(&self, outcome: &Outcome, state: &StateContainer) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Outcome { label } => outcome.as_str() == label,
            Predicate::Field { field, condition } => condition.evaluate(state.get(field)),
            Predicate::All { predicates } => predicates.iter().all(|p| p.evaluate(outcome, state)),
            Predicate::Any { predicates } => predicates.iter().any(|p| p.evaluate(outcome, state)),
            Predicate::Not { predicate } => !predicate.evaluate(outcome, state),
        }
    }

    /// Short label for diagrams
    pub fn label(&self) -> Option<String> {
        match self {
            Predicate::Always => None,
            Predicate::Outcome { label } => Some(label.clone()),
            Predicate::Field { field, .. } => Some(field.clone()),
            Predicate::All { .. } => Some("all".into()),
            Predicate::Any { .. } => Some("any".into()),
            Predicate::Not { .. } => Some("not".into()),
        }
    }
}

/// What a matching rule does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Route to the listed nodes (fan-out when more than one). `END` resolves to nothing.
    Goto { targets: Vec<NodeName> },

    /// Route back to `target` while `counter <= max`, otherwise to `escalate_to`
    BoundedLoop {
        target: NodeName,
        counter: String,
        max: u64,
        escalate_to: NodeName,
    },
}

impl Action {
    /// Every node this action may route to
    pub fn targets(&self) -> Vec<&NodeName> {
        match self {
            Action::Goto { targets } => targets.iter().collect(),
            Action::BoundedLoop {
                target,
                escalate_to,
                ..
            } => vec![target, escalate_to],
        }
    }
}

/// One outgoing routing rule of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub predicate: Predicate,
    pub action: Action,
}

/// Diagnostics recorded when a bounded loop runs out of budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub source: NodeName,
    pub counter: String,
    pub value: u64,
    pub max: u64,
}

/// Resolved routing decision for one completed node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Routing {
    pub next: Vec<NodeName>,
    pub escalation: Option<Escalation>,
}

/// Ordered routing rules per source node
#[derive(Debug, Clone, Default)]
pub struct EdgeResolver {
    rules: HashMap<NodeName, Vec<Rule>>,
}

impl EdgeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, source: NodeName, rule: Rule) {
        self.rules.entry(source).or_default().push(rule);
    }

    pub fn rules_for(&self, source: &NodeName) -> &[Rule] {
        self.rules.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_rules(&self, source: &NodeName) -> bool {
        !self.rules_for(source).is_empty()
    }

    /// Compute the next node set for `source`, first matching rule wins
    pub fn resolve(
        &self,
        source: &NodeName,
        outcome: &Outcome,
        state: &StateContainer,
    ) -> Result<Routing, StructuralError> {
        let rule = self
            .rules_for(source)
            .iter()
            .find(|rule| rule.predicate.evaluate(outcome, state))
            .ok_or_else(|| StructuralError::UnresolvedRoute {
                node: source.clone(),
                outcome: outcome.to_string(),
            })?;

        let routing = match &rule.action {
            Action::Goto { targets } => Routing {
                next: targets.iter().filter(|t| !t.is_end()).cloned().collect(),
                escalation: None,
            },
            Action::BoundedLoop {
                target,
                counter,
                max,
                escalate_to,
            } => {
                let value = state.get_u64(counter).unwrap_or(0);
                if value <= *max {
                    Routing {
                        next: vec![target.clone()],
                        escalation: None,
                    }
                } else {
                    warn!(
                        node = %source,
                        counter = %counter,
                        value,
                        max,
                        escalate_to = %escalate_to,
                        "Loop budget exhausted, escalating"
                    );
                    Routing {
                        next: vec![escalate_to.clone()],
                        escalation: Some(Escalation {
                            source: source.clone(),
                            counter: counter.clone(),
                            value,
                            max: *max,
                        }),
                    }
                }
            }
        };

        debug!(node = %source, outcome = %outcome, next = ?routing.next, "Resolved routing");
        Ok(routing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::Delta;
    use serde_json::json;

    fn goto(targets: &[&str]) -> Action {
        Action::Goto {
            targets: targets.iter().map(|t| NodeName::new(*t)).collect(),
        }
    }

    fn review_resolver(max: u64) -> EdgeResolver {
        let mut resolver = EdgeResolver::new();
        let review = NodeName::new("review");
        resolver.add_rule(
            review.clone(),
            Rule {
                predicate: Predicate::outcome("accept"),
                action: goto(&["finalize"]),
            },
        );
        resolver.add_rule(
            review,
            Rule {
                predicate: Predicate::outcome("reject"),
                action: Action::BoundedLoop {
                    target: NodeName::new("copywriting"),
                    counter: "revision_count".into(),
                    max,
                    escalate_to: NodeName::new("escalate"),
                },
            },
        );
        resolver
    }

    fn with_count(count: u64) -> StateContainer {
        StateContainer::default().merge(Delta::new().with("revision_count", count))
    }

    #[test]
    fn test_field_conditions() {
        let v = json!("blog_post");
        assert!(FieldCondition::Equals { value: json!("blog_post") }.evaluate(Some(&v)));
        assert!(FieldCondition::In { values: vec![json!("ad"), json!("blog_post")] }.evaluate(Some(&v)));
        assert!(FieldCondition::Matches { pattern: "^blog".into() }.evaluate(Some(&v)));
        assert!(!FieldCondition::Matches { pattern: "(".into() }.evaluate(Some(&v)));
        assert!(FieldCondition::IsTruthy.evaluate(Some(&v)));
        assert!(FieldCondition::IsFalsy.evaluate(None));
        assert!(FieldCondition::IsFalsy.evaluate(Some(&json!(0))));
        assert!(FieldCondition::AtLeast { threshold: 7.0 }.evaluate(Some(&json!(7))));
        assert!(FieldCondition::Below { threshold: 7.0 }.evaluate(Some(&json!(6.5))));
        assert!(!FieldCondition::Below { threshold: 7.0 }.evaluate(None));
        assert!(FieldCondition::Always.evaluate(None));
    }

    #[test]
    fn test_predicate_combinators() {
        let state = StateContainer::from_pairs([("review_score", json!(8))]);
        let outcome = Outcome::new("accept");
        let p = Predicate::All {
            predicates: vec![
                Predicate::outcome("accept"),
                Predicate::field("review_score", FieldCondition::AtLeast { threshold: 7.0 }),
            ],
        };
        assert!(p.evaluate(&outcome, &state));
        let not = Predicate::Not { predicate: Box::new(p) };
        assert!(!not.evaluate(&outcome, &state));
        let any = Predicate::Any {
            predicates: vec![Predicate::outcome("reject"), Predicate::Always],
        };
        assert!(any.evaluate(&outcome, &state));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let mut resolver = EdgeResolver::new();
        let a = NodeName::new("a");
        resolver.add_rule(a.clone(), Rule { predicate: Predicate::Always, action: goto(&["b"]) });
        resolver.add_rule(a.clone(), Rule { predicate: Predicate::Always, action: goto(&["c"]) });
        let routing = resolver.resolve(&a, &Outcome::done(), &StateContainer::default()).unwrap();
        assert_eq!(routing.next, vec![NodeName::new("b")]);
    }

    #[test]
    fn test_fan_out_and_end() {
        let mut resolver = EdgeResolver::new();
        let intake = NodeName::new("intake");
        resolver.add_rule(intake.clone(), Rule { predicate: Predicate::Always, action: goto(&["research", "brand_guidelines", "END"]) });
        let routing = resolver.resolve(&intake, &Outcome::done(), &StateContainer::default()).unwrap();
        assert_eq!(routing.next, vec![NodeName::new("research"), NodeName::new("brand_guidelines")]);

        let done = NodeName::new("done");
        resolver.add_rule(done.clone(), Rule { predicate: Predicate::Always, action: goto(&[END_NAME]) });
        let routing = resolver.resolve(&done, &Outcome::done(), &StateContainer::default()).unwrap();
        assert!(routing.next.is_empty());
    }

    const END_NAME: &str = crate::engine::node::END;

    #[test]
    fn test_unresolved_route() {
        let resolver = review_resolver(3);
        let err = resolver
            .resolve(&NodeName::new("review"), &Outcome::new("maybe"), &with_count(1))
            .unwrap_err();
        assert_eq!(
            err,
            StructuralError::UnresolvedRoute {
                node: NodeName::new("review"),
                outcome: "maybe".into(),
            }
        );
    }

    #[test]
    fn test_bounded_loop_routes_back_within_budget() {
        let resolver = review_resolver(2);
        for count in [1, 2] {
            let routing = resolver
                .resolve(&NodeName::new("review"), &Outcome::new("reject"), &with_count(count))
                .unwrap();
            assert_eq!(routing.next, vec![NodeName::new("copywriting")]);
            assert!(routing.escalation.is_none());
        }
    }

    #[test]
    fn test_bounded_loop_escalates() {
        let resolver = review_resolver(2);
        let routing = resolver
            .resolve(&NodeName::new("review"), &Outcome::new("reject"), &with_count(3))
            .unwrap();
        assert_eq!(routing.next, vec![NodeName::new("escalate")]);
        assert_eq!(
            routing.escalation,
            Some(Escalation {
                source: NodeName::new("review"),
                counter: "revision_count".into(),
                value: 3,
                max: 2,
            })
        );
    }

    #[test]
    fn test_rule_serialization() {
        let rule = Rule {
            predicate: Predicate::field("ab_test_winner", FieldCondition::Equals { value: json!("B") }),
            action: goto(&["designer"]),
        };
        let json = serde_json::to_string(&rule).unwrap();
        let parsed: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }
}
