//! Campaign nodes
//!
//! Every node reads the step's state snapshot, calls at most a few
//! collaborators through [`NodeContext::call`], and returns a delta limited
//! to the fields its descriptor declares.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::brief::{BriefError, ContentType};
use super::fields;
use super::names;
use crate::collaborators::{ContentGenerator, ContentScorer, GuidelineSource};
use crate::engine::{
    Capability, Delta, InputRequest, Node, NodeContext, NodeDescriptor, NodeError, NodeOutput,
    Outcome, StateContainer, Terminal,
};

const DEFAULT_AUDIENCE: &str = "general audience";
const CALL_TO_ACTION: &str = "Get Started Today!";

/// Outcome labels
pub mod outcomes {
    pub const ACCEPT: &str = "accept";
    pub const REJECT: &str = "reject";
    pub const APPROVE: &str = "approve";
}

fn require_str<'a>(state: &'a StateContainer, field: &str) -> Result<&'a str, NodeError> {
    state
        .get_str(field)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| NodeError::fatal(format!("missing required field '{field}'")))
}

fn audience(state: &StateContainer) -> &str {
    state
        .get_str(fields::TARGET_AUDIENCE)
        .unwrap_or(DEFAULT_AUDIENCE)
}

fn draft_field<'a>(draft: &'a Value, key: &str) -> &'a str {
    draft.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Intake
// ============================================================================

/// Validates the brief and fills in defaults
pub struct IntakeNode {
    descriptor: NodeDescriptor,
    default_channels: Vec<String>,
}

impl IntakeNode {
    pub fn new(default_channels: Vec<String>) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::INTAKE, Capability::Route)
                .reads([
                    fields::NAME,
                    fields::TOPIC,
                    fields::TARGET_AUDIENCE,
                    fields::TONE,
                    fields::CONTENT_TYPE,
                    fields::CHANNELS,
                ])
                .writes([
                    fields::NAME,
                    fields::TARGET_AUDIENCE,
                    fields::TONE,
                    fields::CONTENT_TYPE,
                    fields::CHANNELS,
                ]),
            default_channels,
        }
    }
}

#[async_trait]
impl Node for IntakeNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let topic = require_str(state, fields::TOPIC)
            .map_err(|_| NodeError::fatal("brief has no topic"))?;

        let content_type: ContentType = match state.get_str(fields::CONTENT_TYPE) {
            Some(raw) => raw
                .parse()
                .map_err(|e: BriefError| NodeError::fatal(e.to_string()))?,
            None => ContentType::default(),
        };
        let tone = state
            .get_str(fields::TONE)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("professional");
        let name = state
            .get_str(fields::NAME)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(topic);
        let channels = match state.get_as::<Vec<String>>(fields::CHANNELS) {
            Some(channels) if !channels.is_empty() => channels,
            _ => self.default_channels.clone(),
        };

        info!(run_id = %ctx.run_id(), topic, content_type = %content_type, "Brief accepted");

        let delta = Delta::new()
            .with(fields::NAME, name)
            .with(fields::TARGET_AUDIENCE, audience(state))
            .with(fields::TONE, tone)
            .with(fields::CONTENT_TYPE, content_type.as_str())
            .with(fields::CHANNELS, channels);
        Ok(NodeOutput::done(delta))
    }
}

// ============================================================================
// Research
// ============================================================================

/// Gathers key points on the topic
pub struct ResearchNode {
    descriptor: NodeDescriptor,
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

impl ResearchNode {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::RESEARCH, Capability::Generate)
                .reads([fields::TOPIC, fields::TARGET_AUDIENCE])
                .writes([fields::RESEARCH]),
            generator,
            timeout,
        }
    }
}

#[async_trait]
impl Node for ResearchNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let topic = require_str(state, fields::TOPIC)?;
        let audience = audience(state);

        let prompt = format!("Research '{topic}' for {audience}. List the key points, one per line.");
        let context = json!({
            "task": "research",
            "topic": topic,
            "target_audience": audience,
        });
        let notes = ctx
            .call(self.timeout, self.generator.generate(&prompt, &context))
            .await?;

        let research = json!({
            "themes": [topic],
            "key_points": lines(&notes),
            "keywords": [topic.to_lowercase(), audience.to_lowercase()],
            "sources": ["Industry reports", "Expert opinions"],
            "summary": format!("Research summary for {topic}"),
        });
        Ok(NodeOutput::done(Delta::new().with(fields::RESEARCH, research)))
    }
}

// ============================================================================
// Brand guidelines
// ============================================================================

pub struct BrandGuidelinesNode {
    descriptor: NodeDescriptor,
    source: Arc<dyn GuidelineSource>,
    timeout: Duration,
}

impl BrandGuidelinesNode {
    pub fn new(source: Arc<dyn GuidelineSource>, timeout: Duration) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::BRAND_GUIDELINES, Capability::Generate)
                .reads([fields::TOPIC])
                .writes([fields::BRAND_GUIDELINES]),
            source,
            timeout,
        }
    }
}

#[async_trait]
impl Node for BrandGuidelinesNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let topic = require_str(ctx.state(), fields::TOPIC)?;
        let guidelines = ctx.call(self.timeout, self.source.lookup(topic)).await?;
        Ok(NodeOutput::done(
            Delta::new().with(fields::BRAND_GUIDELINES, guidelines),
        ))
    }
}

// ============================================================================
// Copywriting
// ============================================================================

/// Writes a draft; every execution counts as one revision
pub struct CopywritingNode {
    descriptor: NodeDescriptor,
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

impl CopywritingNode {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::COPYWRITING, Capability::Generate)
                .reads([
                    fields::TOPIC,
                    fields::TARGET_AUDIENCE,
                    fields::TONE,
                    fields::CONTENT_TYPE,
                    fields::RESEARCH,
                    fields::BRAND_GUIDELINES,
                    fields::REVIEW_FEEDBACK,
                    fields::REVISION_COUNT,
                ])
                .writes([fields::DRAFT_CONTENT, fields::REVISION_COUNT]),
            generator,
            timeout,
        }
    }
}

#[async_trait]
impl Node for CopywritingNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let topic = require_str(state, fields::TOPIC)?;
        let audience = audience(state);
        let tone = state.get_str(fields::TONE).unwrap_or("professional");
        let content_type = state
            .get_str(fields::CONTENT_TYPE)
            .unwrap_or(ContentType::default().as_str());
        let revision = state.get_u64(fields::REVISION_COUNT).unwrap_or(0) + 1;

        // Feedback only applies to a rewrite
        let feedback = if revision > 1 {
            state.get_str(fields::REVIEW_FEEDBACK)
        } else {
            None
        };
        let key_points = state
            .get(fields::RESEARCH)
            .and_then(|r| r.get("key_points"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));

        let prompt = format!(
            "Write a {content_type} about '{topic}' for {audience} in a {tone} tone. \
             Follow the brand guidelines and cover the key points."
        );
        let context = json!({
            "task": "copy",
            "topic": topic,
            "target_audience": audience,
            "tone": tone,
            "content_type": content_type,
            "key_points": key_points,
            "guidelines": state.get_str(fields::BRAND_GUIDELINES),
            "feedback": feedback,
            "revision": revision,
        });
        let body = ctx
            .call(self.timeout, self.generator.generate(&prompt, &context))
            .await?;

        debug!(run_id = %ctx.run_id(), revision, words = word_count(&body), "Draft written");

        let draft = json!({
            "headline": format!("The Complete Guide to {topic}"),
            "body": body,
            "call_to_action": CALL_TO_ACTION,
            "word_count": word_count(&body),
            "revision": revision,
        });
        Ok(NodeOutput::done(
            Delta::new()
                .with(fields::DRAFT_CONTENT, draft)
                .with(fields::REVISION_COUNT, revision),
        ))
    }
}

// ============================================================================
// A/B simulator
// ============================================================================

/// Pits the draft against a generated variant in front of a simulated audience
pub struct AbSimulatorNode {
    descriptor: NodeDescriptor,
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

impl AbSimulatorNode {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::AB_SIMULATOR, Capability::Critique)
                .reads([fields::DRAFT_CONTENT, fields::TOPIC, fields::TARGET_AUDIENCE])
                .writes([fields::DRAFT_CONTENT, fields::AB_TEST_WINNER, fields::AB_TEST_LOGS]),
            generator,
            timeout,
        }
    }
}

#[async_trait]
impl Node for AbSimulatorNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let topic = require_str(state, fields::TOPIC)?;
        let audience = audience(state);
        let draft = state
            .get(fields::DRAFT_CONTENT)
            .filter(|d| d.is_object())
            .cloned()
            .ok_or_else(|| NodeError::fatal("no draft to test"))?;
        let variant_a = draft_field(&draft, "body").to_string();

        let variant_b = ctx
            .call(
                self.timeout,
                self.generator.generate(
                    &format!("Rewrite this copy as a contrasting variant:\n\n{variant_a}"),
                    &json!({"task": "variant", "topic": topic, "target_audience": audience}),
                ),
            )
            .await?;

        let judged = ctx
            .call(
                self.timeout,
                self.generator.generate(
                    &format!(
                        "You are {audience}. Which copy would you act on? \
                         Answer 'Variant A' or 'Variant B' on the first line, then explain."
                    ),
                    &json!({
                        "task": "audience",
                        "target_audience": audience,
                        "variant_a": variant_a,
                        "variant_b": variant_b,
                    }),
                ),
            )
            .await;

        let (winner, rationale) = match judged {
            Ok(answer) => {
                let mut answer_lines = lines(&answer).into_iter();
                let verdict = answer_lines.next().unwrap_or_default();
                let winner = if verdict.to_lowercase().contains("variant b") {
                    "Variant B"
                } else {
                    "Variant A"
                };
                (winner, answer_lines.collect::<Vec<_>>().join(" "))
            }
            Err(NodeError::Cancelled) => return Err(NodeError::Cancelled),
            Err(e) => {
                warn!(run_id = %ctx.run_id(), error = %e, "Audience simulation failed, keeping Variant A");
                ("Variant A", format!("audience simulation failed ({e}); kept the original"))
            }
        };

        let mut draft = draft;
        if winner == "Variant B" {
            draft["body"] = Value::from(variant_b.clone());
            draft["word_count"] = Value::from(word_count(&variant_b));
        }
        draft["variant"] = Value::from(winner);

        let logs = vec![
            format!("Variant A: {variant_a}"),
            format!("Variant B: {variant_b}"),
            format!("Winner: {winner}"),
            rationale,
        ];
        info!(run_id = %ctx.run_id(), winner, "A/B test decided");

        Ok(NodeOutput::done(
            Delta::new()
                .with(fields::DRAFT_CONTENT, draft)
                .with(fields::AB_TEST_WINNER, winner)
                .with(fields::AB_TEST_LOGS, logs),
        ))
    }
}

// ============================================================================
// Designer
// ============================================================================

pub struct DesignerNode {
    descriptor: NodeDescriptor,
    generator: Arc<dyn ContentGenerator>,
    timeout: Duration,
}

impl DesignerNode {
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::DESIGNER, Capability::Generate)
                .reads([fields::TOPIC, fields::DRAFT_CONTENT])
                .writes([fields::DESIGN]),
            generator,
            timeout,
        }
    }
}

#[async_trait]
impl Node for DesignerNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let topic = require_str(state, fields::TOPIC)?;
        let headline = state
            .get(fields::DRAFT_CONTENT)
            .map(|d| draft_field(d, "headline").to_string())
            .unwrap_or_default();

        let ideas = ctx
            .call(
                self.timeout,
                self.generator.generate(
                    &format!("Suggest visual treatments for '{headline}', one per line."),
                    &json!({"task": "design", "topic": topic}),
                ),
            )
            .await?;

        let design = json!({
            "color_palette": {
                "primary": "#2563EB",
                "secondary": "#10B981",
                "accent": "#F59E0B",
            },
            "image_ideas": [
                format!("Hero image representing {topic}"),
                "Infographic of the key points",
                "Customer photo with a short quote",
            ],
            "layout": {
                "header": "Bold headline over the hero image",
                "content": "Single column with pull quotes",
                "footer": "Call-to-action button",
            },
            "typography": {
                "headings": "Inter Bold",
                "body": "Inter Regular",
            },
            "suggestions": lines(&ideas),
        });
        Ok(NodeOutput::done(Delta::new().with(fields::DESIGN, design)))
    }
}

// ============================================================================
// Review
// ============================================================================

/// Scores the draft; outcome is `accept` or `reject`
pub struct ReviewNode {
    descriptor: NodeDescriptor,
    scorer: Arc<dyn ContentScorer>,
    threshold: u8,
    timeout: Duration,
}

impl ReviewNode {
    pub fn new(scorer: Arc<dyn ContentScorer>, threshold: u8, timeout: Duration) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::REVIEW, Capability::Critique)
                .reads([fields::DRAFT_CONTENT, fields::BRAND_GUIDELINES])
                .writes([
                    fields::REVIEW_VERDICT,
                    fields::REVIEW_SCORE,
                    fields::REVIEW_FEEDBACK,
                    fields::SEO_NOTES,
                ]),
            scorer,
            threshold,
            timeout,
        }
    }
}

#[async_trait]
impl Node for ReviewNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let draft = state
            .get(fields::DRAFT_CONTENT)
            .ok_or_else(|| NodeError::fatal("no draft to review"))?;
        let text = format!(
            "{}\n\n{}\n\n{}",
            draft_field(draft, "headline"),
            draft_field(draft, "body"),
            draft_field(draft, "call_to_action"),
        );
        let guidelines = state.get_str(fields::BRAND_GUIDELINES).unwrap_or_default();

        let verdict = ctx
            .call(self.timeout, self.scorer.score(&text, guidelines))
            .await?;

        let accepted = verdict.approved && verdict.score >= self.threshold;
        let label = if accepted { outcomes::ACCEPT } else { outcomes::REJECT };
        info!(
            run_id = %ctx.run_id(),
            score = verdict.score,
            verdict = label,
            "Draft reviewed"
        );

        let mut feedback = verdict.feedback;
        if !verdict.suggestions.is_empty() {
            feedback = format!("{} Suggestions: {}", feedback, verdict.suggestions.join("; "));
        }

        Ok(NodeOutput::new(
            Delta::new()
                .with(fields::REVIEW_VERDICT, label)
                .with(fields::REVIEW_SCORE, verdict.score)
                .with(fields::REVIEW_FEEDBACK, feedback)
                .with(fields::SEO_NOTES, verdict.seo_notes),
            Outcome::new(label),
        ))
    }
}

// ============================================================================
// Human approval
// ============================================================================

/// Suspends the run until a reviewer supplies `human_decision`
pub struct HumanApprovalNode {
    descriptor: NodeDescriptor,
}

impl HumanApprovalNode {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::HUMAN_APPROVAL, Capability::Route)
                .reads([
                    fields::HUMAN_DECISION,
                    fields::HUMAN_FEEDBACK,
                    fields::CAMPAIGN_ID,
                    fields::DRAFT_CONTENT,
                    fields::REVIEW_SCORE,
                ])
                .writes([
                    fields::HUMAN_DECISION,
                    fields::HUMAN_FEEDBACK,
                    fields::APPROVAL_STATUS,
                    fields::DASHBOARD_URL,
                    fields::REVIEW_FEEDBACK,
                ]),
        }
    }
}

impl Default for HumanApprovalNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for HumanApprovalNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();

        let Some(decision) = state.get_str(fields::HUMAN_DECISION) else {
            let campaign_id = state.get_str(fields::CAMPAIGN_ID).unwrap_or(ctx.run_id());
            let dashboard_url = format!("/api/v1/dashboard/review/{campaign_id}");
            let draft = state.get(fields::DRAFT_CONTENT).cloned().unwrap_or(Value::Null);
            let headline = draft_field(&draft, "headline").to_string();

            info!(run_id = %ctx.run_id(), dashboard = %dashboard_url, "Awaiting human review");

            let request = InputRequest::new(
                format!("Approve or reject the draft '{headline}'"),
                [fields::HUMAN_DECISION],
            )
            .with_context(json!({
                "draft_content": draft,
                "review_score": state.get(fields::REVIEW_SCORE),
                "dashboard_url": dashboard_url,
            }));
            return Ok(NodeOutput::suspend(
                Delta::new()
                    .with(fields::APPROVAL_STATUS, "pending_human_review")
                    .with(fields::DASHBOARD_URL, dashboard_url),
                request,
            ));
        };

        // The decision is consumed so a later pass asks again
        let delta = Delta::new()
            .with(fields::HUMAN_DECISION, Value::Null)
            .with(fields::HUMAN_FEEDBACK, Value::Null);

        match decision.trim().to_lowercase().as_str() {
            "approve" | "approved" => Ok(NodeOutput::new(
                delta.with(fields::APPROVAL_STATUS, "approved"),
                Outcome::new(outcomes::APPROVE),
            )),
            "reject" | "rejected" => {
                let feedback = state
                    .get_str(fields::HUMAN_FEEDBACK)
                    .unwrap_or("Rejected by human reviewer");
                Ok(NodeOutput::new(
                    delta
                        .with(fields::APPROVAL_STATUS, "rejected")
                        .with(fields::REVIEW_FEEDBACK, feedback),
                    Outcome::new(outcomes::REJECT),
                ))
            }
            other => Err(NodeError::fatal(format!(
                "human_decision must be 'approve' or 'reject', got '{other}'"
            ))),
        }
    }
}

// ============================================================================
// Terminals
// ============================================================================

/// Assembles the publishable content
pub struct FinalizeNode {
    descriptor: NodeDescriptor,
}

impl FinalizeNode {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::FINALIZE, Capability::Publish)
                .reads([
                    fields::DRAFT_CONTENT,
                    fields::DESIGN,
                    fields::REVIEW_SCORE,
                    fields::REVIEW_FEEDBACK,
                    fields::REVISION_COUNT,
                    fields::AB_TEST_WINNER,
                ])
                .writes([fields::FINAL_CONTENT])
                .terminal(Terminal::Success),
        }
    }
}

impl Default for FinalizeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for FinalizeNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let draft = state
            .get(fields::DRAFT_CONTENT)
            .ok_or_else(|| NodeError::fatal("nothing to finalize"))?;
        let visual_suggestions = state
            .get(fields::DESIGN)
            .and_then(|d| d.get("suggestions"))
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));

        let final_content = json!({
            "headline": draft_field(draft, "headline"),
            "body": draft_field(draft, "body"),
            "call_to_action": draft_field(draft, "call_to_action"),
            "visual_suggestions": visual_suggestions,
            "review_score": state.get(fields::REVIEW_SCORE),
            "review_feedback": state.get(fields::REVIEW_FEEDBACK),
            "revision_count": state.get_u64(fields::REVISION_COUNT).unwrap_or(0),
            "ab_test_winner": state.get(fields::AB_TEST_WINNER),
            "approved": true,
        });
        info!(run_id = %ctx.run_id(), "Campaign content finalized");
        Ok(NodeOutput::done(
            Delta::new().with(fields::FINAL_CONTENT, final_content),
        ))
    }
}

/// Records why the campaign needs a human to take over
pub struct EscalateNode {
    descriptor: NodeDescriptor,
    max_revisions: u64,
}

impl EscalateNode {
    pub fn new(max_revisions: u64) -> Self {
        Self {
            descriptor: NodeDescriptor::new(names::ESCALATE, Capability::Route)
                .reads([fields::REVISION_COUNT, fields::REVIEW_FEEDBACK])
                .writes([fields::ESCALATION_REASON])
                .terminal(Terminal::Escalation),
            max_revisions,
        }
    }
}

#[async_trait]
impl Node for EscalateNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    async fn execute(&self, ctx: &NodeContext) -> Result<NodeOutput, NodeError> {
        let state = ctx.state();
        let drafts = state.get_u64(fields::REVISION_COUNT).unwrap_or(0);
        let feedback = state
            .get_str(fields::REVIEW_FEEDBACK)
            .unwrap_or("no feedback recorded");
        let reason = format!(
            "{drafts} drafts rejected (revision limit {}); last feedback: {feedback}",
            self.max_revisions
        );
        warn!(run_id = %ctx.run_id(), drafts, "Campaign escalated");
        Ok(NodeOutput::done(
            Delta::new().with(fields::ESCALATION_REASON, reason),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ScriptedScorer, StaticGuidelines, TemplateGenerator, Verdict};
    use crate::engine::NodeName;
    use tokio_util::sync::CancellationToken;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn ctx(node: &str, state: StateContainer) -> NodeContext {
        NodeContext::new(
            "run-1",
            NodeName::new(node),
            1,
            1,
            Arc::new(state),
            CancellationToken::new(),
        )
    }

    fn state(pairs: Value) -> StateContainer {
        let map = pairs.as_object().cloned().unwrap_or_default();
        StateContainer::new(map.into_iter().collect())
    }

    #[tokio::test]
    async fn test_intake_fills_defaults() {
        let node = IntakeNode::new(vec!["blog".into()]);
        let out = node
            .execute(&ctx("intake", state(json!({"topic": "AI Marketing"}))))
            .await
            .unwrap();

        assert_eq!(out.delta.get("tone"), Some(&json!("professional")));
        assert_eq!(out.delta.get("content_type"), Some(&json!("blog_post")));
        assert_eq!(out.delta.get("target_audience"), Some(&json!("general audience")));
        assert_eq!(out.delta.get("channels"), Some(&json!(["blog"])));
        assert_eq!(out.delta.get("name"), Some(&json!("AI Marketing")));
    }

    #[tokio::test]
    async fn test_intake_rejects_bad_briefs() {
        let node = IntakeNode::new(Vec::new());
        let err = node.execute(&ctx("intake", state(json!({})))).await.unwrap_err();
        assert_eq!(err, NodeError::fatal("brief has no topic"));

        let err = node
            .execute(&ctx("intake", state(json!({"topic": "X", "content_type": "podcast"}))))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_research_structure() {
        let node = ResearchNode::new(Arc::new(TemplateGenerator::new()), TIMEOUT);
        let out = node
            .execute(&ctx(
                "research",
                state(json!({"topic": "Rust", "target_audience": "Developers"})),
            ))
            .await
            .unwrap();

        let research = out.delta.get("research").unwrap();
        assert_eq!(research["key_points"][0], "Introduction to Rust");
        assert_eq!(research["keywords"], json!(["rust", "developers"]));
        assert_eq!(research["summary"], "Research summary for Rust");
    }

    #[tokio::test]
    async fn test_brand_guidelines() {
        let node = BrandGuidelinesNode::new(Arc::new(StaticGuidelines::new("Be brief.")), TIMEOUT);
        let out = node
            .execute(&ctx("brand_guidelines", state(json!({"topic": "Rust"}))))
            .await
            .unwrap();
        assert_eq!(out.delta.get("brand_guidelines"), Some(&json!("Be brief.\nFocus: Rust")));
    }

    #[tokio::test]
    async fn test_copywriting_counts_revisions() {
        let node = CopywritingNode::new(Arc::new(TemplateGenerator::new()), TIMEOUT);

        let first = node
            .execute(&ctx("copywriting", state(json!({"topic": "Rust"}))))
            .await
            .unwrap();
        assert_eq!(first.delta.get("revision_count"), Some(&json!(1)));
        let draft = first.delta.get("draft_content").unwrap();
        assert_eq!(draft["headline"], "The Complete Guide to Rust");
        assert_eq!(draft["call_to_action"], "Get Started Today!");
        assert!(!draft["body"].as_str().unwrap().contains("Revised"));

        let second = node
            .execute(&ctx(
                "copywriting",
                state(json!({"topic": "Rust", "revision_count": 1, "review_feedback": "shorter"})),
            ))
            .await
            .unwrap();
        assert_eq!(second.delta.get("revision_count"), Some(&json!(2)));
        let body = second.delta.get("draft_content").unwrap()["body"].as_str().unwrap().to_string();
        assert!(body.ends_with("Revised to address: shorter"));
    }

    #[tokio::test]
    async fn test_copywriting_transient_failure_surfaces() {
        let node = CopywritingNode::new(Arc::new(TemplateGenerator::new().failing_first(1)), TIMEOUT);
        let err = node
            .execute(&ctx("copywriting", state(json!({"topic": "Rust"}))))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_ab_simulator_falls_back_to_variant_a() {
        let node = AbSimulatorNode::new(
            Arc::new(TemplateGenerator::new().failing_task("audience")),
            TIMEOUT,
        );
        let input = state(json!({
            "topic": "Rust",
            "draft_content": {"headline": "H", "body": "original body", "word_count": 2},
        }));

        let out = node.execute(&ctx("ab_simulator", input)).await.unwrap();

        assert_eq!(out.delta.get("ab_test_winner"), Some(&json!("Variant A")));
        let draft = out.delta.get("draft_content").unwrap();
        assert_eq!(draft["body"], "original body");
        assert_eq!(draft["variant"], "Variant A");
        let logs = out.delta.get("ab_test_logs").unwrap().as_array().unwrap();
        assert!(logs[3].as_str().unwrap().contains("audience simulation failed"));
    }

    #[tokio::test]
    async fn test_ab_simulator_picks_shorter_variant() {
        let node = AbSimulatorNode::new(Arc::new(TemplateGenerator::new()), TIMEOUT);
        let long_body = "word ".repeat(40);
        let input = state(json!({
            "topic": "Rust",
            "target_audience": "Developers",
            "draft_content": {"headline": "H", "body": long_body},
        }));

        let out = node.execute(&ctx("ab_simulator", input)).await.unwrap();

        assert_eq!(out.delta.get("ab_test_winner"), Some(&json!("Variant B")));
        let draft = out.delta.get("draft_content").unwrap();
        assert!(draft["body"].as_str().unwrap().starts_with("Rust, made simple"));
    }

    #[tokio::test]
    async fn test_designer() {
        let node = DesignerNode::new(Arc::new(TemplateGenerator::new()), TIMEOUT);
        let out = node
            .execute(&ctx("designer", state(json!({"topic": "Rust"}))))
            .await
            .unwrap();
        let design = out.delta.get("design").unwrap();
        assert_eq!(design["color_palette"]["primary"], "#2563EB");
        assert_eq!(design["suggestions"][0], "Use a hero image at the top");
    }

    #[tokio::test]
    async fn test_review_threshold() {
        let scorer = ScriptedScorer::from_script(vec![Verdict::accept(6, "fine")]);
        let node = ReviewNode::new(Arc::new(scorer), 7, TIMEOUT);
        let input = state(json!({"draft_content": {"headline": "H", "body": "B"}}));

        let out = node.execute(&ctx("review", input)).await.unwrap();

        // approved but under the bar
        assert_eq!(out.outcome.as_str(), "reject");
        assert_eq!(out.delta.get("review_verdict"), Some(&json!("reject")));
        assert_eq!(out.delta.get("review_score"), Some(&json!(6)));
    }

    #[tokio::test]
    async fn test_review_accepts() {
        let node = ReviewNode::new(Arc::new(ScriptedScorer::always_accept()), 7, TIMEOUT);
        let input = state(json!({"draft_content": {"headline": "H", "body": "B"}}));

        let out = node.execute(&ctx("review", input)).await.unwrap();

        assert_eq!(out.outcome.as_str(), "accept");
        assert!(out.delta.get("review_feedback").unwrap().as_str().unwrap().contains("Suggestions"));
        assert_eq!(out.delta.get("seo_notes").unwrap().as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_human_approval_suspends_then_routes() {
        let node = HumanApprovalNode::new();

        let waiting = node
            .execute(&ctx(
                "human_approval",
                state(json!({"campaign_id": "c-42", "draft_content": {"headline": "H"}})),
            ))
            .await
            .unwrap();
        assert!(waiting.is_suspend());
        assert_eq!(
            waiting.delta.get("dashboard_url"),
            Some(&json!("/api/v1/dashboard/review/c-42"))
        );
        assert_eq!(
            waiting.suspend.as_ref().unwrap().required_fields,
            vec!["human_decision"]
        );

        let approved = node
            .execute(&ctx("human_approval", state(json!({"human_decision": "approve"}))))
            .await
            .unwrap();
        assert_eq!(approved.outcome.as_str(), "approve");
        assert_eq!(approved.delta.get("human_decision"), Some(&Value::Null));

        let rejected = node
            .execute(&ctx(
                "human_approval",
                state(json!({"human_decision": "reject", "human_feedback": "off brand"})),
            ))
            .await
            .unwrap();
        assert_eq!(rejected.outcome.as_str(), "reject");
        assert_eq!(rejected.delta.get("review_feedback"), Some(&json!("off brand")));

        let invalid = node
            .execute(&ctx("human_approval", state(json!({"human_decision": "maybe"}))))
            .await;
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn test_finalize_and_escalate() {
        let finalize = FinalizeNode::new();
        let out = finalize
            .execute(&ctx(
                "finalize",
                state(json!({
                    "draft_content": {"headline": "H", "body": "B", "call_to_action": "Go"},
                    "design": {"suggestions": ["hero"]},
                    "review_score": 8,
                    "revision_count": 2,
                })),
            ))
            .await
            .unwrap();
        let content = out.delta.get("final_content").unwrap();
        assert_eq!(content["headline"], "H");
        assert_eq!(content["visual_suggestions"], json!(["hero"]));
        assert_eq!(content["approved"], true);
        assert_eq!(content["revision_count"], 2);

        let escalate = EscalateNode::new(2);
        let out = escalate
            .execute(&ctx("escalate", state(json!({"revision_count": 3}))))
            .await
            .unwrap();
        let reason = out.delta.get("escalation_reason").unwrap().as_str().unwrap();
        assert!(reason.starts_with("3 drafts rejected (revision limit 2)"));
    }
}
