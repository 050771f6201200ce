//! Deterministic offline collaborators
//!
//! Same inputs always give the same outputs, so whole runs can be replayed
//! and compared in tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{
    CollaboratorError, ContentGenerator, ContentScorer, GuidelineSource, Publisher, Receipt,
    Verdict,
};

fn text<'a>(context: &'a Value, key: &str) -> &'a str {
    context.get(key).and_then(Value::as_str).unwrap_or_default()
}

// ============================================================================
// Generator
// ============================================================================

/// Template-based generator keyed on `context["task"]`
#[derive(Debug, Default)]
pub struct TemplateGenerator {
    fail_first: usize,
    failing_task: Option<String>,
    calls: AtomicUsize,
}

impl TemplateGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the service unavailable for the first `n` calls
    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Always fail requests for `task`
    pub fn failing_task(mut self, task: impl Into<String>) -> Self {
        self.failing_task = Some(task.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn render(&self, task: &str, context: &Value) -> Result<String, CollaboratorError> {
        let topic = text(context, "topic");
        let audience = text(context, "target_audience");
        let tone = text(context, "tone");

        let output = match task {
            "research" => format!(
                "Introduction to {topic}\nKey benefits of {topic}\nBest practices for {topic}"
            ),
            "copy" => {
                let body = match text(context, "content_type") {
                    "social_media" => format!("🎯 {topic}\n\nLearn more! #learn"),
                    "email" => format!(
                        "Subject: Discover {topic}\n\nHi there,\n\nLet us share what {topic} can do for {audience}."
                    ),
                    "ad" => format!("Get {topic} Now! Limited time offer."),
                    _ => format!(
                        "This is a comprehensive blog post about {topic}. It's designed for {audience} and written in a {tone} tone."
                    ),
                };
                match context.get("feedback").and_then(Value::as_str) {
                    Some(feedback) if !feedback.is_empty() => {
                        format!("{body}\n\nRevised to address: {feedback}")
                    }
                    _ => body,
                }
            }
            "variant" => format!(
                "{topic}, made simple for {audience}. See the difference in your first week."
            ),
            "audience" => {
                let a = text(context, "variant_a").split_whitespace().count();
                let b = text(context, "variant_b").split_whitespace().count();
                if b < a {
                    format!("Variant B\nShorter copy kept {audience} reading to the call to action.")
                } else {
                    format!("Variant A\nMore detail held the attention of {audience}.")
                }
            }
            "design" => "Use a hero image at the top\nBreak up text with bullet points\nAdd relevant images throughout".to_string(),
            other => {
                return Err(CollaboratorError::Rejected(format!("unknown task '{other}'")));
            }
        };
        Ok(output)
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(&self, _prompt: &str, context: &Value) -> Result<String, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(CollaboratorError::Unavailable("template generator".into()));
        }
        let task = text(context, "task");
        if self.failing_task.as_deref() == Some(task) {
            return Err(CollaboratorError::Unavailable(format!("{task} generator")));
        }
        self.render(task, context)
    }

    fn name(&self) -> &str {
        "template"
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Replays a fixed list of verdicts; the last one repeats forever
#[derive(Debug)]
pub struct ScriptedScorer {
    script: Vec<Verdict>,
    calls: AtomicUsize,
}

impl ScriptedScorer {
    pub fn from_script(script: Vec<Verdict>) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_accept() -> Self {
        Self::rejecting_first(0)
    }

    pub fn always_reject() -> Self {
        Self::from_script(vec![Self::rejection()])
    }

    /// Reject `n` drafts, then accept everything
    pub fn rejecting_first(n: usize) -> Self {
        let mut script = vec![Self::rejection(); n];
        script.push(Self::approval());
        Self::from_script(script)
    }

    /// How many drafts have been scored
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn approval() -> Verdict {
        Verdict::accept(
            8,
            "Content is well-written and engaging. Consider adding more specific examples.",
        )
        .with_suggestions(["Add a case study", "Include statistics", "Strengthen the call-to-action"])
        .with_seo_notes(["Primary keyword appears in the headline"])
    }

    fn rejection() -> Verdict {
        Verdict::reject(5, "Needs a stronger hook and a clearer call to action.")
            .with_suggestions(["Open with a concrete benefit"])
            .with_seo_notes(["Primary keyword missing from the first paragraph"])
    }
}

#[async_trait]
impl ContentScorer for ScriptedScorer {
    async fn score(&self, _text: &str, _guidelines: &str) -> Result<Verdict, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .get(call)
            .or_else(|| self.script.last())
            .cloned()
            .ok_or_else(|| CollaboratorError::Malformed("empty scorer script".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Guidelines
// ============================================================================

/// Fixed house style, with the topic appended
#[derive(Debug, Clone)]
pub struct StaticGuidelines {
    style: String,
}

impl StaticGuidelines {
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
        }
    }
}

impl Default for StaticGuidelines {
    fn default() -> Self {
        Self::new("Voice: clear, confident and helpful. Avoid jargon. End with one call to action.")
    }
}

#[async_trait]
impl GuidelineSource for StaticGuidelines {
    async fn lookup(&self, topic: &str) -> Result<String, CollaboratorError> {
        Ok(format!("{}\nFocus: {}", self.style, topic))
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// Keeps everything it publishes in memory
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Value)>>,
    unavailable: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose channels are always down
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub async fn published(&self) -> Vec<(String, Value)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, channel: &str, content: &Value) -> Result<Receipt, CollaboratorError> {
        if self.unavailable {
            return Err(CollaboratorError::Unavailable(format!("channel {channel}")));
        }
        let mut published = self.published.lock().await;
        published.push((channel.to_string(), content.clone()));
        Ok(Receipt {
            channel: channel.to_string(),
            reference: format!("{}-{:04}", channel, published.len()),
            published_at: Utc::now(),
        })
    }
}
