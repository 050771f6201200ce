//! External collaborator abstractions
//!
//! Nodes never talk to a model or a channel directly. They go through these
//! traits so the graph can run against real services or deterministic stubs.
//!
//! ```text
//! ┌───────────────┐   generate    ┌──────────────────────┐
//! │ research      │──────────────▶│ ContentGenerator     │
//! │ copywriting   │               └──────────────────────┘
//! │ ab_simulator  │   score       ┌──────────────────────┐
//! │ designer      │──────────────▶│ ContentScorer        │
//! │ review        │               └──────────────────────┘
//! │ brand_guide.. │   lookup      ┌──────────────────────┐
//! └───────────────┘──────────────▶│ GuidelineSource      │
//!   publish hook      publish     ┌──────────────────────┐
//!   ─────────────────────────────▶│ Publisher            │
//!                                 └──────────────────────┘
//! ```
//!
//! Every call is made through [`NodeContext::call`](crate::engine::NodeContext::call),
//! which bounds it with a timeout and observes run cancellation.

mod stub;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::engine::NodeError;

pub use stub::{RecordingPublisher, ScriptedScorer, StaticGuidelines, TemplateGenerator};

/// Errors returned by collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("rate limited by {0}")]
    RateLimited(String),

    #[error("{0} unavailable")]
    Unavailable(String),

    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),

    /// The request itself is unacceptable; retrying will not help
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::RateLimited(_)
                | CollaboratorError::Unavailable(_)
                | CollaboratorError::Timeout(_)
        )
    }
}

impl From<CollaboratorError> for NodeError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Timeout(d) => NodeError::Timeout(d),
            e if e.is_transient() => NodeError::transient(e.to_string()),
            e => NodeError::fatal(e.to_string()),
        }
    }
}

/// Reviewer judgement for one draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    /// 0 to 10
    pub score: u8,
    pub feedback: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub seo_notes: Vec<String>,
}

impl Verdict {
    pub fn accept(score: u8, feedback: impl Into<String>) -> Self {
        Self {
            approved: true,
            score,
            feedback: feedback.into(),
            suggestions: Vec::new(),
            seo_notes: Vec::new(),
        }
    }

    pub fn reject(score: u8, feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            ..Self::accept(score, feedback)
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_seo_notes<I, S>(mut self, notes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seo_notes = notes.into_iter().map(Into::into).collect();
        self
    }
}

/// Proof that content reached a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub channel: String,
    /// Identifier assigned by the channel
    pub reference: String,
    pub published_at: DateTime<Utc>,
}

/// Text generation (research notes, drafts, variants, design ideas)
///
/// `context` is a JSON object; `context["task"]` names the kind of text
/// requested so one generator can serve every node.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, context: &Value) -> Result<String, CollaboratorError>;

    /// Generator name for logging
    fn name(&self) -> &str;
}

/// Draft scoring against brand guidelines
#[async_trait]
pub trait ContentScorer: Send + Sync {
    async fn score(&self, text: &str, guidelines: &str) -> Result<Verdict, CollaboratorError>;

    fn name(&self) -> &str;
}

/// Brand guideline lookup
#[async_trait]
pub trait GuidelineSource: Send + Sync {
    async fn lookup(&self, topic: &str) -> Result<String, CollaboratorError>;
}

/// Delivery of approved content to a channel
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, content: &Value) -> Result<Receipt, CollaboratorError>;
}

/// The collaborators a campaign graph is wired with
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ContentGenerator>,
    pub scorer: Arc<dyn ContentScorer>,
    pub guidelines: Arc<dyn GuidelineSource>,
    pub publisher: Arc<dyn Publisher>,
}

impl Collaborators {
    /// Deterministic offline collaborators; every draft is accepted
    pub fn stub() -> Self {
        Self {
            generator: Arc::new(TemplateGenerator::new()),
            scorer: Arc::new(ScriptedScorer::always_accept()),
            guidelines: Arc::new(StaticGuidelines::default()),
            publisher: Arc::new(RecordingPublisher::new()),
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ContentScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_guidelines(mut self, guidelines: Arc<dyn GuidelineSource>) -> Self {
        self.guidelines = guidelines;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("generator", &self.generator.name())
            .field("scorer", &self.scorer.name())
            .finish_non_exhaustive()
    }
}
