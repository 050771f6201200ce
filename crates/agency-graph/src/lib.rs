//! agency-graph: stateful cyclic graph engine for content campaigns
//!
//! Specialized agents (research, copywriting, review, ...) are nodes in a
//! graph that loops until a draft is accepted or a revision budget runs out.
//!
//! - [`engine`]: state container, nodes, edge resolver, executor, checkpoints
//! - [`collaborators`]: generator/scorer/publisher capabilities and offline stubs
//! - [`campaign`]: the campaign pipeline built on the engine
//! - [`service`]: run registry with submit, status, pause, cancel and resume
//!
//! # Example
//!
//! ```rust,ignore
//! use agency_graph::{campaign_engine, CampaignBrief, Collaborators, ExecutorConfig, PipelineConfig};
//!
//! let engine = campaign_engine(&PipelineConfig::default(), &Collaborators::stub(), ExecutorConfig::default())?;
//! let run_id = engine.submit(CampaignBrief::new("AI Marketing").to_seed()).await?;
//! let view = engine.wait(&run_id).await?;
//! println!("{} after {} steps", view.status, view.steps);
//! ```

pub mod campaign;
pub mod collaborators;
pub mod engine;
pub mod service;

pub use campaign::{build_campaign_graph, campaign_engine, CampaignBrief, ContentType, PipelineConfig};
pub use collaborators::{
    CollaboratorError, Collaborators, ContentGenerator, ContentScorer, GuidelineSource, Publisher,
    Receipt, Verdict,
};
pub use engine::{
    Checkpointer, CheckpointerConfig, Delta, ExecutorConfig, Graph, GraphBuilder, GraphError,
    RetryPolicy, RunStatus, StateContainer,
};
pub use service::{CampaignEngine, PublishHook, RunView};
