//! # AI Agency
//!
//! Command-line driver for content campaigns on the `agency-graph` engine.
//!
//! ## Quick Start
//! ```bash
//! cargo run -- run "AI Marketing" --audience "Small business owners"
//! cargo run -- run "AI Marketing" --human-approval --checkpoint-dir ./checkpoints
//! cargo run -- resume <RUN_ID> --decision approve --human-approval --checkpoint-dir ./checkpoints
//! cargo run -- graph --ab-testing
//! ```

/// Configuration management
mod config;

use std::path::Path;

use agency_graph::campaign::{build_campaign_graph, campaign_engine, fields};
use agency_graph::engine::{to_mermaid, CheckpointerConfig, Delta, ExecutorConfig, RunStatus};
use agency_graph::{CampaignBrief, CampaignEngine, Collaborators, ContentType, PipelineConfig, RunView};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "ai-agency",
    version,
    about = "Runs multi-agent content campaigns: research, copy, review and publish",
    long_about = r#"
AI Agency - content campaigns as a cyclic agent graph.

A brief goes through intake, research and brand guidelines (in parallel),
copywriting, optional A/B testing and design, then review. Rejected drafts
loop back to copywriting until accepted or the revision limit escalates.

EXAMPLES:
  # Blog post with default settings
  ai-agency run "AI Marketing" --audience "Small business owners"

  # Pause for a human decision, then approve it later
  ai-agency run "AI Marketing" --human-approval --checkpoint-dir ./checkpoints
  ai-agency resume <RUN_ID> --decision approve --human-approval --checkpoint-dir ./checkpoints

  # Print the pipeline as a Mermaid flowchart
  ai-agency graph --ab-testing
"#
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Print run summaries as JSON
    #[arg(long = "json", global = true)]
    json: bool,

    /// Directory for durable checkpoints (overrides AGENCY_CHECKPOINT_DIR)
    #[arg(long = "checkpoint-dir", global = true, value_name = "DIR")]
    checkpoint_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a campaign from a brief
    Run {
        #[command(flatten)]
        brief: BriefArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Resume a run waiting for human approval. Pass the pipeline flags of the original run.
    Resume {
        /// Run id printed by `run`
        run_id: String,

        #[arg(long = "decision", value_parser = ["approve", "reject"])]
        decision: String,

        /// Notes for the copywriter when rejecting
        #[arg(long = "feedback")]
        feedback: Option<String>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Print the pipeline as a Mermaid flowchart
    Graph {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug)]
struct BriefArgs {
    /// What the campaign is about
    #[arg(value_name = "TOPIC")]
    topic: String,

    #[arg(long = "name")]
    name: Option<String>,

    #[arg(long = "audience", default_value = "")]
    audience: String,

    #[arg(long = "tone", default_value = "professional")]
    tone: String,

    /// blog_post, social_media, email or ad
    #[arg(long = "content-type", default_value = "blog_post")]
    content_type: ContentType,

    /// Publishing channel; repeat for several
    #[arg(long = "channel")]
    channels: Vec<String>,

    #[arg(long = "campaign-id")]
    campaign_id: Option<String>,
}

impl BriefArgs {
    fn to_brief(&self) -> CampaignBrief {
        let mut brief = CampaignBrief::new(self.topic.clone())
            .with_audience(self.audience.clone())
            .with_tone(self.tone.clone())
            .with_content_type(self.content_type)
            .with_channels(self.channels.iter().cloned());
        if let Some(name) = &self.name {
            brief = brief.with_name(name.clone());
        }
        if let Some(id) = &self.campaign_id {
            brief = brief.with_campaign_id(id.clone());
        }
        brief
    }
}

#[derive(Args, Debug, Clone, Default)]
struct PipelineArgs {
    /// Pit the draft against a generated variant
    #[arg(long = "ab-testing")]
    ab_testing: bool,

    /// Wait for a human decision after an accepted review
    #[arg(long = "human-approval")]
    human_approval: bool,

    /// Skip the design stage
    #[arg(long = "no-design")]
    no_design: bool,

    /// Revise cycles allowed before escalation (overrides AGENCY_MAX_REVISIONS)
    #[arg(long = "max-revisions")]
    max_revisions: Option<u64>,

    /// Minimum review score for acceptance, 0-10
    #[arg(long = "threshold")]
    threshold: Option<u8>,
}

impl PipelineArgs {
    fn to_config(&self, app: &AppConfig) -> PipelineConfig {
        let mut pipeline = PipelineConfig::default()
            .with_ab_testing(self.ab_testing)
            .with_human_approval(self.human_approval)
            .with_design_stage(!self.no_design)
            .with_max_revisions(self.max_revisions.unwrap_or(app.max_revisions));
        if let Some(threshold) = self.threshold {
            pipeline = pipeline.with_approval_threshold(threshold);
        }
        pipeline
    }
}

// =============================================================================
// RUN SUMMARY
// =============================================================================
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    status: RunStatus,
    steps: usize,
    state_version: u64,
    revision_count: Option<u64>,
    review_score: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_content: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    receipts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    publish_error: Option<&'a str>,
}

impl<'a> RunSummary<'a> {
    fn from_view(view: &'a RunView) -> Self {
        Self {
            run_id: &view.run_id,
            status: view.status,
            steps: view.steps,
            state_version: view.state_version,
            revision_count: view.state.get_u64(fields::REVISION_COUNT),
            review_score: view.state.get_u64(fields::REVIEW_SCORE),
            final_content: view.state.get(fields::FINAL_CONTENT),
            escalation_reason: view.state.get_str(fields::ESCALATION_REASON),
            required_fields: view.required_fields().to_vec(),
            receipts: view
                .receipts
                .iter()
                .map(|r| format!("{}: {}", r.channel, r.reference))
                .collect(),
            failure: view.failure.as_ref().map(|f| f.message.clone()),
            publish_error: view.publish_error.as_deref(),
        }
    }
}

fn print_summary(view: &RunView, json: bool) -> Result<()> {
    let summary = RunSummary::from_view(view);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n{}", "=".repeat(60));
    println!("RUN {} - {}", summary.run_id, summary.status);
    println!("{}\n", "=".repeat(60));
    println!("steps: {}  state version: {}", summary.steps, summary.state_version);
    if let Some(revisions) = summary.revision_count {
        println!("drafts: {revisions}");
    }
    if let Some(score) = summary.review_score {
        println!("review score: {score}/10");
    }
    if let Some(content) = summary.final_content {
        println!("\n{}\n", serde_json::to_string_pretty(content)?);
    }
    if let Some(reason) = summary.escalation_reason {
        println!("escalated: {reason}");
    }
    if !summary.required_fields.is_empty() {
        println!(
            "waiting for: {} (resume with `ai-agency resume {} --decision approve|reject`)",
            summary.required_fields.join(", "),
            summary.run_id
        );
    }
    for receipt in &summary.receipts {
        println!("published {receipt}");
    }
    if let Some(err) = summary.publish_error {
        println!("publish failed: {err}");
    }
    if let Some(failure) = &summary.failure {
        println!("failure: {failure}");
    }
    println!("\n{}", "=".repeat(60));
    Ok(())
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(dir) = cli.checkpoint_dir.clone() {
        config.checkpoint_dir = Some(dir);
    }
    config.validate()?;

    init_logging(cli.verbose, &config.log_level)?;
    info!(
        max_steps = config.max_steps,
        checkpoint_dir = ?config.checkpoint_dir,
        "Configuration loaded"
    );

    match cli.command {
        Command::Graph { pipeline } => {
            let graph = build_campaign_graph(&pipeline.to_config(&config), &Collaborators::stub())
                .context("Failed to build campaign graph")?;
            println!("{}", to_mermaid(&graph));
            Ok(())
        }
        Command::Run { brief, pipeline } => {
            let engine = build_engine(&pipeline.to_config(&config), &config)?;
            let view = run_campaign(&engine, brief.to_brief()).await?;
            report(&view, cli.json)
        }
        Command::Resume {
            run_id,
            decision,
            feedback,
            pipeline,
        } => {
            let engine = build_engine(&pipeline.to_config(&config), &config)?;
            let view = resume_campaign(&engine, &run_id, &decision, feedback).await?;
            report(&view, cli.json)
        }
    }
}

fn report(view: &RunView, json: bool) -> Result<()> {
    print_summary(view, json)?;
    if view.status == RunStatus::Failed {
        let message = view
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_default();
        error!(run_id = %view.run_id, "Campaign failed");
        anyhow::bail!("run {} failed: {}", view.run_id, message);
    }
    Ok(())
}

// =============================================================================
// CAMPAIGN DRIVING
// =============================================================================
fn build_engine(pipeline: &PipelineConfig, config: &AppConfig) -> Result<CampaignEngine> {
    let executor_config = ExecutorConfig::default().with_max_steps(config.max_steps);
    let engine = campaign_engine(pipeline, &Collaborators::stub(), executor_config)
        .context("Invalid pipeline configuration")?;
    Ok(engine.with_checkpoints(checkpoints(config.checkpoint_dir.as_deref(), config.compress_checkpoints)))
}

fn checkpoints(dir: Option<&Path>, compression: bool) -> CheckpointerConfig {
    match dir {
        Some(path) => CheckpointerConfig::File {
            path: path.to_path_buf(),
            compression,
        },
        None => CheckpointerConfig::Memory,
    }
}

async fn run_campaign(engine: &CampaignEngine, brief: CampaignBrief) -> Result<RunView> {
    brief.validate()?;
    let run_id = engine.submit(brief.to_seed()).await?;
    info!(run_id = %run_id, topic = %brief.topic, "Campaign submitted");
    wait_or_cancel(engine, &run_id).await
}

async fn resume_campaign(
    engine: &CampaignEngine,
    run_id: &str,
    decision: &str,
    feedback: Option<String>,
) -> Result<RunView> {
    let view = engine
        .recover(run_id)
        .await
        .with_context(|| format!("No checkpoints found for run {run_id}"))?;
    if view.status != RunStatus::Suspended {
        anyhow::bail!("run {run_id} is {}, nothing to resume", view.status);
    }

    let mut input = Delta::new().with(fields::HUMAN_DECISION, decision);
    if let Some(feedback) = feedback {
        input.set(fields::HUMAN_FEEDBACK, feedback);
    }
    engine.resume(run_id, input).await?;
    info!(run_id, decision, "Campaign resumed");
    wait_or_cancel(engine, run_id).await
}

/// Wait for the run to settle; Ctrl-C cancels it.
async fn wait_or_cancel(engine: &CampaignEngine, run_id: &str) -> Result<RunView> {
    tokio::select! {
        view = engine.wait(run_id) => Ok(view?),
        _ = tokio::signal::ctrl_c() => {
            warn!(run_id, "Interrupted, cancelling run");
            engine.cancel(run_id).await?;
            Ok(engine.wait(run_id).await?)
        }
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
fn init_logging(verbose: bool, directive: &str) -> Result<()> {
    let directive = if verbose { "debug" } else { directive };
    let filter = EnvFilter::try_new(directive)
        .with_context(|| format!("Invalid log filter '{directive}'"))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
