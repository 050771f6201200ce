//! Campaign graph assembly

use std::sync::Arc;

use tracing::{debug, info};

use super::config::PipelineConfig;
use super::fields;
use super::names;
use super::nodes::{
    outcomes, AbSimulatorNode, BrandGuidelinesNode, CopywritingNode, DesignerNode, EscalateNode,
    FinalizeNode, HumanApprovalNode, IntakeNode, ResearchNode, ReviewNode,
};
use super::publish::CampaignPublishHook;
use crate::collaborators::Collaborators;
use crate::engine::{BuildError, ExecutorConfig, Graph, GraphBuilder, GraphError, Predicate};
use crate::service::CampaignEngine;

/// Build the campaign graph for `config`.
///
/// Optional stages are only registered when enabled, so the graph never
/// contains unreachable nodes.
pub fn build_campaign_graph(
    config: &PipelineConfig,
    collaborators: &Collaborators,
) -> Result<Graph, BuildError> {
    let timeout = config.collaborator_timeout;
    let generator = &collaborators.generator;

    let mut builder = GraphBuilder::new()
        .name("campaign")
        .node(IntakeNode::new(config.channels.clone()))
        .node(ResearchNode::new(Arc::clone(generator), timeout))
        .node(BrandGuidelinesNode::new(Arc::clone(&collaborators.guidelines), timeout))
        .node(CopywritingNode::new(Arc::clone(generator), timeout));
    if config.ab_testing {
        builder = builder.node(AbSimulatorNode::new(Arc::clone(generator), timeout));
    }
    if config.design_stage {
        builder = builder.node(DesignerNode::new(Arc::clone(generator), timeout));
    }
    builder = builder.node(ReviewNode::new(
        Arc::clone(&collaborators.scorer),
        config.approval_threshold,
        timeout,
    ));
    if config.human_approval {
        builder = builder.node(HumanApprovalNode::new());
    }
    builder = builder
        .node(FinalizeNode::new())
        .node(EscalateNode::new(config.max_revisions));

    // intake fans out; the two branches join at copywriting
    builder = builder
        .entry(names::INTAKE)
        .fan_out(names::INTAKE, [names::RESEARCH, names::BRAND_GUIDELINES])
        .edge(names::RESEARCH, names::COPYWRITING)
        .edge(names::BRAND_GUIDELINES, names::COPYWRITING);

    let mut previous = names::COPYWRITING;
    for (enabled, stage) in [
        (config.ab_testing, names::AB_SIMULATOR),
        (config.design_stage, names::DESIGNER),
    ] {
        if enabled {
            builder = builder.edge(previous, stage);
            previous = stage;
        }
    }
    builder = builder.edge(previous, names::REVIEW);

    let after_review = if config.human_approval {
        names::HUMAN_APPROVAL
    } else {
        names::FINALIZE
    };
    builder = builder
        .conditional_edges(names::REVIEW, vec![(outcomes::ACCEPT, after_review)])
        .bounded_loop(
            names::REVIEW,
            Predicate::outcome(outcomes::REJECT),
            names::COPYWRITING,
            fields::REVISION_COUNT,
            config.max_revisions,
            names::ESCALATE,
        );

    if config.human_approval {
        builder = builder
            .conditional_edges(names::HUMAN_APPROVAL, vec![(outcomes::APPROVE, names::FINALIZE)])
            .bounded_loop(
                names::HUMAN_APPROVAL,
                Predicate::outcome(outcomes::REJECT),
                names::COPYWRITING,
                fields::REVISION_COUNT,
                config.max_revisions,
                names::ESCALATE,
            );
    }

    let graph = builder.build()?;
    debug!(nodes = graph.registry().len(), "Campaign graph built");
    Ok(graph)
}

/// A run service wired with the campaign graph and its publish hook.
///
/// The step limit is raised when it is too low for the revise loop to reach
/// its escalation terminal.
pub fn campaign_engine(
    pipeline: &PipelineConfig,
    collaborators: &Collaborators,
    mut executor: ExecutorConfig,
) -> Result<CampaignEngine, GraphError> {
    pipeline.validate()?;
    let required = pipeline.required_steps();
    if executor.max_steps < required {
        info!(
            configured = executor.max_steps,
            required,
            max_revisions = pipeline.max_revisions,
            "Raising step limit to fit the revision loop"
        );
        executor.max_steps = required;
    }
    let graph = build_campaign_graph(pipeline, collaborators)
        .map_err(|e| GraphError::config_error(format!("invalid campaign graph: {e}")))?;
    let hook = CampaignPublishHook::new(
        Arc::clone(&collaborators.publisher),
        pipeline.channels.clone(),
        pipeline.collaborator_timeout,
    );
    Ok(CampaignEngine::new(graph, executor).with_publish_hook(Arc::new(hook)))
}
