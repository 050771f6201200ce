//! The agency content campaign pipeline
//!
//! ```text
//!             ┌──────────┐
//!             │  intake  │
//!             └────┬─────┘
//!          ┌───────┴────────┐
//!     ┌────▼────┐   ┌───────▼────────┐
//!     │research │   │brand_guidelines│
//!     └────┬────┘   └───────┬────────┘
//!          └───────┬────────┘
//!           ┌──────▼──────┐◀──────────────┐
//!           │ copywriting │               │ reject (bounded)
//!           └──────┬──────┘               │
//!        ab_simulator? ─▶ designer? ─▶ review ─▶ escalate
//!                                         │ accept
//!                              human_approval? ─▶ finalize
//! ```

pub mod brief;
pub mod config;
pub mod nodes;
pub mod publish;
pub mod workflow;

pub use brief::{BriefError, CampaignBrief, ContentType};
pub use config::PipelineConfig;
pub use nodes::{
    AbSimulatorNode, BrandGuidelinesNode, CopywritingNode, DesignerNode, EscalateNode,
    FinalizeNode, HumanApprovalNode, IntakeNode, ResearchNode, ReviewNode,
};
pub use publish::CampaignPublishHook;
pub use workflow::{build_campaign_graph, campaign_engine};

/// State field names shared by the campaign nodes
pub mod fields {
    pub const NAME: &str = "name";
    pub const CAMPAIGN_ID: &str = "campaign_id";
    pub const TOPIC: &str = "topic";
    pub const TARGET_AUDIENCE: &str = "target_audience";
    pub const TONE: &str = "tone";
    pub const CONTENT_TYPE: &str = "content_type";
    pub const CHANNELS: &str = "channels";
    pub const RESEARCH: &str = "research";
    pub const BRAND_GUIDELINES: &str = "brand_guidelines";
    pub const DRAFT_CONTENT: &str = "draft_content";
    pub const REVISION_COUNT: &str = "revision_count";
    pub const AB_TEST_WINNER: &str = "ab_test_winner";
    pub const AB_TEST_LOGS: &str = "ab_test_logs";
    pub const DESIGN: &str = "design";
    pub const REVIEW_VERDICT: &str = "review_verdict";
    pub const REVIEW_SCORE: &str = "review_score";
    pub const REVIEW_FEEDBACK: &str = "review_feedback";
    pub const SEO_NOTES: &str = "seo_notes";
    pub const HUMAN_DECISION: &str = "human_decision";
    pub const HUMAN_FEEDBACK: &str = "human_feedback";
    pub const APPROVAL_STATUS: &str = "approval_status";
    pub const DASHBOARD_URL: &str = "dashboard_url";
    pub const FINAL_CONTENT: &str = "final_content";
    pub const ESCALATION_REASON: &str = "escalation_reason";
}

/// Node names
pub mod names {
    pub const INTAKE: &str = "intake";
    pub const RESEARCH: &str = "research";
    pub const BRAND_GUIDELINES: &str = "brand_guidelines";
    pub const COPYWRITING: &str = "copywriting";
    pub const AB_SIMULATOR: &str = "ab_simulator";
    pub const DESIGNER: &str = "designer";
    pub const REVIEW: &str = "review";
    pub const HUMAN_APPROVAL: &str = "human_approval";
    pub const FINALIZE: &str = "finalize";
    pub const ESCALATE: &str = "escalate";
}
