//! Campaign brief - the seed of every run

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::fields;
use crate::engine::StateContainer;

/// Kind of content a campaign produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    BlogPost,
    SocialMedia,
    Email,
    Ad,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::BlogPost => "blog_post",
            ContentType::SocialMedia => "social_media",
            ContentType::Email => "email",
            ContentType::Ad => "ad",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = BriefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "blog_post" | "blog" => Ok(ContentType::BlogPost),
            "social_media" | "social" => Ok(ContentType::SocialMedia),
            "email" => Ok(ContentType::Email),
            "ad" => Ok(ContentType::Ad),
            other => Err(BriefError::UnknownContentType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BriefError {
    #[error("campaign topic must not be empty")]
    EmptyTopic,

    #[error("unknown content type '{0}' (expected blog_post, social_media, email or ad)")]
    UnknownContentType(String),
}

fn default_tone() -> String {
    "professional".to_string()
}

/// What the client asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignBrief {
    #[serde(default)]
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default)]
    pub content_type: ContentType,
    /// Publishing channels; the pipeline default applies when empty
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub campaign_id: Option<String>,
}

impl CampaignBrief {
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            name: topic.clone(),
            topic,
            target_audience: String::new(),
            tone: default_tone(),
            content_type: ContentType::default(),
            channels: Vec::new(),
            campaign_id: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = audience.into();
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_campaign_id(mut self, id: impl Into<String>) -> Self {
        self.campaign_id = Some(id.into());
        self
    }

    pub fn validate(&self) -> Result<(), BriefError> {
        if self.topic.trim().is_empty() {
            return Err(BriefError::EmptyTopic);
        }
        Ok(())
    }

    /// Seed fields for a new run
    pub fn to_seed(&self) -> BTreeMap<String, Value> {
        let mut seed = BTreeMap::new();
        seed.insert(fields::NAME.to_string(), Value::from(self.name.clone()));
        seed.insert(fields::TOPIC.to_string(), Value::from(self.topic.clone()));
        seed.insert(fields::TONE.to_string(), Value::from(self.tone.clone()));
        seed.insert(fields::CONTENT_TYPE.to_string(), Value::from(self.content_type.as_str()));
        if !self.target_audience.is_empty() {
            seed.insert(
                fields::TARGET_AUDIENCE.to_string(),
                Value::from(self.target_audience.clone()),
            );
        }
        if !self.channels.is_empty() {
            seed.insert(fields::CHANNELS.to_string(), Value::from(self.channels.clone()));
        }
        if let Some(id) = &self.campaign_id {
            seed.insert(fields::CAMPAIGN_ID.to_string(), Value::from(id.clone()));
        }
        seed
    }

    pub fn to_state(&self) -> StateContainer {
        StateContainer::new(self.to_seed())
    }
}
