//! Delivery of finalized campaigns to their channels

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::info;

use super::fields;
use crate::collaborators::{Publisher, Receipt};
use crate::engine::StateContainer;
use crate::service::PublishHook;

/// Publishes `final_content` to every channel of the campaign
pub struct CampaignPublishHook {
    publisher: Arc<dyn Publisher>,
    default_channels: Vec<String>,
    timeout: Duration,
}

impl CampaignPublishHook {
    pub fn new(publisher: Arc<dyn Publisher>, default_channels: Vec<String>, timeout: Duration) -> Self {
        Self {
            publisher,
            default_channels,
            timeout,
        }
    }
}

#[async_trait]
impl PublishHook for CampaignPublishHook {
    async fn publish(&self, run_id: &str, state: Arc<StateContainer>) -> anyhow::Result<Vec<Receipt>> {
        let content = state
            .get(fields::FINAL_CONTENT)
            .ok_or_else(|| anyhow!("run {run_id} has no final content"))?;
        let channels = match state.get_as::<Vec<String>>(fields::CHANNELS) {
            Some(channels) if !channels.is_empty() => channels,
            _ => self.default_channels.clone(),
        };

        let deliveries = channels.iter().map(|channel| async move {
            tokio::time::timeout(self.timeout, self.publisher.publish(channel, content))
                .await
                .map_err(|_| anyhow!("timed out after {:?}", self.timeout))
                .and_then(|result| result.map_err(anyhow::Error::from))
                .with_context(|| format!("publishing to {channel}"))
        });
        let receipts = join_all(deliveries)
            .await
            .into_iter()
            .collect::<anyhow::Result<Vec<_>>>()?;

        info!(run_id, channels = ?channels, "Campaign delivered");
        Ok(receipts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::RecordingPublisher;
    use crate::engine::Delta;
    use serde_json::json;

    fn final_state(channels: Option<Vec<&str>>) -> Arc<StateContainer> {
        let mut delta = Delta::new().with(fields::FINAL_CONTENT, json!({"headline": "H"}));
        if let Some(channels) = channels {
            delta.set(fields::CHANNELS, channels);
        }
        Arc::new(StateContainer::default().merge(delta))
    }

    #[tokio::test]
    async fn test_publishes_to_every_channel() {
        let publisher = Arc::new(RecordingPublisher::new());
        let hook = CampaignPublishHook::new(publisher.clone(), vec!["blog".into()], Duration::from_secs(1));

        let receipts = hook
            .publish("run-1", final_state(Some(vec!["blog", "email"])))
            .await
            .unwrap();

        let channels: Vec<_> = receipts.iter().map(|r| r.channel.as_str()).collect();
        assert_eq!(channels, vec!["blog", "email"]);
        assert_eq!(publisher.published().await.len(), 2);
    }

    #[tokio::test]
    async fn test_default_channels_and_errors() {
        let publisher = Arc::new(RecordingPublisher::new());
        let hook = CampaignPublishHook::new(publisher, vec!["social".into()], Duration::from_secs(1));
        let receipts = hook.publish("run-1", final_state(None)).await.unwrap();
        assert_eq!(receipts[0].channel, "social");

        let missing = hook.publish("run-2", Arc::new(StateContainer::default())).await;
        assert!(missing.unwrap_err().to_string().contains("no final content"));

        let down = CampaignPublishHook::new(
            Arc::new(RecordingPublisher::unavailable()),
            vec!["blog".into()],
            Duration::from_secs(1),
        );
        let err = down.publish("run-3", final_state(None)).await.unwrap_err();
        assert!(format!("{err:#}").contains("publishing to blog"));
    }
}
