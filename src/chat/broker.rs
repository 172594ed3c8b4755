use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::message::RelayEnvelope;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker endpoint is not configured")]
    NotConfigured,

    #[error("broker unreachable: {0}")]
    Transport(String),

    #[error("broker rejected publish with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// External pub/sub service that pushes chat events to subscribed clients.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, envelope: &RelayEnvelope) -> Result<(), BrokerError>;
}

/// Centrifugo-style HTTP publish API: `POST {channel, data}` with an
/// `X-API-Key` header.
pub struct HttpBroker {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: String,
}

impl HttpBroker {
    pub fn new(
        endpoint: Option<String>,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BrokerError::Transport(format!("failed to build http client: {err}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn publish(&self, envelope: &RelayEnvelope) -> Result<(), BrokerError> {
        let endpoint = self.endpoint.as_deref().ok_or(BrokerError::NotConfigured)?;

        let response = self
            .client
            .post(endpoint)
            .header("X-API-Key", &self.api_key)
            .json(envelope)
            .send()
            .await
            .map_err(|err| BrokerError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(channel = %envelope.channel, "published to broker");
        Ok(())
    }
}
