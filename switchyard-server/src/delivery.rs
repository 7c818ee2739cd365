//! Webhook delivery over HTTP.

use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{DeliveryChannel, DeliveryError, Document};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// POSTs each batch as a JSON array on a spawned task.
///
/// Failures (transport errors, timeouts, non-2xx answers) are logged and
/// dropped; nothing is retried.
#[derive(Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
}

impl HttpDelivery {
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Send one batch and wait for the answer.
    pub async fn post(&self, url: &str, documents: &[Document]) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(url)
            .json(documents)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl DeliveryChannel for HttpDelivery {
    fn deliver(&self, url: &str, documents: Vec<Document>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(%url, "no async runtime available, dropping delivery");
            return;
        };

        let this = self.clone();
        let url = url.to_string();
        runtime.spawn(async move {
            let count = documents.len();
            match this.post(&url, &documents).await {
                Ok(()) => debug!(%url, count, "delivered"),
                Err(err) => warn!(%url, count, error = %err, "delivery failed"),
            }
        });
    }
}

/// Shared handle used by the server wiring.
pub fn http_channel(timeout: Duration) -> Result<Arc<dyn DeliveryChannel>, DeliveryError> {
    Ok(Arc::new(HttpDelivery::new(timeout)?))
}
