use std::time::Duration;

use application::{DeliveryHint, NotificationError, NotificationSink};
use async_trait::async_trait;

/// 通过 HTTP POST 把投递提示交给外部推送服务
#[derive(Clone)]
pub struct HttpNotificationSink {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpNotificationSink {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NotificationError::transport(format!("failed to build client: {err}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn notify(&self, hint: DeliveryHint) -> Result<(), NotificationError> {
        let mut request = self.http.post(&self.endpoint).json(&hint);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| NotificationError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
