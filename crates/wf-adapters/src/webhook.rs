//! HTTP webhook adapter (§4.8): POSTs the action payload and signs the body
//! with HMAC-SHA256 the way a caller would verify a GitHub/Stripe-style
//! webhook, so a receiver can reject forged calls.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use wf_core::adapter::{ActionContext, AdapterError, AdapterOutcome, SideEffectAdapter};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Workflow-Signature";

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub signing_secret: Option<String>,
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            signing_secret: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = Some(secret.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpWebhookAdapter {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl HttpWebhookAdapter {
    pub fn new(config: WebhookConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn sign(&self, body: &[u8]) -> Option<String> {
        let secret = self.config.signing_secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
        mac.update(body);
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    async fn post(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        let body = serde_json::json!({
            "execution_id": ctx.execution_id,
            "step_id": ctx.step_id,
            "action_type": ctx.action_type,
            "data": ctx.data,
        });
        let body_bytes = serde_json::to_vec(&body).map_err(|e| AdapterError::Transport(e.to_string()))?;

        let mut request = self.client.post(&self.config.url).header("Content-Type", "application/json");
        if let Some(signature) = self.sign(&body_bytes) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { AdapterError::Timeout } else { AdapterError::Transport(e.to_string()) })?;

        let status = response.status();
        if status.is_success() {
            let detail = response.json::<serde_json::Value>().await.ok();
            Ok(AdapterOutcome { detail })
        } else if status.is_server_error() || status.as_u16() == 429 {
            Err(AdapterError::Transport(format!("webhook returned {status}")))
        } else {
            Err(AdapterError::Rejected(format!("webhook returned {status}")))
        }
    }
}

#[async_trait]
impl SideEffectAdapter for HttpWebhookAdapter {
    async fn send_email(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.post(ctx).await
    }

    async fn send_sms(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.post(ctx).await
    }

    async fn webhook(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.post(ctx).await
    }

    async fn custom(&self, ctx: &ActionContext) -> Result<AdapterOutcome, AdapterError> {
        self.post(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ActionContext {
        ActionContext {
            execution_id: Uuid::now_v7(),
            step_id: "step_1".into(),
            action_type: "webhook".into(),
            data: json!({ "foo": "bar" }),
        }
    }

    #[tokio::test]
    async fn successful_post_returns_response_body_as_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let adapter = HttpWebhookAdapter::new(WebhookConfig::new(format!("{}/hook", server.uri()))).unwrap();
        let outcome = adapter.webhook(&ctx()).await.unwrap();
        assert_eq!(outcome.detail, Some(json!({ "ok": true })));
    }

    #[tokio::test]
    async fn signing_secret_adds_signature_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = HttpWebhookAdapter::new(
            WebhookConfig::new(format!("{}/hook", server.uri())).with_signing_secret("shh"),
        )
        .unwrap();
        assert!(adapter.webhook(&ctx()).await.is_ok());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(503)).mount(&server).await;

        let adapter = HttpWebhookAdapter::new(WebhookConfig::new(format!("{}/hook", server.uri()))).unwrap();
        let err = adapter.webhook(&ctx()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn client_error_is_rejected_not_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).and(path("/hook")).respond_with(ResponseTemplate::new(400)).mount(&server).await;

        let adapter = HttpWebhookAdapter::new(WebhookConfig::new(format!("{}/hook", server.uri()))).unwrap();
        let err = adapter.webhook(&ctx()).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
