//! REST client for the external accounting platform.
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "success": true, "id": "4711", "code": "CUS-0001", "message": null }
//! ```
//!
//! A `false` discriminant, or a success without an id, is a
//! [`RemoteError::Rejected`]; non-2xx statuses keep their code so the
//! retry classifier can tell 5xx from 4xx.

use std::time::Duration;

use async_trait::async_trait;
use erpsync_core::duplicate_detection::CatalogEntry;
use erpsync_core::entity::EntityType;
use erpsync_core::retry::RemoteError;
use serde::Deserialize;

use super::{AccountingApi, RemoteAck};

/// Response envelope shared by all write endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    id: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogPage {
    items: Vec<CatalogEntry>,
}

/// HTTP client for one accounting platform tenant.
pub struct HttpAccountingClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpAccountingClient {
    /// * `base_url` - e.g. `https://erp.example.com/api`; a trailing slash is dropped.
    /// * `timeout` - bound on every request, on top of the engine's own per-call bound.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            RemoteError::Transport(err.to_string())
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RemoteAck, RemoteError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = ensure_success(response).await?;
        let envelope: Envelope = response.json().await.map_err(|e| self.transport_error(e))?;
        ack_from_envelope(envelope)
    }
}

#[async_trait]
impl AccountingApi for HttpAccountingClient {
    async fn create(
        &self,
        entity: EntityType,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError> {
        let url = format!("{}/{}", self.base_url, resource(entity));
        self.send(self.client.post(url).json(payload)).await
    }

    async fn update(
        &self,
        entity: EntityType,
        external_id: &str,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError> {
        let url = format!("{}/{}/{}", self.base_url, resource(entity), external_id);
        self.send(self.client.put(url).json(payload)).await
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogEntry>, RemoteError> {
        let request = self.client.get(format!("{}/catalog/items", self.base_url));
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = ensure_success(response).await?;
        let page: CatalogPage = response.json().await.map_err(|e| self.transport_error(e))?;
        Ok(page.items)
    }
}

// ---- private helpers ----

/// REST resource for an entity type.
fn resource(entity: EntityType) -> &'static str {
    match entity {
        EntityType::Customer => "customers",
        EntityType::Stock => "stock-movements",
        EntityType::Invoice => "invoices",
        EntityType::PurchaseOrder => "purchase-orders",
        EntityType::SalesOrder => "sales-orders",
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(RemoteError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

fn ack_from_envelope(envelope: Envelope) -> Result<RemoteAck, RemoteError> {
    if !envelope.success {
        return Err(RemoteError::Rejected(
            envelope
                .message
                .unwrap_or_else(|| "no message".to_string()),
        ));
    }
    match envelope.id.filter(|id| !id.is_empty()) {
        Some(external_id) => Ok(RemoteAck {
            external_id,
            external_code: envelope.code.filter(|c| !c.is_empty()),
        }),
        None => Err(RemoteError::Rejected(
            "success response carried no external id".to_string(),
        )),
    }
}
