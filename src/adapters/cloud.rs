use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::ports::{CloudError, CloudGateway, SyncStatus};

const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the cloud platform. One shared connection-pooling client
/// for all controllers; TLS peer verification can be disabled by config for
/// lab targets with self-signed certificates.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
}

/// Responses arrive as `{"success": {"data": {...}}}`; a missing or mistyped
/// field is a protocol error, not a silent default.
#[derive(Deserialize)]
struct Envelope<T> {
    success: SuccessBody<T>,
}

#[derive(Deserialize)]
struct SuccessBody<T> {
    data: T,
}

#[derive(Deserialize)]
struct SecretKeyData {
    #[serde(rename = "secretKey")]
    secret_key: String,
}

#[derive(Deserialize)]
struct TokenData {
    // The cloud capitalizes this one field.
    #[serde(rename = "Token")]
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    mac_address: &'a str,
    secret_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportEnvelope {
    is_rebooted: bool,
    uplink_seq_id: i64,
    data_from_controller: Vec<String>,
}

impl CloudClient {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.server_url.clone(),
        })
    }

    async fn read_body(response: reqwest::Response) -> Result<String, CloudError> {
        response
            .text()
            .await
            .map_err(|e| CloudError::Transport(format!("failed to read response: {e}")))
    }
}

fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, CloudError> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| CloudError::Protocol(e.to_string()))?;
    Ok(envelope.success.data)
}

fn sync_status(status: StatusCode) -> SyncStatus {
    match status.as_u16() {
        200 => SyncStatus::Ok,
        401 => SyncStatus::Unauthorized,
        code => SyncStatus::Other(code),
    }
}

#[async_trait]
impl CloudGateway for CloudClient {
    async fn get_secret_key(&self, mac_address: &str) -> Result<String, CloudError> {
        let url = format!(
            "{}/api/iqnext/controller/v1/nc/getSecretKey/{}",
            self.base_url, mac_address
        );
        debug!(url = %url, "Requesting secret key");

        let response = self
            .http
            .get(&url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CloudError::Transport(format!("HTTP error: {status}")));
        }

        let body = Self::read_body(response).await?;
        let data: SecretKeyData = parse_envelope(&body)?;
        Ok(data.secret_key)
    }

    async fn login(&self, mac_address: &str, secret_key: &str) -> Result<String, CloudError> {
        let url = format!("{}/api/auth/login/v1/gateway", self.base_url);
        debug!(url = %url, mac_address = %mac_address, "Logging in gateway");

        let body = serde_json::to_vec(&LoginRequest {
            mac_address,
            secret_key,
        })
        .map_err(|e| CloudError::Protocol(e.to_string()))?;

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CloudError::Transport(format!("HTTP error: {status}")));
        }

        let body = Self::read_body(response).await?;
        let data: TokenData = parse_envelope(&body)?;
        Ok(data.token)
    }

    async fn heartbeat(&self, token: &str) -> Result<SyncStatus, CloudError> {
        let url = format!("{}/api/gms/sync/v1/to-controller", self.base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("seqId", "-1")
            .header("isRebooted", "false")
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        Ok(sync_status(response.status()))
    }

    async fn send_report(&self, token: &str, frame: &[u8]) -> Result<SyncStatus, CloudError> {
        let url = format!("{}/api/gms/sync/v1/from-controller", self.base_url);

        let envelope = ReportEnvelope {
            is_rebooted: false,
            uplink_seq_id: -1,
            data_from_controller: vec![general_purpose::STANDARD.encode(frame)],
        };
        let body =
            serde_json::to_vec(&envelope).map_err(|e| CloudError::Protocol(e.to_string()))?;

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await
            .map_err(|e| CloudError::Transport(e.to_string()))?;

        Ok(sync_status(response.status()))
    }
}
