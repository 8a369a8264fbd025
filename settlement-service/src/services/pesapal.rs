//! Pesapal API 3.0 client.
//!
//! Covers the four gateway calls the settlement core depends on: token
//! exchange, IPN registration, order submission, and the authoritative
//! transaction status query.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::config::PesapalConfig;

/// Gateway-facing failure taxonomy. Raw bodies are carried only so callers
/// can persist them for audit; they must not reach HTTP responses.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable")]
    Unreachable(#[source] reqwest::Error),

    #[error("payment gateway timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("invalid payment gateway credentials")]
    InvalidCredentials,

    #[error("payment gateway rejected the request with status {status}")]
    Rejected { status: u16, body: String },

    #[error("unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err)
        } else {
            GatewayError::Unreachable(err)
        }
    }
}

/// Bearer token returned by `RequestToken`, with the gateway-reported expiry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    #[serde(rename = "expiryDate")]
    expiry_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpnRegistrationResponse {
    ipn_id: Option<String>,
}

/// Order payload for `SubmitOrderRequest`. `id` is the merchant reference the
/// gateway echoes back on every status report.
#[derive(Debug, Serialize)]
pub struct GatewayOrderRequest {
    pub id: String,
    pub currency: String,
    pub amount: f64,
    pub description: String,
    pub callback_url: String,
    pub notification_id: String,
    pub billing_address: BillingAddress,
}

#[derive(Debug, Serialize)]
pub struct BillingAddress {
    pub email_address: String,
    pub phone_number: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmittedOrder {
    pub order_tracking_id: String,
    pub merchant_reference: Option<String>,
    pub redirect_url: String,
}

/// Parsed view of `GetTransactionStatus`. Every field is optional; the
/// reconciler only depends on `payment_status_description` and treats the
/// rest as audit payload.
#[derive(Debug, Deserialize)]
pub struct GatewayTransactionStatus {
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub payment_status_description: Option<String>,
    #[serde(default)]
    pub confirmation_code: Option<String>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A status query result: the typed view plus the raw payload retained for
/// the payment's `status_details` audit field.
#[derive(Debug)]
pub struct StatusSnapshot {
    pub details: GatewayTransactionStatus,
    pub raw: serde_json::Value,
}

/// Pesapal client for interacting with the gateway API.
#[derive(Clone)]
pub struct PesapalClient {
    client: Client,
    config: PesapalConfig,
}

impl PesapalClient {
    pub fn new(config: PesapalConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    /// Exchange the static consumer key/secret for a short-lived bearer token.
    pub async fn request_token(&self) -> Result<AccessToken, GatewayError> {
        let url = format!("{}/api/Auth/RequestToken", self.config.api_base_url);
        let body = json!({
            "consumer_key": self.config.consumer_key,
            "consumer_secret": self.config.consumer_secret.expose_secret(),
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout())
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;

        tracing::debug!(status = %status, "Pesapal RequestToken response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        // Some gateway deployments report credential failures with 200 and an
        // empty token field.
        let token = parsed.token.ok_or(GatewayError::InvalidCredentials)?;

        let expires_at = parsed
            .expiry_date
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc));

        Ok(AccessToken { token, expires_at })
    }

    /// Register the IPN callback URL. Idempotent on the gateway side, so the
    /// initiator calls this unconditionally before every submission.
    pub async fn register_ipn(&self, token: &str) -> Result<String, GatewayError> {
        let url = format!("{}/api/URLSetup/RegisterIPN", self.config.api_base_url);
        let body = json!({
            "url": self.config.callback_url,
            "ipn_notification_type": "GET",
        });

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: IpnRegistrationResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let ipn_id = parsed
            .ipn_id
            .ok_or_else(|| GatewayError::InvalidResponse("missing ipn_id".to_string()))?;

        tracing::debug!(ipn_id = %ipn_id, "Pesapal IPN registered");
        Ok(ipn_id)
    }

    /// Submit an order to the gateway's hosted checkout.
    pub async fn submit_order(
        &self,
        token: &str,
        order: &GatewayOrderRequest,
    ) -> Result<SubmittedOrder, GatewayError> {
        let url = format!(
            "{}/api/Transactions/SubmitOrderRequest",
            self.config.api_base_url
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout())
            .bearer_auth(token)
            .json(order)
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;

        tracing::debug!(status = %status, reference = %order.id, "Pesapal SubmitOrderRequest response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::InvalidCredentials);
        }
        if !status.is_success() {
            tracing::error!(
                status = %status,
                reference = %order.id,
                "Pesapal order submission rejected"
            );
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let submitted: SubmittedOrder = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            reference = %order.id,
            tracking_id = %submitted.order_tracking_id,
            "Pesapal order submitted"
        );
        Ok(submitted)
    }

    /// Query the authoritative status of one payment attempt.
    pub async fn transaction_status(
        &self,
        token: &str,
        tracking_id: &str,
    ) -> Result<StatusSnapshot, GatewayError> {
        let url = format!(
            "{}/api/Transactions/GetTransactionStatus",
            self.config.api_base_url
        );

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout())
            .bearer_auth(token)
            .query(&[("orderTrackingId", tracking_id)])
            .send()
            .await
            .map_err(GatewayError::from_transport)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(GatewayError::from_transport)?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let raw: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        let details: GatewayTransactionStatus = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(StatusSnapshot { details, raw })
    }
}
