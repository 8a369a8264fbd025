//! Payment initiation handler.
//!
//! Obtains a gateway token and IPN registration, submits the order, and
//! persists exactly one `Payment` row per attempt before responding: the row
//! records the redirect on success and the raw gateway error on rejection.

use axum::{extract::State, http::StatusCode, Json};
use mongodb::bson::DateTime;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{InitiatePaymentRequest, InitiatePaymentResponse},
    error::AppError,
    models::{Payment, PaymentOutcome, PaymentStatus},
    services::metrics::record_initiation,
    services::pesapal::{BillingAddress, GatewayError, GatewayOrderRequest},
    AppState,
};

/// Surface a gateway failure, invalidating the cached token when the gateway
/// no longer accepts it.
pub(crate) async fn gateway_failure(state: &AppState, err: GatewayError) -> AppError {
    if matches!(err, GatewayError::InvalidCredentials) {
        state.tokens.invalidate().await;
    }
    tracing::error!(error = %err, "Gateway call failed");
    AppError::from(err)
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), AppError> {
    payload.validate()?;

    let supplied_reference = payload
        .reference
        .clone()
        .filter(|r| !r.trim().is_empty());
    let reference = supplied_reference
        .clone()
        .unwrap_or_else(|| format!("DB-{}", chrono::Utc::now().timestamp_millis()));

    tracing::info!(
        reference = %reference,
        amount = payload.amount,
        "Initiating payment"
    );

    // Token and IPN registration failures happen before any submission is
    // attempted, so no Payment row is written for them.
    let token = match state.tokens.bearer_token().await {
        Ok(token) => token,
        Err(err) => return Err(gateway_failure(&state, err).await),
    };
    let notification_id = match state.gateway.register_ipn(&token).await {
        Ok(id) => id,
        Err(err) => return Err(gateway_failure(&state, err).await),
    };

    let order = GatewayOrderRequest {
        id: reference.clone(),
        currency: state.config.pesapal.currency.clone(),
        amount: payload.amount,
        description: payload.description.clone(),
        callback_url: state.config.pesapal.callback_url.clone(),
        notification_id,
        billing_address: BillingAddress {
            email_address: payload.email.clone(),
            phone_number: payload.phone.clone(),
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
        },
    };

    let now = DateTime::now();
    match state.gateway.submit_order(&token, &order).await {
        Ok(submitted) => {
            let payment = Payment {
                id: Uuid::new_v4(),
                reference: reference.clone(),
                // A caller-supplied reference is the order id; a synthesized
                // one has no order behind it yet.
                order_id: supplied_reference,
                tracking_id: Some(submitted.order_tracking_id.clone()),
                redirect_url: Some(submitted.redirect_url.clone()),
                status: PaymentStatus::Initiated,
                payment_status: PaymentOutcome::Pending,
                payment_reference: None,
                error_response: None,
                error_status: None,
                status_details: None,
                created_at: now,
                updated_at: now,
            };

            // The row must exist before the caller sees the redirect URL.
            state.payments.create_payment(payment).await.map_err(|e| {
                tracing::error!(error = %e, reference = %reference, "Failed to save payment");
                AppError::DatabaseError(e)
            })?;

            record_initiation("initiated");
            tracing::info!(
                reference = %reference,
                tracking_id = %submitted.order_tracking_id,
                "Payment initiated"
            );

            Ok((
                StatusCode::OK,
                Json(InitiatePaymentResponse {
                    redirect_url: submitted.redirect_url,
                    reference,
                    order_tracking_id: submitted.order_tracking_id,
                }),
            ))
        }
        Err(err) => {
            // The submission was attempted, so a failed row is written for
            // the audit trail, raw gateway error included.
            let (error_status, error_response) = match &err {
                GatewayError::Rejected { status, body } => {
                    (Some(*status as i32), Some(body.clone()))
                }
                other => (None, Some(other.to_string())),
            };

            let payment = Payment {
                id: Uuid::new_v4(),
                reference: reference.clone(),
                order_id: supplied_reference,
                tracking_id: None,
                redirect_url: None,
                status: PaymentStatus::Failed,
                payment_status: PaymentOutcome::Failed,
                payment_reference: None,
                error_response,
                error_status,
                status_details: None,
                created_at: now,
                updated_at: now,
            };

            if let Err(db_err) = state.payments.create_payment(payment).await {
                tracing::error!(
                    error = %db_err,
                    reference = %reference,
                    "Failed to record rejected payment attempt"
                );
            }

            record_initiation("failed");
            Err(gateway_failure(&state, err).await)
        }
    }
}
