//! Callback reconciliation and client status polling.
//!
//! Both handlers consume the same authoritative source, the gateway's
//! transaction status query. The reconciler writes; the poller never does.

use anyhow::anyhow;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    dtos::{CallbackQuery, CallbackResponse, StatusQuery, StatusResponse},
    error::AppError,
    handlers::checkout::gateway_failure,
    models::PaymentOutcome,
    services::metrics::record_callback,
    services::pesapal::GatewayError,
    services::repository::OrderTransition,
    AppState,
};

/// Gateway IPN handler. Safe to invoke any number of times for the same
/// transaction: the payment write is last-write-wins against a fresh gateway
/// fetch and the order transition is filter-guarded.
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<(StatusCode, Json<CallbackResponse>), AppError> {
    tracing::info!(
        tracking_id = %query.order_tracking_id,
        reference = %query.order_merchant_reference,
        "Processing payment callback"
    );

    let token = match state.tokens.bearer_token().await {
        Ok(token) => token,
        Err(err) => return Err(gateway_failure(&state, err).await),
    };

    // The webhook body is never trusted; status comes from a fresh
    // authoritative fetch.
    let snapshot = match state
        .gateway
        .transaction_status(&token, &query.order_tracking_id)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => return Err(gateway_failure(&state, err).await),
    };

    let description = snapshot
        .details
        .payment_status_description
        .as_deref()
        .unwrap_or("");
    let outcome = PaymentOutcome::from_gateway_description(description);

    let payment = state
        .payments
        .find_by_reference(&query.order_merchant_reference)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or_else(|| {
            tracing::warn!(
                reference = %query.order_merchant_reference,
                "Callback for unknown payment reference"
            );
            AppError::NotFound(anyhow!(
                "No payment found for reference {}",
                query.order_merchant_reference
            ))
        })?;

    state
        .payments
        .record_gateway_status(
            &payment.reference,
            outcome.as_payment_status(),
            outcome,
            &query.order_tracking_id,
            snapshot.raw,
        )
        .await
        .map_err(AppError::DatabaseError)?;

    record_callback(outcome.as_str());

    if outcome != PaymentOutcome::Success {
        tracing::info!(
            reference = %payment.reference,
            status = outcome.as_str(),
            "Payment not completed yet"
        );
        return Ok((
            StatusCode::OK,
            Json(CallbackResponse {
                status: outcome,
                order_id: None,
                payment_id: payment.id,
                message: "payment not completed yet".to_string(),
            }),
        ));
    }

    // Merchant reference doubles as the order id when none was recorded at
    // initiation.
    let order_id = payment
        .order_id
        .clone()
        .unwrap_or_else(|| query.order_merchant_reference.clone());

    match state
        .orders
        .mark_paid(&order_id)
        .await
        .map_err(AppError::DatabaseError)?
    {
        OrderTransition::Advanced => {
            tracing::info!(order_id = %order_id, "Order advanced to paid_pending_fulfillment");
        }
        OrderTransition::AlreadySettled => {
            tracing::debug!(order_id = %order_id, "Order already settled; callback replay");
        }
        OrderTransition::NotFound => {
            // A completed payment with no matching order is an alertable
            // anomaly, not a success. The payment update above stands as the
            // audit trail.
            tracing::error!(
                order_id = %order_id,
                reference = %payment.reference,
                "Completed payment has no matching order"
            );
            return Err(AppError::NotFound(anyhow!(
                "No order found for id {}",
                order_id
            )));
        }
    }

    Ok((
        StatusCode::OK,
        Json(CallbackResponse {
            status: outcome,
            order_id: Some(order_id),
            payment_id: payment.id,
            message: "payment completed".to_string(),
        }),
    ))
}

/// Client poll handler. Read-only: queries the gateway live and never writes
/// to `Payment` or `Order`. Always answers 200; gateway availability problems
/// are encoded in the `status` field so the client can keep polling.
pub async fn payment_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> (StatusCode, Json<StatusResponse>) {
    let token = match state.tokens.bearer_token().await {
        Ok(token) => token,
        Err(err) => return degraded_status(&state, err, query.reference).await,
    };

    match state
        .gateway
        .transaction_status(&token, &query.tracking_id)
        .await
    {
        Ok(snapshot) => {
            let description = snapshot
                .details
                .payment_status_description
                .as_deref()
                .unwrap_or("");
            let outcome = PaymentOutcome::from_gateway_description(description);
            (
                StatusCode::OK,
                Json(StatusResponse {
                    status: outcome.as_str().to_string(),
                    reference: query.reference,
                }),
            )
        }
        Err(err) => degraded_status(&state, err, query.reference).await,
    }
}

async fn degraded_status(
    state: &AppState,
    err: GatewayError,
    reference: String,
) -> (StatusCode, Json<StatusResponse>) {
    if matches!(err, GatewayError::InvalidCredentials) {
        state.tokens.invalidate().await;
    }
    let status = match err {
        GatewayError::Timeout(_) => "gateway_timeout",
        GatewayError::Unreachable(_) => "gateway_unreachable",
        _ => "gateway_error",
    };
    tracing::warn!(error = %err, reference = %reference, "Status poll degraded");
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: status.to_string(),
            reference,
        }),
    )
}
