use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::ServiceError;
use crate::gateway::vnpay;
use crate::services::settlement::{CheckoutRequest, SettlementReceipt};
use crate::{AppState, ApiResponse};

use super::UserId;

/// POST /api/v1/checkout — immediate settlement, cash on delivery.
pub async fn checkout_cod(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt: SettlementReceipt = state
        .services
        .settlement
        .settle_from_cart(user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}

#[derive(Serialize)]
pub struct VnpayCheckoutResponse {
    pub order_ref: String,
    pub payment_url: String,
}

/// POST /api/v1/checkout/vnpay — deferred settlement: store the order
/// intent and hand the browser the signed gateway URL.
pub async fn checkout_vnpay(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let deferred = state
        .services
        .settlement
        .initiate_deferred(user_id, request)
        .await?;

    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .unwrap_or("127.0.0.1")
        .trim()
        .to_string();
    let order_info = format!("GlowCart order {}", deferred.order_ref);

    let payment_url = state.services.gateway.build_redirect_url(
        &deferred.order_ref,
        deferred.amount,
        &client_ip,
        &order_info,
        Utc::now(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(VnpayCheckoutResponse {
            order_ref: deferred.order_ref,
            payment_url,
        })),
    ))
}

/// GET /api/v1/payments/vnpay/return — the browser lands here after the
/// gateway round trip. The user is mid-redirect, so every outcome is a
/// redirect to the storefront result page rather than a JSON error.
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Redirect {
    let result_url = state.services.gateway.result_url().to_string();
    let order_ref = params
        .get(vnpay::PARAM_TXN_REF)
        .cloned()
        .unwrap_or_default();

    // Verification comes before any side effect; an unsigned or tampered
    // callback never reaches the settlement engine with a valid flag.
    if !state.services.gateway.verify_callback(&params) {
        warn!(order_ref, "VNPay callback failed signature verification");
        return Redirect::to(&format!("{}?status=failed&reason=signature", result_url));
    }

    let response_code = params
        .get(vnpay::PARAM_RESPONSE_CODE)
        .map(String::as_str)
        .unwrap_or("");
    if response_code != vnpay::SUCCESS_RESPONSE_CODE {
        info!(order_ref, response_code, "Gateway reported payment failure");
        let _ = state
            .event_sender
            .send(crate::events::Event::PaymentRejected {
                order_ref: order_ref.clone(),
                response_code: response_code.to_string(),
            })
            .await;
        return Redirect::to(&format!(
            "{}?status=failed&code={}",
            result_url, response_code
        ));
    }

    let gateway_txn_id = params
        .get(vnpay::PARAM_TRANSACTION_NO)
        .map(String::as_str)
        .unwrap_or("");

    match state
        .services
        .settlement
        .confirm_deferred(&order_ref, true, gateway_txn_id)
        .await
    {
        Ok(receipt) => Redirect::to(&format!(
            "{}?status=success&orderId={}",
            result_url, receipt.order_id
        )),
        Err(e) => {
            warn!(order_ref, "Deferred settlement failed: {}", e);
            Redirect::to(&format!("{}?status=failed&reason={}", result_url, e.kind()))
        }
    }
}
