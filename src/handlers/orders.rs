use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::{AppState, ApiResponse};

use super::UserId;

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = state
        .services
        .settlement
        .get_order(order_id, user_id)
        .await?;
    Ok(Json(ApiResponse::ok(details)))
}

/// POST /api/v1/orders/:id/cancel — permitted only while the order is still
/// pending; stock is restored, the promotion stays spent.
pub async fn cancel_order(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .settlement
        .cancel_order(order_id, user_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::<()>::message("order cancelled")),
    ))
}
