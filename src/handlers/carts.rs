use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::{AppState, ApiResponse};

use super::UserId;

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// GET /api/v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.carts.get_lines(user_id).await?;
    Ok(Json(ApiResponse::ok(lines)))
}

/// POST /api/v1/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
    state
        .services
        .carts
        .add_item(user_id, request.product_id, request.quantity)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::<()>::message("item added")),
    ))
}

/// PUT /api/v1/cart/items/:product_id
pub async fn update_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(product_id): Path<Uuid>,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
    state
        .services
        .carts
        .update_item(user_id, product_id, request.quantity)
        .await?;
    Ok(Json(ApiResponse::<()>::message("item updated")))
}

/// DELETE /api/v1/cart/items/:product_id
pub async fn remove_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .carts
        .remove_item(user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::<()>::message("item removed")))
}
